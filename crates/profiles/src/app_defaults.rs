//! Per-application default profile selections.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Which profile an application prefers per category.
///
/// Selections persist immediately to `<base_dir>/defaults/<app>.conf`, a
/// flat `category=profile` file kept in sorted key order. Reopening the
/// same app name restores them.
#[derive(Debug, Clone)]
pub struct AppDefaults {
    app_name: String,
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl AppDefaults {
    /// Opens the selection store for `app_name`, creating the defaults
    /// directory and loading any existing selections.
    pub fn new(app_name: impl Into<String>, base_dir: impl AsRef<Path>) -> Result<Self> {
        let app_name = app_name.into();
        let dir = base_dir.as_ref().join("defaults");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{app_name}.conf"));
        let mut entries = BTreeMap::new();
        if path.exists() {
            for line in fs::read_to_string(&path)?.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((category, profile)) = line.split_once('=') {
                    entries.insert(category.trim().to_string(), profile.trim().to_string());
                }
            }
        }
        Ok(Self {
            app_name,
            path,
            entries,
        })
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn get(&self, category: &str) -> Option<&str> {
        self.entries.get(category).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, category: &str, default: &'a str) -> &'a str {
        self.get(category).unwrap_or(default)
    }

    /// Records a selection and saves at once.
    pub fn set(&mut self, category: impl Into<String>, profile: impl Into<String>) -> Result<&mut Self> {
        self.entries.insert(category.into(), profile.into());
        self.write()?;
        Ok(self)
    }

    /// Drops a selection and saves at once. Removing an absent category
    /// still rewrites the file.
    pub fn remove(&mut self, category: &str) -> Result<&mut Self> {
        self.entries.remove(category);
        self.write()?;
        Ok(self)
    }

    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.entries.clone()
    }

    /// Selections shaped for
    /// [`ProfileManager::merge_profiles`](crate::ProfileManager::merge_profiles).
    pub fn selections(&self) -> Vec<(String, Option<String>)> {
        self.entries
            .iter()
            .map(|(category, profile)| (category.clone(), Some(profile.clone())))
            .collect()
    }

    fn write(&self) -> Result<()> {
        let mut content = format!("# Default profiles for {}\n", self.app_name);
        for (category, profile) in &self.entries {
            content.push_str(&format!("{category}={profile}\n"));
        }
        fs::write(&self.path, content)?;
        Ok(())
    }

    /// App names with a selection file under `base_dir`, sorted. A missing
    /// defaults directory yields an empty list.
    pub fn list_apps(base_dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let entries = match fs::read_dir(base_dir.as_ref().join("defaults")) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut apps = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("conf") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                apps.push(stem.to_string());
            }
        }
        apps.sort();
        Ok(apps)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
