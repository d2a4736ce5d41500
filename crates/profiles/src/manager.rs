//! Registry of profile files under a base directory.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use envprof_store::EnvStore;

use crate::error::{ProfileError, Result};

// ── Category policy ───────────────────────────────────────────────────────────

/// Per-category write requirements, held in memory only.
///
/// `required_keys` gate validated writes. `defaults` are declared for
/// callers to consult; they are not applied to writes automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPolicy {
    pub required_keys: Vec<String>,
    pub defaults: HashMap<String, String>,
}

impl CategoryPolicy {
    /// Policy that requires the given keys and declares no defaults.
    pub fn require<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required_keys: keys.into_iter().map(Into::into).collect(),
            defaults: HashMap::new(),
        }
    }
}

// ── ProfileManager ────────────────────────────────────────────────────────────

/// Manages profiles stored as `<base_dir>/<category>/<name>.env`.
///
/// Categories registered here carry a [`CategoryPolicy`]; the policy set is
/// not persisted and must be re-registered per process. Reads never create
/// directories.
#[derive(Debug, Clone)]
pub struct ProfileManager {
    base_dir: PathBuf,
    /// Registered categories in registration order.
    categories: Vec<(String, CategoryPolicy)>,
}

impl ProfileManager {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            categories: Vec::new(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Registers a category and creates its directory. Registering an
    /// existing name replaces its policy and keeps its position.
    pub fn add_category(
        &mut self,
        name: impl Into<String>,
        policy: CategoryPolicy,
    ) -> Result<&mut Self> {
        let name = name.into();
        fs::create_dir_all(self.base_dir.join(&name))?;
        match self.categories.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = policy,
            None => self.categories.push((name, policy)),
        }
        Ok(self)
    }

    /// Registered category names, in registration order.
    pub fn list_categories(&self) -> Vec<&str> {
        self.categories.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn policy(&self, category: &str) -> Option<&CategoryPolicy> {
        self.categories
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, policy)| policy)
    }

    fn category_dir(&self, category: &str) -> PathBuf {
        self.base_dir.join(category)
    }

    fn profile_path(&self, category: &str, name: &str) -> PathBuf {
        self.category_dir(category).join(format!("{name}.env"))
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    /// Loads a profile, or [`None`] when its file does not exist.
    pub fn get(&self, category: &str, name: &str) -> Result<Option<EnvStore>> {
        let path = self.profile_path(category, name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(EnvStore::load(path)?))
    }

    /// Profile data as a plain map; empty when the profile does not exist.
    pub fn get_map(&self, category: &str, name: &str) -> Result<HashMap<String, String>> {
        Ok(self
            .get(category, name)?
            .map(|store| store.as_map())
            .unwrap_or_default())
    }

    pub fn exists(&self, category: &str, name: &str) -> bool {
        self.profile_path(category, name).exists()
    }

    /// `(name, store)` pairs for every `.env` file in the category, sorted
    /// by name. A missing category directory yields an empty list.
    pub fn list(&self, category: &str) -> Result<Vec<(String, EnvStore)>> {
        let mut result = Vec::new();
        for name in self.list_names(category)? {
            let store = EnvStore::load(self.profile_path(category, &name))?;
            result.push((name, store));
        }
        Ok(result)
    }

    /// Profile names in the category, sorted.
    pub fn list_names(&self, category: &str) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.category_dir(category)) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut names = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("env") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Names of profiles in the category whose `key` equals `value`, sorted.
    pub fn find_by_key(&self, category: &str, key: &str, value: &str) -> Result<Vec<String>> {
        let mut matches = Vec::new();
        for (name, store) in self.list(category)? {
            if store.get(key) == Some(value) {
                matches.push(name);
            }
        }
        Ok(matches)
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Creates or updates a profile, applying pairs in order. Existing keys
    /// not named are kept; comments in the backing file survive.
    pub fn set<I, K, V>(&self, category: &str, name: &str, data: I) -> Result<EnvStore>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.write_profile(category, name, collect_pairs(data))
    }

    /// Like [`set`](Self::set), but refuses the whole write when the
    /// category's required keys are not all present and non-empty in `data`.
    pub fn set_validated<I, K, V>(&self, category: &str, name: &str, data: I) -> Result<EnvStore>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let pairs = collect_pairs(data);
        let missing = self.validate(category, &pairs);
        if !missing.is_empty() {
            return Err(ProfileError::Validation {
                category: category.to_string(),
                name: name.to_string(),
                missing,
            });
        }
        self.write_profile(category, name, pairs)
    }

    /// Required keys of the category that are absent from `data` or bound to
    /// the empty string, in declared order. The last occurrence of a key in
    /// `data` is the one that counts. Unregistered categories require
    /// nothing.
    pub fn validate(&self, category: &str, data: &[(String, String)]) -> Vec<String> {
        let Some(policy) = self.policy(category) else {
            return Vec::new();
        };
        policy
            .required_keys
            .iter()
            .filter(|required| {
                match data.iter().rev().find(|(key, _)| key == *required) {
                    Some((_, value)) => value.is_empty(),
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    fn write_profile(
        &self,
        category: &str,
        name: &str,
        pairs: Vec<(String, String)>,
    ) -> Result<EnvStore> {
        let mut store = EnvStore::open(self.profile_path(category, name))?;
        store.update(pairs);
        store.save()?;
        Ok(store)
    }

    /// Removes the profile's backing file. Returns whether it existed.
    pub fn delete(&self, category: &str, name: &str) -> Result<bool> {
        match fs::remove_file(self.profile_path(category, name)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Clones `src` onto `dst`, replacing any existing destination content
    /// entirely. The destination category is registered with an empty policy.
    /// Fails with [`ProfileError::NotFound`] when the source file is absent.
    pub fn copy(
        &mut self,
        src_category: &str,
        src_name: &str,
        dst_category: &str,
        dst_name: &str,
    ) -> Result<EnvStore> {
        let src_path = self.profile_path(src_category, src_name);
        if !src_path.exists() {
            return Err(ProfileError::NotFound {
                category: src_category.to_string(),
                name: src_name.to_string(),
            });
        }
        let src = EnvStore::load(&src_path)?;
        self.add_category(dst_category, CategoryPolicy::default())?;
        let dst_path = self.profile_path(dst_category, dst_name);
        if dst_path.exists() {
            fs::remove_file(&dst_path)?;
        }
        let mut dst = EnvStore::open(dst_path)?;
        dst.update(src.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        dst.save()?;
        Ok(dst)
    }

    // ── Combining ─────────────────────────────────────────────────────────────

    /// Overlays selected profiles onto `base`, in selection order; later
    /// selections win. A [`None`] selection or a nonexistent profile
    /// contributes nothing.
    pub fn merge_profiles<I, S>(
        &self,
        base: &HashMap<String, String>,
        selections: I,
    ) -> Result<HashMap<String, String>>
    where
        I: IntoIterator<Item = (S, Option<S>)>,
        S: AsRef<str>,
    {
        let mut result = base.clone();
        for (category, name) in selections {
            let Some(name) = name else { continue };
            result.extend(self.get_map(category.as_ref(), name.as_ref())?);
        }
        Ok(result)
    }

    /// Keys whose values differ between two profiles of a category, mapped
    /// to `(value_in_a, value_in_b)` with [`None`] marking absence. A
    /// nonexistent profile compares as empty.
    pub fn diff(
        &self,
        category: &str,
        name_a: &str,
        name_b: &str,
    ) -> Result<BTreeMap<String, (Option<String>, Option<String>)>> {
        let a = self.get_map(category, name_a)?;
        let b = self.get_map(category, name_b)?;
        let mut keys: BTreeSet<&String> = a.keys().collect();
        keys.extend(b.keys());
        let mut result = BTreeMap::new();
        for key in keys {
            let va = a.get(key);
            let vb = b.get(key);
            if va != vb {
                result.insert(key.clone(), (va.cloned(), vb.cloned()));
            }
        }
        Ok(result)
    }
}

fn collect_pairs<I, K, V>(data: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    data.into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir) -> ProfileManager {
        ProfileManager::new(dir.path())
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // ── Categories ────────────────────────────────────────────────────────────

    #[test]
    fn add_category_creates_directory() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.add_category("llm", CategoryPolicy::default()).unwrap();
        assert!(dir.path().join("llm").is_dir());
        assert_eq!(pm.list_categories(), vec!["llm"]);
    }

    #[test]
    fn reregistering_replaces_policy_in_place() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.add_category("llm", CategoryPolicy::require(["A"])).unwrap();
        pm.add_category("db", CategoryPolicy::default()).unwrap();
        pm.add_category("llm", CategoryPolicy::require(["B"])).unwrap();
        assert_eq!(pm.list_categories(), vec!["llm", "db"]);
        assert_eq!(pm.policy("llm").unwrap().required_keys, vec!["B"]);
    }

    // ── Get and set ───────────────────────────────────────────────────────────

    #[test]
    fn set_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "groq", [("API_KEY", "abc"), ("MODEL", "llama")])
            .unwrap();
        let store = pm.get("llm", "groq").unwrap().unwrap();
        assert_eq!(store.get("API_KEY"), Some("abc"));
        assert_eq!(store.get("MODEL"), Some("llama"));
    }

    #[test]
    fn get_missing_profile_is_none() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        assert!(pm.get("llm", "nope").unwrap().is_none());
        assert!(pm.get_map("llm", "nope").unwrap().is_empty());
        assert!(!pm.exists("llm", "nope"));
    }

    #[test]
    fn set_updates_existing_keys_and_keeps_comments() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        fs::create_dir_all(dir.path().join("llm")).unwrap();
        fs::write(
            dir.path().join("llm").join("groq.env"),
            "# groq credentials\nAPI_KEY=old\n",
        )
        .unwrap();
        pm.set("llm", "groq", [("API_KEY", "new"), ("MODEL", "llama")])
            .unwrap();
        let content = fs::read_to_string(dir.path().join("llm").join("groq.env")).unwrap();
        assert_eq!(content, "# groq credentials\nAPI_KEY=new\nMODEL=llama\n");
    }

    #[test]
    fn set_creates_category_directory_on_demand() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("fresh", "p", [("A", "1")]).unwrap();
        assert!(dir.path().join("fresh").join("p.env").is_file());
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn set_validated_rejects_missing_and_empty_keys() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.add_category("llm", CategoryPolicy::require(["API_KEY", "MODEL", "BASE_URL"]))
            .unwrap();
        let err = pm
            .set_validated("llm", "groq", [("MODEL", ""), ("EXTRA", "x")])
            .unwrap_err();
        match err {
            ProfileError::Validation {
                category,
                name,
                missing,
            } => {
                assert_eq!(category, "llm");
                assert_eq!(name, "groq");
                assert_eq!(missing, vec!["API_KEY", "MODEL", "BASE_URL"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing was written.
        assert!(!pm.exists("llm", "groq"));
    }

    #[test]
    fn set_validated_writes_when_requirements_met() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.add_category("llm", CategoryPolicy::require(["API_KEY"])).unwrap();
        pm.set_validated("llm", "groq", [("API_KEY", "abc")]).unwrap();
        assert!(pm.exists("llm", "groq"));
    }

    #[test]
    fn validate_uses_last_occurrence_of_a_key() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.add_category("llm", CategoryPolicy::require(["API_KEY"])).unwrap();
        let data = pairs(&[("API_KEY", "abc"), ("API_KEY", "")]);
        assert_eq!(pm.validate("llm", &data), vec!["API_KEY"]);
        let data = pairs(&[("API_KEY", ""), ("API_KEY", "abc")]);
        assert!(pm.validate("llm", &data).is_empty());
    }

    #[test]
    fn unregistered_category_requires_nothing() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        assert!(pm.validate("anything", &pairs(&[])).is_empty());
        pm.set_validated("anything", "p", [("A", "1")]).unwrap();
    }

    // ── Listing ───────────────────────────────────────────────────────────────

    #[test]
    fn list_is_sorted_and_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "zeta", [("A", "1")]).unwrap();
        pm.set("llm", "alpha", [("A", "2")]).unwrap();
        fs::write(dir.path().join("llm").join("notes.txt"), "x").unwrap();
        let listed = pm.list("llm").unwrap();
        let names: Vec<&str> = listed.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(pm.list_names("llm").unwrap(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn list_missing_category_is_empty() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        assert!(pm.list("ghost").unwrap().is_empty());
        assert!(pm.list_names("ghost").unwrap().is_empty());
    }

    #[test]
    fn find_by_key_matches_exact_values() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "a", [("MODEL", "llama")]).unwrap();
        pm.set("llm", "b", [("MODEL", "gpt")]).unwrap();
        pm.set("llm", "c", [("MODEL", "llama")]).unwrap();
        assert_eq!(pm.find_by_key("llm", "MODEL", "llama").unwrap(), vec!["a", "c"]);
        assert!(pm.find_by_key("llm", "MODEL", "claude").unwrap().is_empty());
    }

    // ── Delete ────────────────────────────────────────────────────────────────

    #[test]
    fn delete_reports_whether_the_profile_existed() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "groq", [("A", "1")]).unwrap();
        assert!(pm.delete("llm", "groq").unwrap());
        assert!(!pm.delete("llm", "groq").unwrap());
        assert!(!pm.exists("llm", "groq"));
    }

    // ── Diff ──────────────────────────────────────────────────────────────────

    #[test]
    fn diff_reports_only_differing_keys_sorted() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "a", [("SAME", "x"), ("CHANGED", "1"), ("ONLY_A", "a")])
            .unwrap();
        pm.set("llm", "b", [("SAME", "x"), ("CHANGED", "2"), ("ONLY_B", "b")])
            .unwrap();
        let diff = pm.diff("llm", "a", "b").unwrap();
        let keys: Vec<&String> = diff.keys().collect();
        assert_eq!(keys, vec!["CHANGED", "ONLY_A", "ONLY_B"]);
        assert_eq!(
            diff["CHANGED"],
            (Some("1".to_string()), Some("2".to_string()))
        );
        assert_eq!(diff["ONLY_A"], (Some("a".to_string()), None));
        assert_eq!(diff["ONLY_B"], (None, Some("b".to_string())));
    }

    #[test]
    fn diff_against_missing_profile_compares_as_empty() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "a", [("K", "v")]).unwrap();
        let diff = pm.diff("llm", "a", "ghost").unwrap();
        assert_eq!(diff["K"], (Some("v".to_string()), None));
        assert!(pm.diff("llm", "ghost1", "ghost2").unwrap().is_empty());
    }

    // ── Copy ──────────────────────────────────────────────────────────────────

    #[test]
    fn copy_replaces_destination_entirely() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.set("llm", "src", [("A", "1"), ("B", "2")]).unwrap();
        pm.set("backup", "dst", [("OLD", "stale"), ("B", "other")]).unwrap();
        pm.copy("llm", "src", "backup", "dst").unwrap();
        let map = pm.get_map("backup", "dst").unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["A"], "1");
        assert_eq!(map["B"], "2");
        assert!(!map.contains_key("OLD"));
    }

    #[test]
    fn copy_registers_destination_category() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.set("llm", "src", [("A", "1")]).unwrap();
        pm.copy("llm", "src", "archive", "src").unwrap();
        assert!(dir.path().join("archive").join("src.env").is_file());
        assert_eq!(pm.list_categories(), vec!["archive"]);
    }

    #[test]
    fn copy_resets_destination_policy() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.set("llm", "src", [("A", "1")]).unwrap();
        pm.add_category("backup", CategoryPolicy::require(["MUST"])).unwrap();
        pm.copy("llm", "src", "backup", "dst").unwrap();
        assert_eq!(pm.policy("backup"), Some(&CategoryPolicy::default()));
    }

    #[test]
    fn copy_missing_source_fails() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        let err = pm.copy("llm", "ghost", "backup", "dst").unwrap_err();
        assert!(matches!(err, ProfileError::NotFound { .. }));
        assert_eq!(err.to_string(), "profile not found: llm/ghost");
    }

    // ── Merging ───────────────────────────────────────────────────────────────

    #[test]
    fn merge_profiles_overlays_in_selection_order() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "groq", [("API_KEY", "k1"), ("MODEL", "llama")]).unwrap();
        pm.set("db", "prod", [("DB_URL", "postgres://prod"), ("MODEL", "ignored-late")])
            .unwrap();
        let mut base = HashMap::new();
        base.insert("MODEL".to_string(), "base".to_string());
        base.insert("REGION".to_string(), "us".to_string());
        let merged = pm
            .merge_profiles(&base, [("llm", Some("groq")), ("db", Some("prod"))])
            .unwrap();
        assert_eq!(merged["API_KEY"], "k1");
        assert_eq!(merged["DB_URL"], "postgres://prod");
        assert_eq!(merged["REGION"], "us");
        // db/prod was selected after llm/groq, so its MODEL wins.
        assert_eq!(merged["MODEL"], "ignored-late");
    }

    #[test]
    fn merge_profiles_skips_none_and_missing() {
        let dir = TempDir::new().unwrap();
        let pm = manager(&dir);
        pm.set("llm", "groq", [("API_KEY", "k1")]).unwrap();
        let merged = pm
            .merge_profiles(
                &HashMap::new(),
                [("llm", Some("groq")), ("db", None), ("cache", Some("ghost"))],
            )
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["API_KEY"], "k1");
    }

    // ── End to end ────────────────────────────────────────────────────────────

    #[test]
    fn profile_lifecycle() {
        let dir = TempDir::new().unwrap();
        let mut pm = manager(&dir);
        pm.add_category("llm", CategoryPolicy::require(["API_KEY", "MODEL"]))
            .unwrap();

        // Validated write fails short, then succeeds complete.
        assert!(pm.set_validated("llm", "groq", [("API_KEY", "gsk_1")]).is_err());
        pm.set_validated("llm", "groq", [("API_KEY", "gsk_1"), ("MODEL", "llama-3")])
            .unwrap();
        pm.set("llm", "openai", [("API_KEY", "sk_2"), ("MODEL", "gpt-4o")])
            .unwrap();

        assert_eq!(pm.list_names("llm").unwrap(), vec!["groq", "openai"]);
        let diff = pm.diff("llm", "groq", "openai").unwrap();
        assert_eq!(diff.len(), 2);

        pm.copy("llm", "groq", "backup", "groq").unwrap();
        assert_eq!(pm.get_map("backup", "groq").unwrap()["MODEL"], "llama-3");

        assert!(pm.delete("llm", "groq").unwrap());
        assert_eq!(pm.list_names("llm").unwrap(), vec!["openai"]);
        // The copy is unaffected by deleting the original.
        assert!(pm.exists("backup", "groq"));
    }
}
