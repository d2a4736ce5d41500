//! Format-preserving storage for flat `KEY=value` files.
//!
//! [`EnvStore`] owns a single `.env`-style file. Reads parse it into a live
//! key/value map while remembering every physical line, so comments, blank
//! lines and key positions survive a rewrite. Mutations stay in memory until
//! [`EnvStore::save`] is called.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

// ── Line records ──────────────────────────────────────────────────────────────

/// One physical line of the backing file, as last read or written.
///
/// `Blank`, `Comment` and `Other` lines pass through a save byte-for-byte.
/// `KeyValue` lines hold only the key; the current value is substituted from
/// the live map when the file is rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LineRecord {
    /// Empty or whitespace-only.
    Blank(String),
    /// First non-whitespace character is `#`.
    Comment(String),
    /// Parsed as `KEY=VALUE`; holds the trimmed key.
    KeyValue(String),
    /// Non-blank, non-comment, no `=`. Preserved but never parsed.
    Other(String),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Splits on the first `=`, trims both sides, strips one layer of matching
/// quotes from the value. Later occurrences of a key overwrite earlier ones
/// without moving the key's position.
fn parse(raw: &str) -> (Vec<LineRecord>, HashMap<String, String>, Vec<String>) {
    let mut lines = Vec::new();
    let mut entries: HashMap<String, String> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            lines.push(LineRecord::Blank(line.to_string()));
            continue;
        }
        if trimmed.starts_with('#') {
            lines.push(LineRecord::Comment(line.to_string()));
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            lines.push(LineRecord::Other(line.to_string()));
            continue;
        };
        let key = key.trim().to_string();
        let value = strip_quotes(value.trim()).to_string();
        if entries.insert(key.clone(), value).is_none() {
            order.push(key.clone());
        }
        lines.push(LineRecord::KeyValue(key));
    }
    (lines, entries, order)
}

/// Removes surrounding quotes when the first and last characters are the same
/// quote character. A lone quote or mismatched pair is left alone. Only one
/// layer is removed, and it is never added back on write.
fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &value[1..value.len() - 1];
        }
    }
    value
}

// ── EnvStore ──────────────────────────────────────────────────────────────────

/// Key/value store backed by one `.env` file.
///
/// Keys iterate in insertion order (file order for loaded keys, then the
/// order they were added in memory). The empty string is a real value;
/// absence is [`None`].
#[derive(Debug, Clone)]
pub struct EnvStore {
    path: PathBuf,
    entries: HashMap<String, String>,
    /// Key insertion order. Keys in here but absent from the source lines
    /// are appended to the file on save.
    order: Vec<String>,
    source_lines: Vec<LineRecord>,
}

impl EnvStore {
    /// Opens a store for reading and writing. Loads the file when it exists;
    /// otherwise creates the parent directory so a later save succeeds.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut store = Self::empty(path.as_ref().to_path_buf());
        if store.path.exists() {
            store.read_file()?;
        } else if let Some(parent) = store.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(store)
    }

    /// Read-only construction. Loads the file when it exists and never
    /// touches the filesystem otherwise; a missing file yields an empty
    /// store.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let mut store = Self::empty(path.as_ref().to_path_buf());
        if store.path.exists() {
            store.read_file()?;
        }
        Ok(store)
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: HashMap::new(),
            order: Vec::new(),
            source_lines: Vec::new(),
        }
    }

    fn read_file(&mut self) -> io::Result<()> {
        let raw = fs::read_to_string(&self.path)?;
        let (lines, entries, order) = parse(&raw);
        self.source_lines = lines;
        self.entries = entries;
        self.order = order;
        Ok(())
    }

    /// Re-reads the backing file, discarding unsaved in-memory changes.
    /// A missing file leaves the store untouched.
    pub fn reload(&mut self) -> io::Result<()> {
        if self.path.exists() {
            self.read_file()?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Reads ─────────────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.order.iter().map(String::as_str)
    }

    /// `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.order
            .iter()
            .filter_map(|key| self.entries.get_key_value(key))
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Snapshot of the live entries. Detached from the store; mutations to
    /// the returned map do not write through.
    pub fn as_map(&self) -> HashMap<String, String> {
        self.entries.clone()
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key.into(), value.into());
    }

    /// Applies pairs in iteration order; later pairs win on duplicate keys.
    pub fn update<I, K, V>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.insert(key.into(), value.into());
        }
    }

    /// Returns whether the key existed.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    fn insert(&mut self, key: String, value: String) {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push(key);
        }
    }

    /// Overlays every entry of `other` onto this store, in `other`'s order.
    pub fn merge_from(&mut self, other: &EnvStore) {
        for (key, value) in other.iter() {
            self.insert(key.to_string(), value.to_string());
        }
    }

    /// Overlays the entries of another file onto this store. A missing file
    /// is a silent no-op.
    pub fn merge_file(&mut self, path: impl AsRef<Path>) -> io::Result<()> {
        let other = EnvStore::load(path)?;
        self.merge_from(&other);
        Ok(())
    }

    // ── Save ──────────────────────────────────────────────────────────────────

    /// Rewrites the backing file.
    ///
    /// Remembered blank, comment and unparsed lines are emitted verbatim in
    /// their original positions. Each live key is written exactly once as
    /// canonical `key=value`: at its first remembered position if it has one,
    /// with any later remembered duplicates dropped, otherwise appended at
    /// the end in insertion order. Lines for deleted keys disappear. The file
    /// always ends with a single trailing newline.
    pub fn save(&mut self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut written: HashSet<&str> = HashSet::new();
        let mut out: Vec<String> = Vec::new();
        let mut new_lines: Vec<LineRecord> = Vec::new();
        for record in &self.source_lines {
            match record {
                LineRecord::Blank(raw) | LineRecord::Comment(raw) | LineRecord::Other(raw) => {
                    out.push(raw.clone());
                    new_lines.push(record.clone());
                }
                LineRecord::KeyValue(key) => match self.entries.get(key) {
                    Some(value) if !written.contains(key.as_str()) => {
                        out.push(format!("{key}={value}"));
                        written.insert(key.as_str());
                        new_lines.push(record.clone());
                    }
                    // Deleted keys and repeat records for an already written
                    // key drop out of the file.
                    _ => {}
                },
            }
        }
        for key in &self.order {
            if written.contains(key.as_str()) {
                continue;
            }
            if let Some(value) = self.entries.get(key) {
                out.push(format!("{key}={value}"));
                new_lines.push(LineRecord::KeyValue(key.clone()));
            }
        }
        let mut content = out.join("\n");
        content.push('\n');
        fs::write(&self.path, content)?;
        self.source_lines = new_lines;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
