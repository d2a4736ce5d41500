//! Polling change detection for profile files.
//!
//! [`EnvWatcher`] compares file modification times across scans of a profile
//! tree. The first scan only records what exists; from then on, an mtime
//! change on a known file counts as one change and fires the callback with a
//! freshly loaded [`EnvStore`]. New files are recorded silently and deleted
//! files are forgotten silently. Polling runs either manually through
//! [`EnvWatcher::check`] or on a background task via [`EnvWatcher::start`].

use std::collections::{HashMap, HashSet};
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use envprof_store::EnvStore;

/// Callback invoked per modified profile as `(category, profile, store)`.
pub type ChangeCallback = dyn Fn(&str, &str, EnvStore) + Send + Sync;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

const STOP_TIMEOUT: Duration = Duration::from_secs(5);

type MtimeMap = HashMap<PathBuf, SystemTime>;

// ── EnvWatcher ────────────────────────────────────────────────────────────────

pub struct EnvWatcher {
    base_dir: PathBuf,
    interval: Duration,
    on_change: Option<Arc<ChangeCallback>>,
    mtimes: Arc<Mutex<MtimeMap>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl EnvWatcher {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            interval: DEFAULT_INTERVAL,
            on_change: None,
            mtimes: Arc::new(Mutex::new(HashMap::new())),
            shutdown: None,
            task: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str, &str, EnvStore) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
        self
    }

    /// Runs one poll and returns the number of changed files. The first call
    /// on an empty watcher baselines instead of reporting everything as
    /// changed.
    pub fn check(&self) -> usize {
        let needs_baseline = self.mtimes.lock().unwrap().is_empty();
        if needs_baseline {
            scan_initial(&self.base_dir, &self.mtimes);
        }
        check_once(&self.base_dir, &self.mtimes, self.on_change.as_deref())
    }

    /// Spawns the background polling task. Calling on a running watcher is
    /// a no-op; restarting after [`stop`](Self::stop) re-baselines, so
    /// changes made while stopped do not fire.
    pub fn start(&mut self) {
        if self.watching() {
            return;
        }
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let base_dir = self.base_dir.clone();
        let interval = self.interval;
        let mtimes = Arc::clone(&self.mtimes);
        let on_change = self.on_change.clone();
        let handle = tokio::spawn(async move {
            debug!(path = %base_dir.display(), "watcher started");
            scan_initial(&base_dir, &mtimes);
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let changes = check_once(&base_dir, &mtimes, on_change.as_deref());
                        if changes > 0 {
                            debug!(changes, "profile changes detected");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("watcher stopped");
        });
        self.shutdown = Some(shutdown_tx);
        self.task = Some(handle);
    }

    /// Signals the polling task and waits for it to finish, aborting if it
    /// does not stop within a bounded timeout. Safe to call repeatedly or
    /// without a prior [`start`](Self::start).
    pub async fn stop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(STOP_TIMEOUT, &mut task).await.is_err() {
                warn!("watcher did not shut down in time, aborting");
                task.abort();
            }
        }
    }

    pub fn watching(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

// ── Scanning ──────────────────────────────────────────────────────────────────

/// Enumerates `<base>/<category>/<profile>.env` files in sorted order,
/// skipping dot-directories. Unreadable directories scan as empty.
fn scan(base_dir: &Path) -> Vec<(PathBuf, String, String)> {
    let mut result = Vec::new();
    let Ok(entries) = fs::read_dir(base_dir) else {
        return result;
    };
    let mut category_dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    category_dirs.sort();
    for dir in category_dirs {
        let Some(category) = dir.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if category.starts_with('.') {
            continue;
        }
        let category = category.to_string();
        let Ok(files) = fs::read_dir(&dir) else {
            continue;
        };
        let mut profiles: Vec<PathBuf> = files
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("env")
            })
            .collect();
        profiles.sort();
        for path in profiles {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let profile = stem.to_string();
            result.push((path, category.clone(), profile));
        }
    }
    result
}

fn scan_initial(base_dir: &Path, mtimes: &Mutex<MtimeMap>) {
    let files = scan(base_dir);
    let mut tracked = mtimes.lock().unwrap();
    for (path, _, _) in files {
        if let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) {
            tracked.insert(path, modified);
        }
    }
}

fn check_once(
    base_dir: &Path,
    mtimes: &Mutex<MtimeMap>,
    on_change: Option<&ChangeCallback>,
) -> usize {
    let files = scan(base_dir);
    let mut changed: Vec<(PathBuf, String, String)> = Vec::new();
    {
        let mut tracked = mtimes.lock().unwrap();
        let mut current: HashSet<PathBuf> = HashSet::with_capacity(files.len());
        for (path, category, profile) in files {
            let Ok(modified) = fs::metadata(&path).and_then(|m| m.modified()) else {
                // Vanished between enumeration and stat; keep the old entry
                // for the next poll.
                current.insert(path);
                continue;
            };
            let previous = tracked.insert(path.clone(), modified);
            if previous.is_some_and(|previous| previous != modified) {
                changed.push((path.clone(), category, profile));
            }
            current.insert(path);
        }
        tracked.retain(|path, _| current.contains(path));
    }
    let count = changed.len();
    if let Some(callback) = on_change {
        for (path, category, profile) in changed {
            match EnvStore::load(&path) {
                Ok(store) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                        callback(&category, &profile, store);
                    }));
                    if outcome.is_err() {
                        warn!(%category, %profile, "change callback panicked");
                    }
                }
                Err(err) => {
                    warn!(%category, %profile, error = %err, "failed to reload changed profile");
                }
            }
        }
    }
    count
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::UNIX_EPOCH;
    use tempfile::TempDir;

    fn write_profile(base: &Path, category: &str, name: &str, content: &str) -> PathBuf {
        let dir = base.join(category);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}.env"));
        fs::write(&path, content).unwrap();
        path
    }

    /// Pins the mtime to an explicit offset from the epoch so polls see a
    /// deterministic difference regardless of filesystem timestamp
    /// granularity.
    fn set_mtime(path: &Path, secs: u64) {
        let file = fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    #[test]
    fn baseline_scan_reports_no_changes() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "llm", "groq", "A=1\n");
        write_profile(dir.path(), "db", "prod", "B=2\n");
        let watcher = EnvWatcher::new(dir.path());
        assert_eq!(watcher.check(), 0);
        assert_eq!(watcher.check(), 0);
    }

    #[test]
    fn modified_file_fires_callback_with_fresh_data() {
        let dir = TempDir::new().unwrap();
        let path = write_profile(dir.path(), "llm", "groq", "A=1\n");
        set_mtime(&path, 1_000);

        let seen: Arc<Mutex<Vec<(String, String, Option<String>)>>> =
            Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let watcher = EnvWatcher::new(dir.path()).on_change(move |category, profile, store| {
            sink.lock().unwrap().push((
                category.to_string(),
                profile.to_string(),
                store.get("A").map(str::to_string),
            ));
        });
        assert_eq!(watcher.check(), 0);

        fs::write(&path, "A=2\n").unwrap();
        set_mtime(&path, 2_000);
        assert_eq!(watcher.check(), 1);

        let events = seen.lock().unwrap();
        assert_eq!(
            *events,
            vec![("llm".to_string(), "groq".to_string(), Some("2".to_string()))]
        );
    }

    #[test]
    fn new_file_is_not_a_change_until_modified() {
        let dir = TempDir::new().unwrap();
        write_profile(dir.path(), "llm", "groq", "A=1\n");
        let watcher = EnvWatcher::new(dir.path());
        watcher.check();

        let new = write_profile(dir.path(), "llm", "openai", "B=2\n");
        set_mtime(&new, 1_000);
        assert_eq!(watcher.check(), 0);

        set_mtime(&new, 2_000);
        assert_eq!(watcher.check(), 1);
    }

    #[test]
    fn deleted_file_is_dropped_silently() {
        let dir = TempDir::new().unwrap();
        let path = write_profile(dir.path(), "llm", "groq", "A=1\n");
        set_mtime(&path, 1_000);
        let watcher = EnvWatcher::new(dir.path());
        watcher.check();

        fs::remove_file(&path).unwrap();
        assert_eq!(watcher.check(), 0);

        // Coming back counts as a first sighting, not a change.
        let path = write_profile(dir.path(), "llm", "groq", "A=3\n");
        set_mtime(&path, 3_000);
        assert_eq!(watcher.check(), 0);
        set_mtime(&path, 4_000);
        assert_eq!(watcher.check(), 1);
    }

    #[test]
    fn changes_count_without_a_callback() {
        let dir = TempDir::new().unwrap();
        let a = write_profile(dir.path(), "llm", "groq", "A=1\n");
        let b = write_profile(dir.path(), "db", "prod", "B=2\n");
        set_mtime(&a, 1_000);
        set_mtime(&b, 1_000);
        let watcher = EnvWatcher::new(dir.path());
        watcher.check();

        set_mtime(&a, 2_000);
        set_mtime(&b, 2_000);
        assert_eq!(watcher.check(), 2);
    }

    #[test]
    fn panicking_callback_does_not_break_polling() {
        let dir = TempDir::new().unwrap();
        let path = write_profile(dir.path(), "llm", "groq", "A=1\n");
        set_mtime(&path, 1_000);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let watcher = EnvWatcher::new(dir.path()).on_change(move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        });
        watcher.check();

        set_mtime(&path, 2_000);
        assert_eq!(watcher.check(), 1);
        set_mtime(&path, 3_000);
        assert_eq!(watcher.check(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn ignores_dot_directories_and_foreign_files() {
        let dir = TempDir::new().unwrap();
        let hidden = write_profile(dir.path(), ".hidden", "x", "A=1\n");
        let notes = dir.path().join("llm").join("notes.txt");
        fs::create_dir_all(dir.path().join("llm")).unwrap();
        fs::write(&notes, "text").unwrap();
        set_mtime(&hidden, 1_000);
        set_mtime(&notes, 1_000);
        let watcher = EnvWatcher::new(dir.path());
        watcher.check();

        set_mtime(&hidden, 2_000);
        set_mtime(&notes, 2_000);
        assert_eq!(watcher.check(), 0);
    }

    #[tokio::test]
    async fn start_and_stop_background_polling() {
        let dir = TempDir::new().unwrap();
        let path = write_profile(dir.path(), "llm", "groq", "A=1\n");
        set_mtime(&path, 1_000);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut watcher = EnvWatcher::new(dir.path())
            .with_interval(Duration::from_millis(10))
            .on_change(move |_, _, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        watcher.start();
        assert!(watcher.watching());
        // Second start is a no-op while running.
        watcher.start();

        // Give the task time to baseline before mutating.
        tokio::time::sleep(Duration::from_millis(50)).await;
        fs::write(&path, "A=2\n").unwrap();
        set_mtime(&path, 2_000);

        let mut fired = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if calls.load(Ordering::SeqCst) > 0 {
                fired = true;
                break;
            }
        }
        assert!(fired, "background poll never observed the change");

        watcher.stop().await;
        assert!(!watcher.watching());
        watcher.stop().await;
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let mut watcher = EnvWatcher::new(dir.path());
        watcher.stop().await;
        assert!(!watcher.watching());
    }
}
