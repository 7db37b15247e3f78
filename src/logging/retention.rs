//! Bounded on-disk lifetime for log files.
//!
//! Policies cap matching entries (files or batch directories) by count
//! and by age. Runs are deduplicated per `{dir, policy key}` with a
//! minimum re-run interval, recomputing early when the entry count
//! changes. The keep rule is newest-first by mtime with a lexicographic
//! tie-break; removal failures are swallowed, `ENOENT` during races is
//! ignored, and any other stat error propagates to the caller.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

/// Minimum interval between retention passes for one `{dir, key}`.
const MIN_RERUN_INTERVAL: Duration = Duration::from_secs(30);

/// One retention rule.
#[derive(Debug, Clone)]
pub struct RetentionPolicy {
    /// Dedup key; two policies with the same key share a re-run clock.
    pub key: String,
    /// Entries whose file name starts with this prefix are governed.
    pub prefix: String,
    /// Keep at most this many entries. 0 disables the count cap.
    pub max_files: usize,
    /// Delete entries older than this. `None` disables the age cap.
    pub max_age: Option<Duration>,
}

struct LastRun {
    at: Instant,
    entries: usize,
}

static LAST_RUNS: Lazy<Mutex<HashMap<(PathBuf, String), LastRun>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Test hook: forget every recorded run.
pub fn reset_state() {
    LAST_RUNS.lock().clear();
}

struct Entry {
    path: PathBuf,
    name: String,
    mtime: SystemTime,
    is_dir: bool,
}

/// Apply `policy` to `dir`. Missing directories are a no-op.
pub fn enforce(dir: &Path, policy: &RetentionPolicy) -> io::Result<()> {
    let mut entries = match collect_entries(dir, &policy.prefix) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    let run_key = (dir.to_path_buf(), policy.key.clone());
    {
        let runs = LAST_RUNS.lock();
        if let Some(last) = runs.get(&run_key) {
            if last.at.elapsed() < MIN_RERUN_INTERVAL && last.entries == entries.len() {
                return Ok(());
            }
        }
    }
    let total = entries.len();

    // Newest first; lexicographically larger names win mtime ties
    // (timestamped names sort with their age).
    entries.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| b.name.cmp(&a.name)));

    let mut removed = 0usize;
    if policy.max_files > 0 {
        for entry in entries.iter().skip(policy.max_files) {
            remove_entry(entry);
            removed += 1;
        }
        entries.truncate(policy.max_files);
    }

    if let Some(max_age) = policy.max_age {
        let now = SystemTime::now();
        for entry in &entries {
            let age = now.duration_since(entry.mtime).unwrap_or_default();
            if age > max_age {
                remove_entry(entry);
                removed += 1;
            }
        }
    }

    if removed > 0 {
        debug!(dir = %dir.display(), key = %policy.key, removed, "Retention removed entries");
    }
    LAST_RUNS.lock().insert(
        run_key,
        LastRun {
            at: Instant::now(),
            entries: total.saturating_sub(removed),
        },
    );
    Ok(())
}

fn collect_entries(dir: &Path, prefix: &str) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in std::fs::read_dir(dir)? {
        let item = item?;
        let name = item.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) {
            continue;
        }
        let metadata = match item.metadata() {
            Ok(m) => m,
            // The entry vanished between readdir and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let mtime = metadata.modified()?;
        entries.push(Entry {
            path: item.path(),
            name,
            mtime,
            is_dir: metadata.is_dir(),
        });
    }
    Ok(entries)
}

fn remove_entry(entry: &Entry) {
    let result = if entry.is_dir {
        std::fs::remove_dir_all(&entry.path)
    } else {
        std::fs::remove_file(&entry.path)
    };
    if let Err(e) = result {
        debug!(path = %entry.path.display(), error = %e, "Retention removal failed");
    }
}
