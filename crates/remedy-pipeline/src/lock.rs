// ABOUTME: Serializes runs against the same source file within the process
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

static RUN_LOCKS: Lazy<DashMap<PathBuf, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

/// Held for the duration of a run; released on drop. The registry entry
/// goes with the last holder so the map only tracks paths in use.
pub struct RunGuard {
    key: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.guard.take();
        // waiters hold their own clone, so a count of one means only the map is left
        RUN_LOCKS.remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Wait for exclusive use of `path`. Paths that resolve to the same file
/// share one lock.
pub async fn acquire(path: &Path) -> RunGuard {
    let key = tokio::fs::canonicalize(path)
        .await
        .unwrap_or_else(|_| path.to_path_buf());
    let lock = RUN_LOCKS
        .entry(key.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    RunGuard {
        key,
        guard: Some(lock.lock_owned().await),
    }
}
