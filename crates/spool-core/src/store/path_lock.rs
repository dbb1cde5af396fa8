//! Per-path reader/writer locks.
//!
//! Every distinct path gets one lock, created by the first caller and shared
//! by everyone who asks while it is alive. The table only keeps weak
//! references: once no guard or waiter holds a path's lock, the entry is
//! pruned on a later miss, so the table stays bounded by the paths in use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};

use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

static GLOBAL: LazyLock<Arc<PathLocks>> = LazyLock::new(|| Arc::new(PathLocks::new()));

#[derive(Default)]
pub struct PathLocks {
    table: Mutex<HashMap<PathBuf, Weak<RwLock<()>>>>,
}

/// Shared (read) hold on one path.
pub struct PathReadGuard {
    _guard: OwnedRwLockReadGuard<()>,
}

/// Exclusive (write) hold on one path.
pub struct PathWriteGuard {
    _guard: OwnedRwLockWriteGuard<()>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide table shared by every store that does not bring its own.
    pub fn global() -> Arc<PathLocks> {
        Arc::clone(&GLOBAL)
    }

    fn lock_for(&self, path: &Path) -> Arc<RwLock<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(lock) = table.get(path).and_then(Weak::upgrade) {
            return lock;
        }
        table.retain(|_, lock| lock.strong_count() > 0);
        let lock = Arc::new(RwLock::new(()));
        table.insert(path.to_path_buf(), Arc::downgrade(&lock));
        lock
    }

    pub async fn read(&self, path: &Path) -> PathReadGuard {
        let lock = self.lock_for(path);
        PathReadGuard {
            _guard: lock.read_owned().await,
        }
    }

    pub async fn write(&self, path: &Path) -> PathWriteGuard {
        let lock = self.lock_for(path);
        PathWriteGuard {
            _guard: lock.write_owned().await,
        }
    }

    /// Number of entries whose lock is still alive.
    pub fn live_entries(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|lock| lock.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn writer_excludes_other_holders_of_the_same_path() {
        let locks = PathLocks::new();
        let path = Path::new("/queue/a");

        let writer = locks.write(path).await;
        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.read(path)).await;
        assert!(blocked.is_err());

        drop(writer);
        let reader = tokio::time::timeout(Duration::from_millis(50), locks.read(path)).await;
        assert!(reader.is_ok());
    }

    #[tokio::test]
    async fn readers_share_and_paths_are_independent() {
        let locks = PathLocks::new();

        let _r1 = locks.read(Path::new("/queue/a")).await;
        let _r2 = tokio::time::timeout(Duration::from_millis(50), locks.read(Path::new("/queue/a")))
            .await
            .expect("readers share a path");
        let _w = tokio::time::timeout(Duration::from_millis(50), locks.write(Path::new("/queue/b")))
            .await
            .expect("other paths are not blocked");
        assert_eq!(locks.live_entries(), 2);
    }

    #[tokio::test]
    async fn released_paths_are_pruned() {
        let locks = PathLocks::new();
        for i in 0..16 {
            let _guard = locks.write(&PathBuf::from(format!("/queue/{i}"))).await;
        }
        assert_eq!(locks.live_entries(), 0);

        let _guard = locks.write(Path::new("/queue/fresh")).await;
        assert_eq!(locks.table.lock().unwrap().len(), 1);
    }
}
