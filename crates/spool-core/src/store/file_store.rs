//! File-backed record storage.
//!
//! Every operation on a path goes through that path's lock from
//! [`PathLocks`]: reads share it, writes/deletes/renames take it exclusively.
//! Only processes that share the lock table are coordinated; two processes
//! pointed at one directory are not.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::path_lock::PathLocks;
use crate::error::SpoolError;

/// One directory entry returned by [`FileStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_file: bool,
}

pub struct FileStore {
    locks: Arc<PathLocks>,
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileStore {
    /// Store using the process-wide lock table.
    pub fn new() -> Self {
        Self::with_locks(PathLocks::global())
    }

    pub fn with_locks(locks: Arc<PathLocks>) -> Self {
        Self { locks }
    }

    /// Serialize `value` and fully replace the file at `path`.
    ///
    /// The bytes go to a hidden sibling first, are synced, then renamed over
    /// the target, so a reader sees either the old or the new content. The
    /// parent directory is synced after the rename so the new entry survives
    /// a crash.
    pub async fn write<T: Serialize + ?Sized>(
        &self,
        path: &Path,
        value: &T,
    ) -> Result<(), SpoolError> {
        let bytes = serde_json::to_vec_pretty(value)?;
        let tmp = temp_path(path);

        let _guard = self.locks.write(path).await;
        if let Err(err) = write_synced(&tmp, &bytes).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(err);
        }
        if let Err(source) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(SpoolError::io(path, source));
        }
        sync_parent(path).await
    }

    /// Read and decode the file at `path`.
    ///
    /// A missing file is [`SpoolError::NotFound`]; undecodable content is
    /// [`SpoolError::Serialization`].
    pub async fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T, SpoolError> {
        let bytes = {
            let _guard = self.locks.read(path).await;
            match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    return Err(SpoolError::NotFound(path.to_path_buf()));
                }
                Err(e) => return Err(SpoolError::io(path, e)),
            }
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Remove the file; a missing file is not an error. Returns whether a file
    /// was removed.
    pub async fn delete_if_exists(&self, path: &Path) -> Result<bool, SpoolError> {
        let _guard = self.locks.write(path).await;
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SpoolError::io(path, e)),
        }
    }

    /// Remove the file; a missing file is [`SpoolError::NotFound`].
    pub async fn delete(&self, path: &Path) -> Result<(), SpoolError> {
        if self.delete_if_exists(path).await? {
            Ok(())
        } else {
            Err(SpoolError::NotFound(path.to_path_buf()))
        }
    }

    /// Move a file to `to`, holding the source path exclusively.
    pub async fn rename(&self, from: &Path, to: &Path) -> Result<(), SpoolError> {
        let _guard = self.locks.write(from).await;
        tokio::fs::rename(from, to).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SpoolError::NotFound(from.to_path_buf()),
            _ => SpoolError::io(from, e),
        })
    }

    /// Remove temp files in `dir` left behind by writes that never reached
    /// their rename. Returns how many were removed.
    pub async fn remove_stale_temp_files(&self, dir: &Path) -> Result<usize, SpoolError> {
        let stale = self
            .list(dir, |name| target_of_temp(name).is_none())
            .await?;

        let mut removed = 0;
        for entry in stale.into_iter().filter(|e| e.is_file) {
            let Some(target) = target_of_temp(&entry.name) else {
                continue;
            };
            let _guard = self.locks.write(&dir.join(target)).await;
            match tokio::fs::remove_file(&entry.path).await {
                Ok(()) => {
                    debug!(path = %entry.path.display(), "removed stale temp file");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(SpoolError::io(&entry.path, e)),
            }
        }
        Ok(removed)
    }

    /// List `dir`, dropping every entry for which `exclude(name)` is true.
    ///
    /// Entries come back sorted by name. Names that are not valid UTF-8 are
    /// always dropped.
    pub async fn list<F>(&self, dir: &Path, exclude: F) -> Result<Vec<StoreEntry>, SpoolError>
    where
        F: Fn(&str) -> bool,
    {
        let mut reader = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| SpoolError::io(dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| SpoolError::io(dir, e))? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "skipping non utf-8 entry");
                continue;
            };
            if exclude(&name) {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| SpoolError::io(entry.path(), e))?;
            entries.push(StoreEntry {
                name,
                path: entry.path(),
                is_file: file_type.is_file(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), SpoolError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| SpoolError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| SpoolError::io(path, e))?;
    file.sync_all().await.map_err(|e| SpoolError::io(path, e))
}

#[cfg(unix)]
async fn sync_parent(path: &Path) -> Result<(), SpoolError> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    let dir = tokio::fs::File::open(parent)
        .await
        .map_err(|e| SpoolError::io(parent, e))?;
    dir.sync_all().await.map_err(|e| SpoolError::io(parent, e))
}

// Directories cannot be opened for syncing here.
#[cfg(not(unix))]
async fn sync_parent(_path: &Path) -> Result<(), SpoolError> {
    Ok(())
}

/// Target file name of a temp file name produced by [`temp_path`].
fn target_of_temp(name: &str) -> Option<&str> {
    name.strip_prefix('.')?
        .strip_suffix(".tmp")
        .filter(|target| !target.is_empty())
}

/// `<dir>/.<name>.tmp` - hidden, so scans never pick it up.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        text: String,
        n: u32,
    }

    fn note(n: u32) -> Note {
        Note {
            text: "x".repeat(4096),
            n,
        }
    }

    #[tokio::test]
    async fn write_then_read_replaces_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note");
        let store = FileStore::new();

        store.write(&path, &note(1)).await.unwrap();
        store.write(&path, &note(2)).await.unwrap();

        let read: Note = store.read(&path).await.unwrap();
        assert_eq!(read, note(2));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn read_distinguishes_missing_from_malformed() {
        let dir = tempdir().unwrap();
        let store = FileStore::new();

        let missing = store.read::<Note>(&dir.path().join("nope")).await;
        assert!(matches!(missing, Err(SpoolError::NotFound(_))));

        let garbage = dir.path().join("garbage");
        std::fs::write(&garbage, b"{ not json").unwrap();
        let malformed = store.read::<Note>(&garbage).await;
        assert!(matches!(malformed, Err(SpoolError::Serialization(_))));
    }

    #[tokio::test]
    async fn delete_variants() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note");
        let store = FileStore::new();
        store.write(&path, &note(1)).await.unwrap();

        assert!(store.delete_if_exists(&path).await.unwrap());
        assert!(!store.delete_if_exists(&path).await.unwrap());
        assert!(matches!(
            store.delete(&path).await,
            Err(SpoolError::NotFound(_))
        ));

        store.write(&path, &note(1)).await.unwrap();
        store.delete(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn list_applies_exclusion_and_sorts() {
        let dir = tempdir().unwrap();
        for name in ["b", "a", ".hidden", "c"] {
            std::fs::write(dir.path().join(name), b"{}").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let store = FileStore::new();

        let entries = store
            .list(dir.path(), |name| name.starts_with('.'))
            .await
            .unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "sub"]);
        assert!(entries[0].is_file);
        assert!(!entries[3].is_file);
    }

    #[tokio::test]
    async fn list_of_missing_directory_is_io_error() {
        let dir = tempdir().unwrap();
        let store = FileStore::new();
        let result = store.list(&dir.path().join("gone"), |_| false).await;
        assert!(matches!(result, Err(SpoolError::Io { .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_never_leave_a_torn_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("note");
        let store = Arc::new(FileStore::new());

        let mut writers = tokio::task::JoinSet::new();
        for n in 0..32 {
            let store = Arc::clone(&store);
            let path = path.clone();
            writers.spawn(async move { store.write(&path, &note(n)).await });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap().unwrap();
        }

        let read: Note = store.read(&path).await.unwrap();
        assert!(read.n < 32);
        assert_eq!(read.text.len(), 4096);
    }

    #[tokio::test]
    async fn write_into_fresh_directory_is_durable_and_leaves_no_temp() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("queue");
        std::fs::create_dir(&nested).unwrap();
        let path = nested.join("note");
        let store = FileStore::new();

        store.write(&path, &note(7)).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(&nested)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["note"]);
        assert_eq!(store.read::<Note>(&path).await.unwrap(), note(7));
    }

    #[tokio::test]
    async fn stale_temp_files_are_removed_and_nothing_else() {
        let dir = tempdir().unwrap();
        let store = FileStore::new();
        store.write(&dir.path().join("kept"), &note(1)).await.unwrap();
        std::fs::write(dir.path().join(".crashed.tmp"), b"{ half").unwrap();
        std::fs::write(dir.path().join(".hidden"), b"x").unwrap();
        std::fs::write(dir.path().join(".tmp"), b"x").unwrap();
        std::fs::create_dir(dir.path().join(".dir.tmp")).unwrap();

        assert_eq!(store.remove_stale_temp_files(dir.path()).await.unwrap(), 1);
        assert!(!dir.path().join(".crashed.tmp").exists());
        assert!(dir.path().join("kept").exists());
        assert!(dir.path().join(".hidden").exists());
        assert!(dir.path().join(".tmp").exists());
        assert!(dir.path().join(".dir.tmp").exists());
    }
}
