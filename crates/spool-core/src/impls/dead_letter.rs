//! DeadLetterSink implementations.
//!
//! - **LogDeadLetter**: reports and leaves files where they are
//! - **DirectoryDeadLetter**: moves files into a quarantine directory

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::SpoolError;
use crate::ports::{DeadLetter, DeadLetterReason, DeadLetterSink};
use crate::store::FileStore;

/// Logs every report. Unroutable, corrupt and unknown-queue records stay in
/// the queue directory and are seen again next cycle.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDeadLetter;

#[async_trait]
impl DeadLetterSink for LogDeadLetter {
    async fn accept(&self, letter: DeadLetter<'_>) -> Result<(), SpoolError> {
        warn!(
            reason = %letter.reason,
            path = %letter.path.display(),
            task_id = ?letter.record.map(|r| r.id()),
            cause = %letter.cause,
            "task record dead-lettered"
        );
        Ok(())
    }
}

/// Moves records out of the scan set into `dir`.
///
/// Exhausted records are copied (their original is deleted by the executor);
/// everything else is renamed. Point `dir` at a hidden subdirectory of the
/// queue root (e.g. `.dead`) or somewhere else entirely.
pub struct DirectoryDeadLetter {
    dir: PathBuf,
    store: Arc<FileStore>,
}

impl DirectoryDeadLetter {
    /// Create the sink, making sure the directory exists.
    pub async fn create(dir: impl Into<PathBuf>, store: Arc<FileStore>) -> Result<Self, SpoolError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SpoolError::io(&dir, e))?;
        Ok(Self { dir, store })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DeadLetterSink for DirectoryDeadLetter {
    async fn accept(&self, letter: DeadLetter<'_>) -> Result<(), SpoolError> {
        let Some(name) = letter.path.file_name() else {
            return Err(SpoolError::NotFound(letter.path.to_path_buf()));
        };
        let target = self.dir.join(name);

        match (letter.reason, letter.record) {
            (DeadLetterReason::RetryExhausted, Some(record)) => {
                self.store.write(&target, record).await?;
            }
            _ => self.store.rename(letter.path, &target).await?,
        }
        warn!(
            reason = %letter.reason,
            from = %letter.path.display(),
            to = %target.display(),
            cause = %letter.cause,
            "task record moved to dead-letter directory"
        );
        Ok(())
    }
}
