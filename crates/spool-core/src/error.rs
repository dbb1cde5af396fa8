use std::path::PathBuf;

use thiserror::Error;

use crate::domain::{QueueName, TaskId, TaskType};
use crate::typed::JobError;

#[derive(Debug, Error)]
pub enum SpoolError {
    #[error("invalid worker configuration: {0}")]
    Config(String),

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no record at {0}")]
    NotFound(PathBuf),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("handler not found for task_type={0}")]
    Unroutable(TaskType),

    #[error("duplicate handler for task_type={0}")]
    DuplicateHandler(TaskType),

    #[error("missing handlers for task types: {0:?}")]
    MissingHandlers(Vec<String>),

    #[error("queue `{0}` has no configured capacity")]
    UnknownQueue(QueueName),

    #[error("job failed: {0}")]
    Handler(#[from] JobError),

    #[error("task {id} dropped after {retried} failed attempts")]
    RetryExhausted { id: TaskId, retried: u32 },

    #[error("unsupported worker driver `{0}`")]
    UnknownDriver(String),
}

impl SpoolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpoolError::Io {
            path: path.into(),
            source,
        }
    }

    /// Missing-file outcome of a read or strict delete.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SpoolError::NotFound(_))
    }
}
