//! DeadLetterSink port - where records the scheduler cannot process are reported.
//!
//! Without a sink these records would just sit in the queue directory (or
//! vanish, for exhausted ones) with nothing but a log line to show for it.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

use crate::domain::TaskRecord;
use crate::error::SpoolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadLetterReason {
    /// No handler is registered for the record's type name.
    Unroutable,
    /// The record file could not be decoded.
    Corrupt,
    /// The record names a queue with no configured capacity.
    UnknownQueue,
    /// The record failed more often than the retry limit allows.
    RetryExhausted,
}

impl fmt::Display for DeadLetterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeadLetterReason::Unroutable => "unroutable",
            DeadLetterReason::Corrupt => "corrupt",
            DeadLetterReason::UnknownQueue => "unknown_queue",
            DeadLetterReason::RetryExhausted => "retry_exhausted",
        };
        f.write_str(text)
    }
}

/// One report handed to a sink.
///
/// `record` is `None` for corrupt files. For every reason except
/// `RetryExhausted` the file is still at `path` when the sink is called; for
/// `RetryExhausted` the caller deletes it after the sink returns.
#[derive(Debug, Clone, Copy)]
pub struct DeadLetter<'a> {
    pub reason: DeadLetterReason,
    pub path: &'a Path,
    pub record: Option<&'a TaskRecord>,
    pub cause: &'a SpoolError,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn accept(&self, letter: DeadLetter<'_>) -> Result<(), SpoolError>;
}
