//! Executor: runs one record and applies the retry/eviction policy.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;

use chrono_tz::Tz;
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::domain::TaskRecord;
use crate::error::SpoolError;
use crate::ports::{Clock, DeadLetter, DeadLetterReason, DeadLetterSink};
use crate::store::FileStore;
use crate::typed::{HandlerRegistry, JobContext, JobError};

/// What happened to a record after one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Handler succeeded; the record file is gone.
    Succeeded,
    /// Handler failed; the record was written back with this retry count.
    Retrying { retried: u32 },
    /// Handler failed past the retry limit; the record file is gone.
    Exhausted { retried: u32 },
    /// No handler for the type name; the record was handed to the dead-letter sink.
    Unroutable,
}

pub struct Executor {
    store: Arc<FileStore>,
    registry: Arc<HandlerRegistry>,
    clock: Arc<dyn Clock>,
    timezone: Tz,
    max_retry: u32,
    context: JobContext,
    dead_letter: Arc<dyn DeadLetterSink>,
}

impl Executor {
    pub fn new(
        store: Arc<FileStore>,
        registry: Arc<HandlerRegistry>,
        clock: Arc<dyn Clock>,
        timezone: Tz,
        max_retry: u32,
        context: JobContext,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            store,
            registry,
            clock,
            timezone,
            max_retry,
            context,
            dead_letter,
        }
    }

    pub fn max_retry(&self) -> u32 {
        self.max_retry
    }

    /// Execute `record`, read from the file at `path`, once.
    ///
    /// Success deletes that file. Failure bumps the retry count and either
    /// writes the record back to the same file or, past `max_retry`, deletes
    /// it. A panicking handler counts as a failure. Store errors on the way
    /// out are logged; the returned outcome reflects the handler's verdict.
    pub async fn execute(&self, path: &Path, mut record: TaskRecord) -> Execution {
        let Some(job) = self.registry.lookup(record.type_name().as_str()) else {
            let cause = SpoolError::Unroutable(record.type_name().clone());
            self.dead_letter(DeadLetterReason::Unroutable, path, &record, &cause)
                .await;
            return Execution::Unroutable;
        };

        let ctx = self.context.for_task(&record);
        let outcome = AssertUnwindSafe(job.handle(&ctx, record.payload()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(JobError::failed(format!(
                    "handler panicked: {}",
                    panic_message(&*panic)
                )))
            });
        match outcome {
            Ok(()) => {
                match self.store.delete(path).await {
                    Ok(()) => info!(
                        task_id = %record.id(),
                        type_name = %record.type_name(),
                        queue = %record.queue(),
                        "task executed successfully and record deleted"
                    ),
                    Err(err) => error!(
                        task_id = %record.id(),
                        %err,
                        "task executed successfully but its record could not be deleted"
                    ),
                }
                Execution::Succeeded
            }
            Err(job_err) => {
                let now = self.clock.now().with_timezone(&self.timezone).fixed_offset();
                let retried = record.record_failure(now);
                warn!(
                    task_id = %record.id(),
                    type_name = %record.type_name(),
                    retried,
                    max_retry = self.max_retry,
                    err = %job_err,
                    "task failed"
                );

                if record.is_exhausted(self.max_retry) {
                    let cause = SpoolError::RetryExhausted {
                        id: record.id(),
                        retried,
                    };
                    self.dead_letter(DeadLetterReason::RetryExhausted, path, &record, &cause)
                        .await;
                    match self.store.delete_if_exists(path).await {
                        Ok(_) => warn!(
                            task_id = %record.id(),
                            retried,
                            "task exceeded retry limit and record deleted"
                        ),
                        Err(err) => error!(
                            task_id = %record.id(),
                            %err,
                            "could not delete exhausted task record"
                        ),
                    }
                    Execution::Exhausted { retried }
                } else {
                    match self.store.write(path, &record).await {
                        Ok(()) => info!(task_id = %record.id(), retried, "task record updated for retry"),
                        Err(err) => error!(
                            task_id = %record.id(),
                            %err,
                            "could not update task record for retry"
                        ),
                    }
                    Execution::Retrying { retried }
                }
            }
        }
    }

    async fn dead_letter(
        &self,
        reason: DeadLetterReason,
        path: &Path,
        record: &TaskRecord,
        cause: &SpoolError,
    ) {
        let letter = DeadLetter {
            reason,
            path,
            record: Some(record),
            cause,
        };
        if let Err(err) = self.dead_letter.accept(letter).await {
            error!(task_id = %record.id(), %reason, %err, "dead-letter sink rejected record");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
