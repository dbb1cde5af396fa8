//! WorkerDriver port - the backend contract.
//!
//! The file driver is the built-in implementation. A broker-backed driver that
//! delegates concurrency and retries to an external queue fits the same
//! contract and can be registered with the
//! [`WorkerManager`](crate::manager::WorkerManager).

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{QueueName, TaskId};
use crate::error::SpoolError;
use crate::typed::Job;

#[async_trait]
pub trait WorkerDriver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build a task with `job.new_task(params)` and persist it on the default
    /// queue. Returning `Ok` means the task is durably recorded.
    async fn enqueue(&self, job: &dyn Job, params: serde_json::Value) -> Result<TaskId, SpoolError> {
        self.enqueue_on(job, params, QueueName::default()).await
    }

    /// Same as [`enqueue`](Self::enqueue) on an explicit queue.
    async fn enqueue_on(
        &self,
        job: &dyn Job,
        params: serde_json::Value,
        queue: QueueName,
    ) -> Result<TaskId, SpoolError>;

    /// Register jobs; a type name that is already registered keeps its first job.
    fn register_handlers(&self, jobs: Vec<Arc<dyn Job>>);

    fn has_handler(&self, type_name: &str) -> bool;

    /// Register `jobs`, then process tasks until [`close`](Self::close).
    async fn run(&self, jobs: Vec<Arc<dyn Job>>) -> Result<(), SpoolError>;

    async fn close(&self) -> Result<(), SpoolError>;
}
