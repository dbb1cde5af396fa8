//! spool-core
//!
//! A durable job queue backed by a plain directory: one JSON file per pending
//! task, named so that a directory listing is also the oldest-first order.
//!
//! # Modules
//! - **domain**: ids, queue and type names, storage keys, the task record
//! - **ports**: seams (Clock, IdGenerator, DeadLetterSink, WorkerDriver)
//! - **store**: per-path locks and the atomic JSON file store
//! - **typed**: typed Task/Handler API, the type-erased Job and its registry
//! - **impls**: built-in dead-letter sinks
//! - **enqueue / executor / scheduler**: write, run and poll task records
//! - **driver / manager**: the file driver and driver selection by name

pub mod config;
pub mod domain;
pub mod driver;
pub mod enqueue;
pub mod error;
pub mod executor;
pub mod impls;
pub mod manager;
pub mod observability;
pub mod ports;
pub mod scheduler;
pub mod store;
pub mod typed;

#[cfg(test)]
mod testing;

pub use config::FileWorkerConfig;
pub use domain::{QueueName, StorageKey, TaskId, TaskRecord, TaskType};
pub use driver::{FileDriver, FileDriverBuilder};
pub use error::SpoolError;
pub use manager::{DriverFactory, FileDriverFactory, WorkerManager};
pub use observability::{CycleReport, init_tracing};
pub use ports::WorkerDriver;
pub use typed::{Handler, Job, JobContext, JobError, Task};
