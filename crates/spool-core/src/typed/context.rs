//! Context handed to jobs when building and running tasks.

use std::any::Any;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};

use crate::domain::{QueueName, TaskId, TaskRecord};

/// Shared application state plus, while a task runs, that task's metadata.
///
/// The host stores whatever it needs (database pools, clients, ...) with
/// [`JobContext::with_state`] and handlers get it back with [`JobContext::state`].
#[derive(Clone, Default)]
pub struct JobContext {
    state: Option<Arc<dyn Any + Send + Sync>>,
    task: Option<TaskMeta>,
}

/// Metadata of the record being handled.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskMeta {
    pub id: TaskId,
    pub queue: QueueName,
    pub retried: u32,
    pub created_at: DateTime<FixedOffset>,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state<S: Any + Send + Sync>(state: Arc<S>) -> Self {
        Self {
            state: Some(state),
            task: None,
        }
    }

    /// Shared state, if it was registered with type `S`.
    pub fn state<S: Any + Send + Sync>(&self) -> Option<&S> {
        self.state.as_deref()?.downcast_ref::<S>()
    }

    /// Set only while a handler runs; `None` inside `new_task`.
    pub fn task(&self) -> Option<&TaskMeta> {
        self.task.as_ref()
    }

    pub(crate) fn for_task(&self, record: &TaskRecord) -> Self {
        Self {
            state: self.state.clone(),
            task: Some(TaskMeta {
                id: record.id(),
                queue: record.queue().clone(),
                retried: record.retried(),
                created_at: record.created_at(),
            }),
        }
    }
}
