//! Job and Handler traits.
//!
//! Two layers:
//! - **Dyn**: [`Job`] is object-safe and works on raw JSON params and payload
//!   bytes, so the registry can hold `Arc<dyn Job>` for any task type.
//! - **Typed**: [`Handler<T>`] works on a concrete [`Task`]; [`TypedJob`] erases
//!   it into a [`Job`].

use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::codec::PayloadCodec;
use super::context::JobContext;
use super::task::Task;

/// Failure reported by a job. Any variant counts as a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Codec(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        JobError::Failed(message.into())
    }
}

/// Job descriptor: knows its type name, how to build a payload from caller
/// params, and how to run a stored payload.
#[async_trait]
pub trait Job: Send + Sync {
    fn type_name(&self) -> &str;

    /// Build the payload for a new task. Runs on the enqueuing side.
    fn new_task(
        &self,
        ctx: &JobContext,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, JobError>;

    /// Run one stored payload. An error feeds the retry policy.
    async fn handle(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), JobError>;
}

/// Typed handler for one task type.
///
/// # Example
/// ```ignore
/// struct SendMailHandler;
///
/// #[async_trait]
/// impl Handler<SendMail> for SendMailHandler {
///     type Params = String;
///
///     fn new_task(&self, _ctx: &JobContext, to: String) -> Result<SendMail, JobError> {
///         Ok(SendMail { to })
///     }
///
///     async fn handle(&self, _ctx: &JobContext, task: SendMail) -> Result<(), JobError> {
///         println!("mailing {}", task.to);
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler<T: Task>: Send + Sync {
    type Params: DeserializeOwned + Send;

    fn new_task(&self, ctx: &JobContext, params: Self::Params) -> Result<T, JobError>;

    async fn handle(&self, ctx: &JobContext, task: T) -> Result<(), JobError>;
}

/// Erases a `Handler<T>` into a [`Job`].
pub struct TypedJob<T: Task, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: Task, H: Handler<T>> TypedJob<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Task, H: Handler<T>> Job for TypedJob<T, H> {
    fn type_name(&self) -> &str {
        T::TYPE
    }

    fn new_task(
        &self,
        ctx: &JobContext,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, JobError> {
        let params: H::Params =
            serde_json::from_value(params).map_err(|e| JobError::InvalidParams(e.to_string()))?;
        let task = self.handler.new_task(ctx, params)?;
        serde_json::to_value(&task).map_err(|e| JobError::Codec(format!("json encode: {e}")))
    }

    async fn handle(&self, ctx: &JobContext, payload: &[u8]) -> Result<(), JobError> {
        let task: T = PayloadCodec::decode(payload)?;
        self.handler.handle(ctx, task).await
    }
}
