//! Test fixtures shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::typed::{Job, JobContext, JobError};

/// Job whose behaviour is scripted up front: it fails a fixed number of
/// times, then succeeds; optionally it sleeps before answering.
pub(crate) struct ScriptedJob {
    type_name: String,
    failures_left: AtomicU32,
    calls: AtomicU32,
    delay: Duration,
    panics: bool,
}

impl ScriptedJob {
    pub(crate) fn new(type_name: &str, failures: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.to_string(),
            failures_left: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            delay,
            panics: false,
        })
    }

    pub(crate) fn succeeding(type_name: &str) -> Arc<Self> {
        Self::new(type_name, 0, Duration::ZERO)
    }

    pub(crate) fn failing(type_name: &str, failures: u32) -> Arc<Self> {
        Self::new(type_name, failures, Duration::ZERO)
    }

    pub(crate) fn always_failing(type_name: &str) -> Arc<Self> {
        Self::failing(type_name, u32::MAX)
    }

    pub(crate) fn slow(type_name: &str, delay: Duration) -> Arc<Self> {
        Self::new(type_name, 0, delay)
    }

    pub(crate) fn panicking(type_name: &str) -> Arc<Self> {
        Arc::new(Self {
            type_name: type_name.to_string(),
            failures_left: AtomicU32::new(0),
            calls: AtomicU32::new(0),
            delay: Duration::ZERO,
            panics: true,
        })
    }

    pub(crate) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for ScriptedJob {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn new_task(
        &self,
        _ctx: &JobContext,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, JobError> {
        if params.get("reject").is_some() {
            return Err(JobError::InvalidParams("rejected".into()));
        }
        Ok(params)
    }

    async fn handle(&self, _ctx: &JobContext, _payload: &[u8]) -> Result<(), JobError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panics {
            panic!("scripted panic on call {call}");
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(JobError::failed(format!("scripted failure on call {call}")));
        }
        Ok(())
    }
}

/// Dead-letter sink that only remembers what it was handed.
#[derive(Default)]
pub(crate) struct RecordingDeadLetter {
    reasons: std::sync::Mutex<Vec<crate::ports::DeadLetterReason>>,
}

impl RecordingDeadLetter {
    pub(crate) fn reasons(&self) -> Vec<crate::ports::DeadLetterReason> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl crate::ports::DeadLetterSink for RecordingDeadLetter {
    async fn accept(
        &self,
        letter: crate::ports::DeadLetter<'_>,
    ) -> Result<(), crate::error::SpoolError> {
        self.reasons.lock().unwrap().push(letter.reason);
        Ok(())
    }
}
