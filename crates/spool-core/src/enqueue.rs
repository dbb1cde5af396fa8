//! Enqueuer: turns a job plus caller params into a persisted record.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono_tz::Tz;
use tracing::debug;

use crate::domain::{QueueName, TaskRecord, TaskType};
use crate::error::SpoolError;
use crate::ports::{Clock, IdGenerator};
use crate::store::FileStore;
use crate::typed::{Job, JobContext};

pub struct Enqueuer {
    root: PathBuf,
    store: Arc<FileStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    timezone: Tz,
    queues: BTreeSet<QueueName>,
    context: JobContext,
}

impl Enqueuer {
    pub fn new(
        root: PathBuf,
        store: Arc<FileStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        timezone: Tz,
        queues: BTreeSet<QueueName>,
        context: JobContext,
    ) -> Self {
        Self {
            root,
            store,
            clock,
            ids,
            timezone,
            queues,
            context,
        }
    }

    /// Enqueue on the default queue.
    pub async fn enqueue(
        &self,
        job: &dyn Job,
        params: serde_json::Value,
    ) -> Result<TaskRecord, SpoolError> {
        self.enqueue_on(job, params, QueueName::default()).await
    }

    /// Build the payload, mint an id and storage key, and write the record.
    ///
    /// A record written here is picked up by a later scan cycle; a cycle that
    /// is already past its listing step will not see it.
    pub async fn enqueue_on(
        &self,
        job: &dyn Job,
        params: serde_json::Value,
        queue: QueueName,
    ) -> Result<TaskRecord, SpoolError> {
        if !self.queues.contains(&queue) {
            return Err(SpoolError::UnknownQueue(queue));
        }

        let task = job.new_task(&self.context, params)?;
        let payload = serde_json::to_vec(&task)?;

        let id = self.ids.generate_task_id();
        let created_at = self.clock.now().with_timezone(&self.timezone).fixed_offset();
        let record = TaskRecord::new(id, TaskType::new(job.type_name()), queue, payload, created_at);

        let path = self.root.join(record.storage_key().as_str());
        self.store.write(&path, &record).await?;

        debug!(
            task_id = %record.id(),
            type_name = %record.type_name(),
            queue = %record.queue(),
            path = %path.display(),
            "task enqueued"
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, UlidGenerator};
    use crate::testing::ScriptedJob;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::tempdir;

    fn enqueuer(root: PathBuf) -> Enqueuer {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 20, 45, 10).unwrap());
        Enqueuer::new(
            root,
            Arc::new(FileStore::new()),
            Arc::new(clock),
            Arc::new(UlidGenerator::new(clock)),
            chrono_tz::Asia::Tehran,
            BTreeSet::from([QueueName::default(), QueueName::new("critical")]),
            JobContext::new(),
        )
    }

    fn files(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn enqueue_persists_exactly_one_fresh_record() {
        let dir = tempdir().unwrap();
        let enqueuer = enqueuer(dir.path().to_path_buf());
        let job = ScriptedJob::succeeding("mail.send");

        let record = enqueuer
            .enqueue(job.as_ref(), json!({ "to": "a@example.com" }))
            .await
            .unwrap();

        assert_eq!(files(dir.path()), vec![record.storage_key().to_string()]);
        // 20:45:10 UTC is 00:15:10 the next day in Tehran (+03:30).
        assert!(record.storage_key().as_str().starts_with("2024-06-02T00-15-10_"));

        let stored: TaskRecord = FileStore::new()
            .read(&dir.path().join(record.storage_key().as_str()))
            .await
            .unwrap();
        assert_eq!(stored, record);
        assert_eq!(stored.retried(), 0);
        assert_eq!(stored.type_name().as_str(), "mail.send");
        assert_eq!(stored.queue().as_str(), "default");
        assert_eq!(stored.payload(), br#"{"to":"a@example.com"}"#);
    }

    #[tokio::test]
    async fn enqueue_on_targets_the_given_queue() {
        let dir = tempdir().unwrap();
        let enqueuer = enqueuer(dir.path().to_path_buf());
        let job = ScriptedJob::succeeding("mail.send");

        let record = enqueuer
            .enqueue_on(job.as_ref(), json!({}), QueueName::new("critical"))
            .await
            .unwrap();
        assert_eq!(record.queue().as_str(), "critical");
    }

    #[tokio::test]
    async fn failures_leave_no_record_behind() {
        let dir = tempdir().unwrap();
        let enqueuer = enqueuer(dir.path().to_path_buf());
        let job = ScriptedJob::succeeding("mail.send");

        let rejected = enqueuer.enqueue(job.as_ref(), json!({ "reject": true })).await;
        assert!(matches!(
            rejected,
            Err(SpoolError::Handler(crate::typed::JobError::InvalidParams(_)))
        ));

        let unknown = enqueuer
            .enqueue_on(job.as_ref(), json!({}), QueueName::new("bulk"))
            .await;
        assert!(matches!(unknown, Err(SpoolError::UnknownQueue(q)) if q.as_str() == "bulk"));

        assert!(files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn write_failure_is_propagated() {
        let dir = tempdir().unwrap();
        let enqueuer = enqueuer(dir.path().join("missing"));
        let job = ScriptedJob::succeeding("mail.send");

        let result = enqueuer.enqueue(job.as_ref(), json!({})).await;
        assert!(matches!(result, Err(SpoolError::Io { .. })));
    }
}
