//! Task record: the durable unit of enqueued work.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use super::{QueueName, StorageKey, TaskId, TaskType};

/// Everything the scheduler needs to know about one pending task.
///
/// Lifecycle:
/// - created by the enqueuer and persisted at `<root>/<storage_key>`
/// - discovered by a scan cycle and executed once per cycle
/// - deleted on success or when `retried` exceeds the retry limit
/// - otherwise re-persisted in place with `retried` bumped by one
///
/// The storage key is derived once in [`TaskRecord::new`] and has no setter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    id: TaskId,
    type_name: TaskType,
    storage_key: StorageKey,
    queue: QueueName,

    /// Opaque to the queue; only the handler knows how to read it.
    #[serde(with = "payload_base64")]
    payload: Vec<u8>,

    /// Failed attempts so far.
    retried: u32,

    created_at: DateTime<FixedOffset>,

    /// Set on the first failure, refreshed on every later one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<FixedOffset>>,
}

impl TaskRecord {
    pub fn new(
        id: TaskId,
        type_name: TaskType,
        queue: QueueName,
        payload: Vec<u8>,
        created_at: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            id,
            storage_key: StorageKey::new(&created_at, id),
            type_name,
            queue,
            payload,
            retried: 0,
            created_at,
            updated_at: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn type_name(&self) -> &TaskType {
        &self.type_name
    }

    pub fn storage_key(&self) -> &StorageKey {
        &self.storage_key
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn retried(&self) -> u32 {
        self.retried
    }

    pub fn created_at(&self) -> DateTime<FixedOffset> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<FixedOffset>> {
        self.updated_at
    }

    /// Count one failed attempt. Returns the new retry count.
    pub fn record_failure(&mut self, now: DateTime<FixedOffset>) -> u32 {
        self.retried = self.retried.saturating_add(1);
        self.updated_at = Some(now);
        self.retried
    }

    /// A record is dropped once it has failed more than `max_retry` times.
    pub fn is_exhausted(&self, max_retry: u32) -> bool {
        self.retried > max_retry
    }
}

mod payload_base64 {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use ulid::Ulid;

    fn record() -> TaskRecord {
        let created_at = Utc
            .with_ymd_and_hms(2024, 3, 9, 8, 15, 0)
            .unwrap()
            .fixed_offset();
        TaskRecord::new(
            TaskId::from_ulid(Ulid::new()),
            TaskType::new("mail.send"),
            QueueName::default(),
            br#"{"to":"a@example.com"}"#.to_vec(),
            created_at,
        )
    }

    #[test]
    fn new_record_starts_clean() {
        let record = record();
        assert_eq!(record.retried(), 0);
        assert_eq!(record.updated_at(), None);
        assert_eq!(record.queue().as_str(), "default");
        assert!(record.storage_key().as_str().starts_with("2024-03-09T08-15-00_"));
        assert!(record.storage_key().as_str().ends_with(&record.id().to_string()));
    }

    #[test]
    fn failures_bump_retry_count_and_touch_updated_at() {
        let mut record = record();
        let key = record.storage_key().clone();
        let later = record.created_at() + chrono::Duration::seconds(30);

        assert_eq!(record.record_failure(later), 1);
        assert_eq!(record.record_failure(later), 2);
        assert_eq!(record.updated_at(), Some(later));
        assert_eq!(record.storage_key(), &key);
    }

    #[test]
    fn exhausted_only_after_exceeding_max_retry() {
        let mut record = record();
        let now = record.created_at();
        record.record_failure(now);
        record.record_failure(now);
        assert!(!record.is_exhausted(2));
        record.record_failure(now);
        assert!(record.is_exhausted(2));
    }

    #[test]
    fn payload_is_stored_as_base64_text() {
        let record = record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["payload"], "eyJ0byI6ImFAZXhhbXBsZS5jb20ifQ==");
        assert!(json.get("updated_at").is_none());

        let decoded: TaskRecord = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, record);
    }
}
