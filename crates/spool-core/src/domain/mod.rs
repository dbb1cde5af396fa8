//! Domain model: identifiers, names and the durable task record.

pub mod ids;
pub mod record;
pub mod storage_key;
pub mod task;

pub use ids::TaskId;
pub use record::TaskRecord;
pub use storage_key::{StorageKey, TIMESTAMP_FORMAT, is_record_name};
pub use task::{QueueName, TaskType};
