//! IdGenerator port - task ID generation.
//!
//! # Implementations
//! - **UlidGenerator**: ULID based, timestamp taken from a [`Clock`]

use crate::domain::TaskId;
use crate::ports::Clock;
use ulid::Ulid;

/// Generates unique task IDs.
pub trait IdGenerator: Send + Sync {
    fn generate_task_id(&self) -> TaskId;
}

/// ULID based generator.
///
/// The timestamp part comes from the clock, so IDs minted under a
/// [`FixedClock`](crate::ports::FixedClock) share a prefix but still differ in
/// their random part.
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_task_id(&self) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        TaskId::from(ulid)
    }
}
