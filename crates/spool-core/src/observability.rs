//! Logging setup and per-cycle counters.

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// What one scan cycle saw and did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Record-named files in the queue directory.
    pub listed: usize,
    /// Records admitted to a bucket this cycle.
    pub selected: usize,
    /// Records left for a later cycle because their bucket was full.
    pub over_capacity: usize,
    /// Records that could not be read or decoded.
    pub unreadable: usize,
    /// Records naming a queue with no configured capacity.
    pub unknown_queue: usize,

    pub succeeded: usize,
    pub retried: usize,
    pub exhausted: usize,
    pub unroutable: usize,
}

impl CycleReport {
    pub fn merge(&mut self, other: &CycleReport) {
        self.listed += other.listed;
        self.selected += other.selected;
        self.over_capacity += other.over_capacity;
        self.unreadable += other.unreadable;
        self.unknown_queue += other.unknown_queue;
        self.succeeded += other.succeeded;
        self.retried += other.retried;
        self.exhausted += other.exhausted;
        self.unroutable += other.unroutable;
    }
}
