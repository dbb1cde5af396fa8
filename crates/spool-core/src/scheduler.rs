//! Poller: the scan → bucket → dispatch → wait loop.
//!
//! One cycle:
//! 1. list the queue directory, keeping only record-named, non-hidden files
//! 2. read each record and add it to its queue's bucket until the bucket
//!    holds as many records as the queue's capacity; the rest wait for a
//!    later cycle
//! 3. spawn one worker per non-empty bucket; a worker runs its records one
//!    after another with an optional pause between them
//! 4. wait for every worker before returning
//!
//! The loop then sleeps for the check interval and starts over. A stop
//! request is honoured between cycles only; a running cycle always finishes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::domain::{QueueName, TaskRecord, is_record_name};
use crate::error::SpoolError;
use crate::executor::{Execution, Executor};
use crate::observability::CycleReport;
use crate::ports::{DeadLetter, DeadLetterReason, DeadLetterSink};
use crate::store::FileStore;

/// Result of offering one record to [`Buckets::admit`].
#[derive(Debug)]
pub enum Admission {
    Admitted,
    /// The queue already holds its capacity for this cycle.
    OverCapacity(TaskRecord),
    /// The queue has no configured capacity.
    UnknownQueue(TaskRecord),
}

/// Per-queue selections of one cycle. Each record travels with the path of
/// the file it was read from.
#[derive(Debug)]
pub struct Buckets {
    capacities: Arc<BTreeMap<QueueName, usize>>,
    selected: BTreeMap<QueueName, Vec<(PathBuf, TaskRecord)>>,
}

impl Buckets {
    pub fn new(capacities: Arc<BTreeMap<QueueName, usize>>) -> Self {
        Self {
            capacities,
            selected: BTreeMap::new(),
        }
    }

    pub fn admit(&mut self, path: PathBuf, record: TaskRecord) -> Admission {
        let Some(&capacity) = self.capacities.get(record.queue()) else {
            return Admission::UnknownQueue(record);
        };
        let bucket = self.selected.entry(record.queue().clone()).or_default();
        if bucket.len() >= capacity {
            return Admission::OverCapacity(record);
        }
        bucket.push((path, record));
        Admission::Admitted
    }

    pub fn len(&self, queue: &QueueName) -> usize {
        self.selected.get(queue).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.selected.values().all(Vec::is_empty)
    }

    /// Non-empty buckets, in queue-name order.
    pub fn into_non_empty(
        self,
    ) -> impl Iterator<Item = (QueueName, Vec<(PathBuf, TaskRecord)>)> {
        self.selected
            .into_iter()
            .filter(|(_, records)| !records.is_empty())
    }
}

pub struct Poller {
    root: PathBuf,
    store: Arc<FileStore>,
    executor: Arc<Executor>,
    dead_letter: Arc<dyn DeadLetterSink>,
    capacities: Arc<BTreeMap<QueueName, usize>>,
    check_interval: Duration,
    task_sleep: Duration,
}

impl Poller {
    pub fn new(
        root: PathBuf,
        store: Arc<FileStore>,
        executor: Arc<Executor>,
        dead_letter: Arc<dyn DeadLetterSink>,
        capacities: BTreeMap<QueueName, usize>,
        check_interval: Duration,
        task_sleep: Duration,
    ) -> Self {
        Self {
            root,
            store,
            executor,
            dead_letter,
            capacities: Arc::new(capacities),
            check_interval,
            task_sleep,
        }
    }

    /// Run cycles until `shutdown` turns `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            root = %self.root.display(),
            queues = self.capacities.len(),
            interval_secs = self.check_interval.as_secs_f64(),
            "poller started"
        );
        loop {
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            match self.run_cycle().await {
                Ok(report) => info!(
                    listed = report.listed,
                    selected = report.selected,
                    succeeded = report.succeeded,
                    retried = report.retried,
                    exhausted = report.exhausted,
                    deferred = report.over_capacity,
                    next_check_secs = self.check_interval.as_secs_f64(),
                    "scan cycle finished"
                ),
                Err(err) => error!(
                    %err,
                    "scan cycle skipped; will try again at the next check"
                ),
            }

            if self.check_interval.is_zero() {
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(self.check_interval) => {}
            }
        }
        info!("poller stopped");
    }

    /// One full cycle. Only a failure to list the directory is an error;
    /// everything per record is logged and counted.
    pub async fn run_cycle(&self) -> Result<CycleReport, SpoolError> {
        let entries = self
            .store
            .list(&self.root, |name| !is_record_name(name))
            .await?;

        let mut report = CycleReport {
            listed: entries.len(),
            ..CycleReport::default()
        };
        let mut buckets = Buckets::new(Arc::clone(&self.capacities));

        for entry in entries.into_iter().filter(|e| e.is_file) {
            let record = match self.store.read::<TaskRecord>(&entry.path).await {
                Ok(record) => record,
                Err(SpoolError::NotFound(_)) => {
                    debug!(path = %entry.path.display(), "record vanished before it was read");
                    continue;
                }
                Err(err) => {
                    report.unreadable += 1;
                    error!(path = %entry.path.display(), %err, "could not read task record");
                    if matches!(err, SpoolError::Serialization(_)) {
                        self.dead_letter(DeadLetterReason::Corrupt, &entry.path, None, &err)
                            .await;
                    }
                    continue;
                }
            };

            match buckets.admit(entry.path.clone(), record) {
                Admission::Admitted => report.selected += 1,
                Admission::OverCapacity(_) => report.over_capacity += 1,
                Admission::UnknownQueue(record) => {
                    report.unknown_queue += 1;
                    let cause = SpoolError::UnknownQueue(record.queue().clone());
                    warn!(task_id = %record.id(), queue = %record.queue(), "unknown queue for task");
                    self.dead_letter(
                        DeadLetterReason::UnknownQueue,
                        &entry.path,
                        Some(&record),
                        &cause,
                    )
                    .await;
                }
            }
        }

        let mut workers = JoinSet::new();
        for (queue, records) in buckets.into_non_empty() {
            let executor = Arc::clone(&self.executor);
            let task_sleep = self.task_sleep;
            workers.spawn(async move {
                debug!(%queue, count = records.len(), "bucket worker started");
                let mut tally = CycleReport::default();
                let total = records.len();
                for (i, (path, record)) in records.into_iter().enumerate() {
                    tally.count(executor.execute(&path, record).await);
                    if !task_sleep.is_zero() && i + 1 < total {
                        tokio::time::sleep(task_sleep).await;
                    }
                }
                tally
            });
        }

        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(tally) => report.merge(&tally),
                Err(err) => error!(%err, "bucket worker aborted"),
            }
        }
        Ok(report)
    }

    async fn dead_letter(
        &self,
        reason: DeadLetterReason,
        path: &std::path::Path,
        record: Option<&TaskRecord>,
        cause: &SpoolError,
    ) {
        let letter = DeadLetter {
            reason,
            path,
            record,
            cause,
        };
        if let Err(err) = self.dead_letter.accept(letter).await {
            error!(path = %path.display(), %reason, %err, "dead-letter sink rejected record");
        }
    }
}

impl CycleReport {
    fn count(&mut self, execution: Execution) {
        match execution {
            Execution::Succeeded => self.succeeded += 1,
            Execution::Retrying { .. } => self.retried += 1,
            Execution::Exhausted { .. } => self.exhausted += 1,
            Execution::Unroutable => self.unroutable += 1,
        }
    }
}
