//! FileDriver - the file-backed worker driver.
//!
//! Wires configuration, store, registry, enqueuer, executor and poller
//! together. Assumes it is the only process using its queue directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::FileWorkerConfig;
use crate::domain::{QueueName, TaskId, TaskRecord, is_record_name};
use crate::enqueue::Enqueuer;
use crate::error::SpoolError;
use crate::executor::Executor;
use crate::impls::{DirectoryDeadLetter, LogDeadLetter};
use crate::observability::CycleReport;
use crate::ports::{Clock, DeadLetterSink, IdGenerator, SystemClock, UlidGenerator, WorkerDriver};
use crate::scheduler::Poller;
use crate::store::FileStore;
use crate::typed::{Handler, HandlerRegistry, Job, JobContext, Task};

/// Builds a [`FileDriver`].
///
/// # Example
/// ```ignore
/// let driver = FileDriver::builder(config)
///     .register_typed::<SendMail, _>(SendMailHandler)?
///     .expect_tasks(&["mail.send.v1"])
///     .build()
///     .await?;
/// ```
///
/// `build()` fails fast when a task type named in `expect_tasks()` has no
/// registered job.
pub struct FileDriverBuilder {
    config: FileWorkerConfig,
    clock: Arc<dyn Clock>,
    ids: Option<Arc<dyn IdGenerator>>,
    context: JobContext,
    dead_letter: Option<Arc<dyn DeadLetterSink>>,
    store: Option<Arc<FileStore>>,
    registry: HandlerRegistry,
    expected_tasks: Option<Vec<String>>,
}

impl FileDriverBuilder {
    pub fn new(config: FileWorkerConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            ids: None,
            context: JobContext::new(),
            dead_letter: None,
            store: None,
            registry: HandlerRegistry::new(),
            expected_tasks: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Defaults to a ULID generator on the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn context(mut self, context: JobContext) -> Self {
        self.context = context;
        self
    }

    /// Overrides the sink chosen from `dead_letter_dir`.
    pub fn dead_letter(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letter = Some(sink);
        self
    }

    pub fn store(mut self, store: Arc<FileStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn register(self, job: Arc<dyn Job>) -> Result<Self, SpoolError> {
        self.registry.register(job)?;
        Ok(self)
    }

    pub fn register_typed<T: Task, H: Handler<T> + 'static>(
        self,
        handler: H,
    ) -> Result<Self, SpoolError> {
        self.registry.register_typed::<T, H>(handler)?;
        Ok(self)
    }

    pub fn expect_tasks(mut self, task_types: &[&str]) -> Self {
        self.expected_tasks = Some(task_types.iter().map(|t| t.to_string()).collect());
        self
    }

    pub async fn build(self) -> Result<FileDriver, SpoolError> {
        self.config.validate()?;

        if let Some(expected_tasks) = &self.expected_tasks {
            let missing: Vec<String> = expected_tasks
                .iter()
                .filter(|t| !self.registry.contains(t))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(SpoolError::MissingHandlers(missing));
            }
        }

        let timezone = self.config.timezone()?;
        let root = self.config.root_path()?;
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| SpoolError::io(&root, e))?;

        let store = self.store.unwrap_or_else(|| Arc::new(FileStore::new()));
        let removed = store.remove_stale_temp_files(&root).await?;
        if removed > 0 {
            info!(root = %root.display(), removed, "removed temp files left by interrupted writes");
        }
        let dead_letter: Arc<dyn DeadLetterSink> = match (self.dead_letter, self.config.dead_letter_path(&root)) {
            (Some(sink), _) => sink,
            (None, Some(dir)) => Arc::new(DirectoryDeadLetter::create(dir, Arc::clone(&store)).await?),
            (None, None) => Arc::new(LogDeadLetter),
        };
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&self.clock))));
        let registry = Arc::new(self.registry);
        let capacities = self.config.capacities();

        let enqueuer = Enqueuer::new(
            root.clone(),
            Arc::clone(&store),
            Arc::clone(&self.clock),
            ids,
            timezone,
            capacities.keys().cloned().collect::<BTreeSet<_>>(),
            self.context.clone(),
        );
        let executor = Arc::new(Executor::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            self.clock,
            timezone,
            self.config.max_retry,
            self.context,
            Arc::clone(&dead_letter),
        ));
        let poller = Poller::new(
            root.clone(),
            Arc::clone(&store),
            executor,
            dead_letter,
            capacities,
            self.config.check_interval(),
            self.config.task_sleep(),
        );

        let (shutdown_tx, _) = watch::channel(false);
        debug!(root = %root.display(), "file driver initialized");
        Ok(FileDriver {
            root,
            store,
            registry,
            enqueuer,
            poller,
            shutdown_tx,
        })
    }
}

pub struct FileDriver {
    root: PathBuf,
    store: Arc<FileStore>,
    registry: Arc<HandlerRegistry>,
    enqueuer: Enqueuer,
    poller: Poller,
    shutdown_tx: watch::Sender<bool>,
}

impl FileDriver {
    pub const NAME: &'static str = "file";

    pub fn builder(config: FileWorkerConfig) -> FileDriverBuilder {
        FileDriverBuilder::new(config)
    }

    /// Build with defaults: system clock, ULID ids, sink from config.
    pub async fn init(config: FileWorkerConfig) -> Result<Self, SpoolError> {
        Self::builder(config).build().await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Like [`WorkerDriver::enqueue_on`] but returns the whole persisted record.
    pub async fn enqueue_record(
        &self,
        job: &dyn Job,
        params: serde_json::Value,
        queue: QueueName,
    ) -> Result<TaskRecord, SpoolError> {
        self.enqueuer.enqueue_on(job, params, queue).await
    }

    /// Run exactly one scan cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, SpoolError> {
        self.poller.run_cycle().await
    }

    /// Decoded pending records, oldest storage key first. Unreadable files are
    /// skipped with a warning.
    pub async fn pending(&self) -> Result<Vec<TaskRecord>, SpoolError> {
        let entries = self
            .store
            .list(&self.root, |name| !is_record_name(name))
            .await?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries.into_iter().filter(|e| e.is_file) {
            match self.store.read::<TaskRecord>(&entry.path).await {
                Ok(record) => records.push(record),
                Err(SpoolError::NotFound(_)) => {}
                Err(err) => warn!(path = %entry.path.display(), %err, "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl WorkerDriver for FileDriver {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn enqueue_on(
        &self,
        job: &dyn Job,
        params: serde_json::Value,
        queue: QueueName,
    ) -> Result<TaskId, SpoolError> {
        let record = self.enqueuer.enqueue_on(job, params, queue).await?;
        Ok(record.id())
    }

    fn register_handlers(&self, jobs: Vec<Arc<dyn Job>>) {
        if jobs.is_empty() {
            debug!("no job handlers provided to register");
            return;
        }
        self.registry.register_all(jobs);
    }

    fn has_handler(&self, type_name: &str) -> bool {
        self.registry.contains(type_name)
    }

    async fn run(&self, jobs: Vec<Arc<dyn Job>>) -> Result<(), SpoolError> {
        self.register_handlers(jobs);
        info!(handlers = ?self.registry.registered_types(), "file driver running");
        self.poller.run(self.shutdown_tx.subscribe()).await;
        Ok(())
    }

    async fn close(&self) -> Result<(), SpoolError> {
        self.shutdown_tx.send_replace(true);
        Ok(())
    }
}
