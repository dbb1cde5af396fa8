use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Context;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use spool_core::typed::TypedJob;
use spool_core::{
    FileDriver, FileWorkerConfig, Handler, Job, JobContext, JobError, QueueName, Task,
    WorkerDriver, init_tracing,
};

#[derive(Debug, Parser)]
#[command(name = "spool", about = "File-backed durable job queue")]
struct Cli {
    /// TOML file with the file driver settings. Defaults apply when omitted.
    #[arg(long, env = "SPOOL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Poll the queue directory until Ctrl-C.
    Run {
        /// Failures the hello handler injects before it starts succeeding.
        #[arg(long, default_value_t = 0)]
        fail_first: u32,
    },
    /// Run a single scan cycle and print its report.
    Once,
    /// Persist a hello task.
    Enqueue {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = QueueName::DEFAULT)]
        queue: String,
    },
    /// Print pending records, oldest first.
    List,
}

#[derive(Debug, Serialize, Deserialize)]
struct HelloTask {
    name: String,
}

impl Task for HelloTask {
    const TYPE: &'static str = "hello";
}

#[derive(Debug, Deserialize)]
struct HelloParams {
    name: String,
}

struct HelloHandler {
    remaining_failures: AtomicU32,
}

impl HelloHandler {
    fn new(n: u32) -> Self {
        Self {
            remaining_failures: AtomicU32::new(n),
        }
    }
}

#[async_trait]
impl Handler<HelloTask> for HelloHandler {
    type Params = HelloParams;

    fn new_task(&self, _ctx: &JobContext, params: HelloParams) -> Result<HelloTask, JobError> {
        if params.name.trim().is_empty() {
            return Err(JobError::InvalidParams("name must not be empty".into()));
        }
        Ok(HelloTask { name: params.name })
    }

    async fn handle(&self, ctx: &JobContext, task: HelloTask) -> Result<(), JobError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |left| left.checked_sub(1));
        if let Ok(left) = failing {
            return Err(JobError::failed(format!("intentional failure (left={left})")));
        }

        let retried = ctx.task().map(|meta| meta.retried).unwrap_or_default();
        println!("Hello, {}! (retried={retried})", task.name);
        Ok(())
    }
}

fn hello_job(fail_first: u32) -> Arc<dyn Job> {
    Arc::new(TypedJob::<HelloTask, _>::new(HelloHandler::new(fail_first)))
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<FileWorkerConfig> {
    match path {
        Some(path) => FileWorkerConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display())),
        None => Ok(FileWorkerConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Command::Run { fail_first } => {
            let driver = Arc::new(FileDriver::init(config).await?);
            let stopper = Arc::clone(&driver);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("stop requested, finishing the current cycle");
                    if let Err(err) = stopper.close().await {
                        warn!(%err, "close failed");
                    }
                }
            });
            driver.run(vec![hello_job(fail_first)]).await?;
        }
        Command::Once => {
            let driver = FileDriver::builder(config)
                .register(hello_job(0))?
                .build()
                .await?;
            let report = driver.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Enqueue { name, queue } => {
            let driver = FileDriver::init(config).await?;
            let job = hello_job(0);
            let id = driver
                .enqueue_on(job.as_ref(), serde_json::json!({ "name": name }), QueueName::new(queue))
                .await?;
            println!("{id}");
        }
        Command::List => {
            let driver = FileDriver::init(config).await?;
            for record in driver.pending().await? {
                println!(
                    "{}  queue={} type={} retried={}",
                    record.storage_key(),
                    record.queue(),
                    record.type_name(),
                    record.retried()
                );
            }
        }
    }
    Ok(())
}
