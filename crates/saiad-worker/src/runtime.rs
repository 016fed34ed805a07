//! Starting and stopping the executor and sweeper together.
//!
//! Used by the worker binary, and by the API when it runs the pipeline
//! in-process.

use std::sync::Arc;

use saiad_queue::Backends;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::WorkerConfig;
use crate::context::PipelineContext;
use crate::error::WorkerResult;
use crate::executor::JobExecutor;
use crate::orchestrator::Orchestrator;
use crate::sweeper::JobSweeper;

pub struct WorkerHandle {
    executor: Arc<JobExecutor>,
    sweeper_shutdown: watch::Sender<bool>,
    executor_task: JoinHandle<()>,
    sweeper_task: JoinHandle<()>,
}

/// Build the pipeline from the environment and start consuming jobs.
pub async fn start(backends: &Backends, config: WorkerConfig) -> WorkerResult<WorkerHandle> {
    tokio::fs::create_dir_all(&config.work_dir).await?;
    let ctx = PipelineContext::from_env(backends.tracker.clone(), &config).await?;
    Ok(start_with(backends, config, Orchestrator::new(ctx)))
}

pub fn start_with(backends: &Backends, config: WorkerConfig, orchestrator: Orchestrator) -> WorkerHandle {
    let sweeper = JobSweeper::new(
        backends.tracker.clone(),
        config.stale_threshold,
        config.retention,
        config.sweep_interval,
    );
    let (sweeper_shutdown, sweeper_rx) = watch::channel(false);
    let sweeper_task = tokio::spawn(sweeper.run(sweeper_rx));

    let executor = Arc::new(JobExecutor::new(config, backends.source.clone(), orchestrator));
    let executor_task = {
        let executor = Arc::clone(&executor);
        tokio::spawn(async move {
            if let Err(e) = executor.run().await {
                error!(error = %e, "Executor stopped with error");
            }
        })
    };
    info!(consumer = executor.consumer_name(), "Worker started");

    WorkerHandle {
        executor,
        sweeper_shutdown,
        executor_task,
        sweeper_task,
    }
}

impl WorkerHandle {
    /// Stop taking jobs, wait for in-flight ones (bounded), stop the sweeper.
    pub async fn shutdown(self) {
        self.executor.shutdown();
        let _ = self.sweeper_shutdown.send(true);
        if let Err(e) = self.executor_task.await {
            error!(error = %e, "Executor task panicked");
        }
        let _ = self.sweeper_task.await;
        info!("Worker stopped");
    }
}
