//! Job executor.
//!
//! Pulls deliveries off the queue, runs each through the orchestrator
//! under a concurrency limit, and acks or fails the delivery. A job the
//! pipeline finalized as failed is still acked: the failure lives on the
//! job record. Only infrastructure errors (store unreachable and the like)
//! fail the delivery so another worker can pick it up.

use std::sync::Arc;
use std::time::Duration;

use saiad_queue::{Delivery, JobSource};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::orchestrator::Orchestrator;
use crate::retry::FailureTracker;

const RECEIVE_BLOCK: Duration = Duration::from_secs(1);
const MAX_BATCH: usize = 5;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    source: Arc<dyn JobSource>,
    orchestrator: Arc<Orchestrator>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, source: Arc<dyn JobSource>, orchestrator: Orchestrator) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            source,
            orchestrator: Arc::new(orchestrator),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer_name
    }

    /// Consume until [`shutdown`](Self::shutdown) is called, then drain.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        let claim_task = self.spawn_claim_task();
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    match result {
                        Ok(()) => failures.record_success(),
                        Err(e) => {
                            if failures.record_failure() {
                                error!(error = %e, "Error consuming jobs");
                            }
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.shutdown_timeout.as_secs(),
                "In-flight jobs still running at shutdown; the sweeper will fail them"
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Periodically take over deliveries whose consumer died.
    fn spawn_claim_task(&self) -> tokio::task::JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let orchestrator = Arc::clone(&self.orchestrator);
        let semaphore = Arc::clone(&self.job_semaphore);
        let consumer = self.consumer_name.clone();
        let period = self.config.claim_interval;
        let mut shutdown_rx = self.shutdown.subscribe();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let deliveries = match source.claim_stale(&consumer, MAX_BATCH).await {
                            Ok(deliveries) => deliveries,
                            Err(e) => {
                                warn!(error = %e, "Failed to claim stale jobs");
                                continue;
                            }
                        };
                        if !deliveries.is_empty() {
                            info!(count = deliveries.len(), "Claimed stale jobs");
                        }
                        for delivery in deliveries {
                            let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                                return;
                            };
                            let source = Arc::clone(&source);
                            let orchestrator = Arc::clone(&orchestrator);
                            tokio::spawn(async move {
                                let _permit = permit;
                                Self::execute_job(orchestrator, source, delivery).await;
                            });
                        }
                    }
                }
            }
        })
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .source
            .receive(&self.consumer_name, available.min(MAX_BATCH), RECEIVE_BLOCK)
            .await?;
        if deliveries.is_empty() {
            return Ok(());
        }
        debug!(count = deliveries.len(), "Received jobs from queue");

        for delivery in deliveries {
            let permit = Arc::clone(&self.job_semaphore)
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::config_error("Job semaphore closed"))?;
            let source = Arc::clone(&self.source);
            let orchestrator = Arc::clone(&self.orchestrator);
            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(orchestrator, source, delivery).await;
            });
        }
        Ok(())
    }

    async fn execute_job(orchestrator: Arc<Orchestrator>, source: Arc<dyn JobSource>, delivery: Delivery) {
        let job_id = delivery.job.job_id.clone();
        info!(job_id = %job_id, message_id = %delivery.message_id, "Executing job");

        match orchestrator.run(&job_id).await {
            Ok(()) => {
                if let Err(e) = source.ack(&delivery).await {
                    error!(job_id = %job_id, error = %e, "Failed to ack job");
                }
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Job run aborted");
                if let Err(fail_err) = source.fail(&delivery, &e.to_string()).await {
                    error!(job_id = %job_id, error = %fail_err, "Failed to record job failure");
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        let capacity = self.config.max_concurrent_jobs.max(1);
        while self.job_semaphore.available_permits() < capacity {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
