//! Write-then-publish wrapper around the store, notifier and usage sink.
//!
//! Every job mutation in the system goes through a `JobTracker` so that a
//! live event follows each successful write, and the usage event is sent
//! by whoever wins the transition into a terminal status.

use std::sync::Arc;

use metrics::counter;
use saiad_models::{
    CancelOutcome, GenerationJob, JobEvent, JobId, JobOutcome, JobStatus, StageUpdate, UsageEvent,
};
use tracing::{error, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::notifier::{JobEventStream, ProgressNotifier};
use crate::store::{JobMutation, JobStore};
use crate::usage::UsageSink;

#[derive(Clone)]
pub struct JobTracker {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn ProgressNotifier>,
    usage: Arc<dyn UsageSink>,
}

impl JobTracker {
    pub fn new(
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn ProgressNotifier>,
        usage: Arc<dyn UsageSink>,
    ) -> Self {
        Self {
            store,
            notifier,
            usage,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Current snapshot, straight from the store.
    pub async fn get_status(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        self.store.get(job_id).await
    }

    pub async fn subscribe(&self, job_id: &JobId) -> QueueResult<JobEventStream> {
        self.notifier.subscribe(job_id).await
    }

    /// Publish the current state of a job. Used right after creation.
    pub async fn announce(&self, job: &GenerationJob) {
        self.publish(job).await;
    }

    async fn publish(&self, job: &GenerationJob) {
        if let Err(e) = self.notifier.publish(&JobEvent::from_job(job)).await {
            // The store already has the update; pollers still see it.
            warn!(job_id = %job.id, error = %e, "Failed to publish job event");
        }
    }

    async fn apply(
        &self,
        job_id: &JobId,
        operation: &'static str,
        mutation: JobMutation<'_>,
    ) -> QueueResult<GenerationJob> {
        match self.store.mutate(job_id, mutation).await {
            Ok(job) => {
                self.publish(&job).await;
                // Terminal records reject every mutation, so this write made it terminal.
                if job.is_terminal() {
                    self.report_terminal(&job).await;
                }
                Ok(job)
            }
            Err(e) => {
                if e.is_state_error() {
                    error!(job_id = %job_id, operation, error = %e, "Invalid job state transition");
                }
                Err(e)
            }
        }
    }

    /// Runs once per job: only the write that made the job terminal succeeds.
    async fn report_terminal(&self, job: &GenerationJob) {
        let outcome = match job.status {
            JobStatus::Completed => "completed",
            _ => "failed",
        };
        counter!("saiad_jobs_finished_total", "outcome" => outcome).increment(1);
        info!(
            job_id = %job.id,
            status = %job.status,
            credits = job.credits_consumed(),
            "Job reached terminal state"
        );

        if let Some(event) = UsageEvent::for_job(job) {
            if let Err(e) = self.usage.emit(&event).await {
                error!(job_id = %job.id, error = %e, "Failed to emit usage event");
            }
        }
    }

    pub async fn start(&self, job_id: &JobId) -> QueueResult<GenerationJob> {
        self.apply(job_id, "start", &|job| job.start()).await
    }

    pub async fn update_stage(
        &self,
        job_id: &JobId,
        update: StageUpdate,
    ) -> QueueResult<GenerationJob> {
        self.apply(job_id, "update_stage", &|job| {
            job.apply_stage_update(update.clone())
        })
        .await
    }

    pub async fn record_progress(
        &self,
        job_id: &JobId,
        progress: u8,
        message: &str,
    ) -> QueueResult<GenerationJob> {
        self.apply(job_id, "record_progress", &|job| {
            job.record_progress(progress, message)
        })
        .await
    }

    pub async fn finalize(
        &self,
        job_id: &JobId,
        outcome: JobOutcome,
    ) -> QueueResult<GenerationJob> {
        self.apply(job_id, "finalize", &|job| job.finalize(outcome.clone()))
            .await
    }

    /// Queued jobs fail immediately; running jobs are flagged for the
    /// orchestrator to observe at its next checkpoint.
    pub async fn request_cancel(
        &self,
        job_id: &JobId,
    ) -> QueueResult<(GenerationJob, CancelOutcome)> {
        let job = self
            .apply(job_id, "cancel", &|job| job.request_cancel().map(|_| ()))
            .await?;
        let outcome = if job.is_terminal() {
            CancelOutcome::Finalized
        } else {
            CancelOutcome::Flagged
        };
        info!(job_id = %job_id, ?outcome, "Cancellation requested");
        Ok((job, outcome))
    }

    pub async fn is_cancel_requested(&self, job_id: &JobId) -> QueueResult<bool> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;
        Ok(job.cancel_requested)
    }
}
