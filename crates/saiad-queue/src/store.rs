//! Job State Store: the single source of truth for job records.
//!
//! All mutation goes through [`JobStore::mutate`], which applies one of the
//! transition methods on [`GenerationJob`] atomically against the stored
//! record. A mutation that the job's rules reject leaves the record as it
//! was.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use saiad_models::{GenerationJob, JobId, JobOutcome, StageUpdate, TransitionError};
use tokio::sync::RwLock;

use crate::error::{QueueError, QueueResult};

/// A transition applied to a job record; may run more than once under contention.
pub type JobMutation<'a> =
    &'a (dyn Fn(&mut GenerationJob) -> Result<(), TransitionError> + Send + Sync);

/// Result of [`JobStore::create`].
#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created(GenerationJob),
    /// A job with the same idempotency key already exists
    Existing(GenerationJob),
}

impl CreateOutcome {
    pub fn job(&self) -> &GenerationJob {
        match self {
            CreateOutcome::Created(job) | CreateOutcome::Existing(job) => job,
        }
    }

    pub fn into_job(self) -> GenerationJob {
        match self {
            CreateOutcome::Created(job) | CreateOutcome::Existing(job) => job,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, CreateOutcome::Created(_))
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    fn backend(&self) -> &'static str;

    /// Insert a new job unless its idempotency key is already taken.
    async fn create(&self, job: GenerationJob) -> QueueResult<CreateOutcome>;

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>>;

    /// Apply `mutation` atomically and return the stored result.
    async fn mutate(&self, job_id: &JobId, mutation: JobMutation<'_>)
        -> QueueResult<GenerationJob>;

    /// All jobs not yet completed or failed.
    async fn active_jobs(&self) -> QueueResult<Vec<GenerationJob>>;

    /// Delete terminal jobs that finished before `cutoff`. Returns how many.
    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> QueueResult<usize>;

    async fn check_connectivity(&self) -> QueueResult<()>;

    async fn require(&self, job_id: &JobId) -> QueueResult<GenerationJob> {
        self.get(job_id)
            .await?
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))
    }

    async fn update_stage(
        &self,
        job_id: &JobId,
        update: StageUpdate,
    ) -> QueueResult<GenerationJob> {
        self.mutate(job_id, &|job| job.apply_stage_update(update.clone()))
            .await
    }

    async fn finalize(&self, job_id: &JobId, outcome: JobOutcome) -> QueueResult<GenerationJob> {
        self.mutate(job_id, &|job| job.finalize(outcome.clone())).await
    }
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<JobId, GenerationJob>,
    idempotency: HashMap<String, JobId>,
}

/// Process-local store for single-binary runs and tests.
#[derive(Default)]
pub struct InMemoryJobStore {
    inner: RwLock<Inner>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, job: GenerationJob) -> QueueResult<CreateOutcome> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .idempotency
            .get(&job.idempotency_key)
            .and_then(|id| inner.jobs.get(id))
        {
            return Ok(CreateOutcome::Existing(existing.clone()));
        }
        inner
            .idempotency
            .insert(job.idempotency_key.clone(), job.id.clone());
        inner.jobs.insert(job.id.clone(), job.clone());
        Ok(CreateOutcome::Created(job))
    }

    async fn get(&self, job_id: &JobId) -> QueueResult<Option<GenerationJob>> {
        Ok(self.inner.read().await.jobs.get(job_id).cloned())
    }

    async fn mutate(
        &self,
        job_id: &JobId,
        mutation: JobMutation<'_>,
    ) -> QueueResult<GenerationJob> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| QueueError::JobNotFound(job_id.clone()))?;

        let mut next = stored.clone();
        mutation(&mut next).map_err(|e| QueueError::invalid_transition(job_id, e))?;
        *stored = next.clone();
        Ok(next)
    }

    async fn active_jobs(&self) -> QueueResult<Vec<GenerationJob>> {
        let inner = self.inner.read().await;
        Ok(inner
            .jobs
            .values()
            .filter(|job| !job.is_terminal())
            .cloned()
            .collect())
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> QueueResult<usize> {
        let mut inner = self.inner.write().await;
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|job| job.is_terminal() && job.finished_at.unwrap_or(job.updated_at) < cutoff)
            .map(|job| job.id.clone())
            .collect();

        for id in &expired {
            inner.jobs.remove(id);
        }
        inner.idempotency.retain(|_, id| !expired.contains(id));
        Ok(expired.len())
    }

    async fn check_connectivity(&self) -> QueueResult<()> {
        Ok(())
    }
}
