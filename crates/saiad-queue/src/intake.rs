//! Submit: validate, persist, dispatch.

use std::sync::Arc;

use metrics::counter;
use saiad_models::{ErrorCode, GenerateVideoRequest, GenerationJob, JobFailure, JobOutcome};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::QueueResult;
use crate::job::GenerateVideoJob;
use crate::queue::JobDispatcher;
use crate::store::CreateOutcome;
use crate::tracker::JobTracker;

/// What `submit` did with the request.
#[derive(Debug, Clone)]
pub struct Submission {
    pub job: GenerationJob,
    /// False when the idempotency key matched an existing job
    pub created: bool,
}

#[derive(Clone)]
pub struct JobIntake {
    tracker: JobTracker,
    dispatcher: Arc<dyn JobDispatcher>,
}

impl JobIntake {
    pub fn new(tracker: JobTracker, dispatcher: Arc<dyn JobDispatcher>) -> Self {
        Self {
            tracker,
            dispatcher,
        }
    }

    /// Accept a generation request without waiting for it to run.
    ///
    /// The idempotency key is `header_key`, else the body's key, else a
    /// fresh one. Repeating a key returns the original job and dispatches
    /// nothing.
    pub async fn submit(
        &self,
        mut request: GenerateVideoRequest,
        header_key: Option<String>,
    ) -> QueueResult<Submission> {
        request.check()?;
        request.storyboard.sort();

        let key = header_key
            .or_else(|| request.idempotency_key.take())
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let job = GenerationJob::new(request.project_id, key, request.config, request.storyboard);

        let job = match self.tracker.store().create(job).await? {
            CreateOutcome::Existing(existing) => {
                info!(job_id = %existing.id, "Duplicate submit, returning existing job");
                counter!("saiad_jobs_submitted_total", "result" => "duplicate").increment(1);
                return Ok(Submission {
                    job: existing,
                    created: false,
                });
            }
            CreateOutcome::Created(job) => job,
        };

        self.tracker.announce(&job).await;
        if let Err(e) = self.dispatcher.dispatch(&GenerateVideoJob::new(job.id.clone())).await {
            error!(job_id = %job.id, error = %e, "Failed to dispatch job");
            let failure = JobFailure::new(ErrorCode::Internal, "Failed to enqueue job");
            self.tracker
                .finalize(&job.id, JobOutcome::Failed(failure))
                .await?;
            return Err(e);
        }

        counter!("saiad_jobs_submitted_total", "result" => "created").increment(1);
        info!(
            job_id = %job.id,
            project_id = %job.project_id,
            scenes = job.storyboard.scenes.len(),
            duration = job.config.target_duration_secs,
            "Job submitted"
        );
        Ok(Submission { job, created: true })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::notifier::BroadcastNotifier;
    use crate::queue::{InMemoryJobQueue, JobSource};
    use crate::store::InMemoryJobStore;
    use crate::usage::InMemoryUsageSink;
    use async_trait::async_trait;
    use crate::store::JobStore;
    use saiad_models::{AspectRatio, GenerationConfig, JobStatus, ProductRef, Scene, Storyboard};
    use std::time::Duration;

    fn request(durations: &[f64]) -> GenerateVideoRequest {
        GenerateVideoRequest {
            project_id: "proj-1".into(),
            idempotency_key: None,
            config: GenerationConfig::new(
                ProductRef::new("galaxy-s25-ultra"),
                30.0,
                AspectRatio::LANDSCAPE,
            ),
            storyboard: Storyboard::new(
                durations
                    .iter()
                    .enumerate()
                    .map(|(i, d)| Scene::new(i as u32 + 1, *d))
                    .collect(),
            ),
        }
    }

    fn intake() -> (JobIntake, Arc<InMemoryJobQueue>, Arc<InMemoryUsageSink>) {
        let queue = Arc::new(InMemoryJobQueue::new());
        let usage = Arc::new(InMemoryUsageSink::new());
        let tracker = JobTracker::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(BroadcastNotifier::default()),
            usage.clone(),
        );
        (JobIntake::new(tracker, queue.clone()), queue, usage)
    }

    #[tokio::test]
    async fn test_same_key_same_job_single_dispatch() {
        let (intake, queue, _) = intake();
        let first = intake
            .submit(request(&[5.0, 10.0, 10.0, 5.0]), Some("idem-1".into()))
            .await
            .unwrap();
        let second = intake
            .submit(request(&[5.0, 10.0, 10.0, 5.0]), Some("idem-1".into()))
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.job.id, second.job.id);
        assert_eq!(first.job.status, JobStatus::Queued);

        let delivered = queue.receive("w", 10, Duration::from_millis(10)).await.unwrap();
        assert_eq!(delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_body_key_used_when_no_header() {
        let (intake, _, _) = intake();
        let mut req = request(&[30.0]);
        req.idempotency_key = Some("body-key".into());
        let submission = intake.submit(req, None).await.unwrap();
        assert_eq!(submission.job.idempotency_key, "body-key");
    }

    #[tokio::test]
    async fn test_duration_mismatch_rejected_before_create() {
        let (intake, queue, _) = intake();
        let err = intake
            .submit(request(&[5.0, 10.0, 10.0, 4.9]), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
        let delivered = queue.receive("w", 10, Duration::from_millis(10)).await.unwrap();
        assert!(delivered.is_empty());
    }

    struct BrokenDispatcher;

    #[async_trait]
    impl JobDispatcher for BrokenDispatcher {
        async fn dispatch(&self, _job: &GenerateVideoJob) -> QueueResult<String> {
            Err(QueueError::enqueue_failed("redis down"))
        }
    }

    #[tokio::test]
    async fn test_dispatch_failure_fails_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let tracker = JobTracker::new(
            store.clone(),
            Arc::new(BroadcastNotifier::default()),
            Arc::new(InMemoryUsageSink::new()),
        );
        let intake = JobIntake::new(tracker, Arc::new(BrokenDispatcher));
        let mut req = request(&[30.0]);
        req.idempotency_key = Some("k".into());

        assert!(intake.submit(req, None).await.is_err());
        assert!(store.active_jobs().await.unwrap().is_empty());
        let purged = store
            .purge_finished_before(chrono::Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
    }
}
