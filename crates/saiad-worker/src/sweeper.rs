//! Background maintenance of the job store.
//!
//! Fails jobs that stopped making progress (their worker died mid-stage)
//! and purges terminal jobs past the retention window.

use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use saiad_models::{ErrorCode, JobFailure, JobOutcome};
use saiad_queue::JobTracker;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::WorkerResult;
use crate::retry::FailureTracker;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub stalled: usize,
    pub purged: usize,
}

pub struct JobSweeper {
    tracker: JobTracker,
    stale_threshold: Duration,
    retention: Duration,
    interval: Duration,
}

impl JobSweeper {
    pub fn new(tracker: JobTracker, stale_threshold: Duration, retention: Duration, interval: Duration) -> Self {
        Self {
            tracker,
            stale_threshold,
            retention,
            interval,
        }
    }

    /// Sweep every `interval` until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        let mut failures = FailureTracker::new(3);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.sweep_once(Utc::now()).await {
                        Ok(report) => {
                            failures.record_success();
                            if report != SweepReport::default() {
                                info!(stalled = report.stalled, purged = report.purged, "Sweep finished");
                            }
                        }
                        Err(e) => {
                            if failures.record_failure() {
                                warn!(error = %e, "Sweep failed");
                            }
                        }
                    }
                }
            }
        }
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> WorkerResult<SweepReport> {
        let threshold = chrono::Duration::from_std(self.stale_threshold)
            .unwrap_or_else(|_| chrono::Duration::minutes(30));
        let mut report = SweepReport::default();

        for job in self.tracker.store().active_jobs().await? {
            if !job.is_stale(now, threshold) {
                continue;
            }
            let failure = JobFailure::new(ErrorCode::Timeout, "Job timed out (stalled)");
            let failure = match job.current_stage {
                Some(stage) => failure.at_stage(stage),
                None => failure,
            };
            match self.tracker.finalize(&job.id, JobOutcome::Failed(failure)).await {
                Ok(_) => {
                    warn!(job_id = %job.id, last_update = %job.updated_at, "Failed stalled job");
                    counter!("saiad_jobs_stalled_total").increment(1);
                    report.stalled += 1;
                }
                // Raced with the worker finishing it.
                Err(e) if e.is_state_error() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let retention = chrono::Duration::from_std(self.retention)
            .unwrap_or_else(|_| chrono::Duration::days(7));
        report.purged = self
            .tracker
            .store()
            .purge_finished_before(now - retention)
            .await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use saiad_models::{
        AspectRatio, GenerationConfig, GenerationJob, JobStatus, ProductRef, Scene, Storyboard,
    };
    use saiad_queue::{BroadcastNotifier, InMemoryJobStore, InMemoryUsageSink, JobStore};

    fn job() -> GenerationJob {
        GenerationJob::new(
            "proj",
            uuid::Uuid::new_v4().to_string(),
            GenerationConfig::new(ProductRef::new("tv-neo"), 10.0, AspectRatio::LANDSCAPE),
            Storyboard::new(vec![Scene::new(1, 10.0)]),
        )
    }

    fn sweeper(store: Arc<InMemoryJobStore>, usage: Arc<InMemoryUsageSink>) -> JobSweeper {
        let tracker = JobTracker::new(store, Arc::new(BroadcastNotifier::default()), usage);
        JobSweeper::new(
            tracker,
            Duration::from_secs(60),
            Duration::from_secs(7 * 24 * 3600),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_stalled_job_fails_with_timeout() {
        let store = Arc::new(InMemoryJobStore::new());
        let usage = Arc::new(InMemoryUsageSink::new());
        let mut stalled = job();
        stalled.start().unwrap();
        stalled.updated_at = Utc::now() - chrono::Duration::minutes(5);
        let stalled_id = stalled.id.clone();
        store.create(stalled).await.unwrap();

        let mut fresh = job();
        fresh.start().unwrap();
        let fresh_id = fresh.id.clone();
        store.create(fresh).await.unwrap();

        let report = sweeper(store.clone(), usage.clone())
            .sweep_once(Utc::now())
            .await
            .unwrap();
        assert_eq!(report.stalled, 1);

        let failed = store.get(&stalled_id).await.unwrap().unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.failure.unwrap().code, ErrorCode::Timeout);
        assert_eq!(
            store.get(&fresh_id).await.unwrap().unwrap().status,
            JobStatus::Processing
        );
        assert_eq!(usage.events().await.len(), 1);
    }

    #[tokio::test]
    async fn test_finished_jobs_purged_after_retention() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut old = job();
        old.finalize(JobOutcome::Failed(JobFailure::cancelled())).unwrap();
        old.finished_at = Some(Utc::now() - chrono::Duration::days(8));
        let old_id = old.id.clone();
        store.create(old).await.unwrap();

        let mut recent = job();
        recent.finalize(JobOutcome::Failed(JobFailure::cancelled())).unwrap();
        let recent_id = recent.id.clone();
        store.create(recent).await.unwrap();

        let report = sweeper(store.clone(), Arc::new(InMemoryUsageSink::new()))
            .sweep_once(Utc::now())
            .await
            .unwrap();
        assert_eq!(report.purged, 1);
        assert!(store.get(&old_id).await.unwrap().is_none());
        assert!(store.get(&recent_id).await.unwrap().is_some());
    }
}
