//! Messages carried by the job queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use saiad_models::JobId;

/// Ask a worker to run the pipeline for a job that is already persisted.
///
/// Only the id travels; the worker reads everything else from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateVideoJob {
    pub job_id: JobId,
    pub enqueued_at: DateTime<Utc>,
}

impl GenerateVideoJob {
    pub fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            enqueued_at: Utc::now(),
        }
    }

    /// Generate idempotency key for deduplication.
    pub fn idempotency_key(&self) -> String {
        format!("generate:{}", self.job_id)
    }
}

/// A message handed to a worker, with the id needed to ack it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: String,
    pub job: GenerateVideoJob,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_roundtrips_as_json() {
        let job = GenerateVideoJob::new(JobId::from_string("abc"));
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"job_id\":\"abc\""));
        let back: GenerateVideoJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
        assert_eq!(job.idempotency_key(), "generate:abc");
    }
}
