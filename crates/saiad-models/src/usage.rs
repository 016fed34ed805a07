//! Billing usage signal emitted once per terminal job.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ErrorCode, GenerationJob, JobId, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UsageOutcome {
    Completed,
    Failed,
    Cancelled,
}

impl UsageOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageOutcome::Completed => "completed",
            UsageOutcome::Failed => "failed",
            UsageOutcome::Cancelled => "cancelled",
        }
    }
}

/// Credits consumed by one job, reported to the billing collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UsageEvent {
    pub job_id: JobId,
    pub project_id: String,
    pub credits_consumed: u32,
    pub outcome: UsageOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub occurred_at: DateTime<Utc>,
}

impl UsageEvent {
    /// Usage for a terminal job; `None` while the job is still running.
    pub fn for_job(job: &GenerationJob) -> Option<Self> {
        let (outcome, error_code) = match job.status {
            JobStatus::Completed => (UsageOutcome::Completed, None),
            JobStatus::Failed => {
                let code = job.failure.as_ref().map(|f| f.code);
                let outcome = if code == Some(ErrorCode::Cancelled) {
                    UsageOutcome::Cancelled
                } else {
                    UsageOutcome::Failed
                };
                (outcome, code)
            }
            JobStatus::Queued | JobStatus::Processing => return None,
        };

        Some(Self {
            job_id: job.id.clone(),
            project_id: job.project_id.clone(),
            credits_consumed: job.credits_consumed(),
            outcome,
            error_code,
            occurred_at: job.finished_at.unwrap_or(job.updated_at),
        })
    }
}
