//! Queue and job-store error types.

use saiad_models::{ErrorCode, JobId, RequestValidationError, TransitionError};
use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("Dequeue failed: {0}")]
    DequeueFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid state transition for job {job_id}: {source}")]
    InvalidTransition {
        job_id: JobId,
        #[source]
        source: TransitionError,
    },

    #[error("Concurrent update conflict on job {0}")]
    Conflict(JobId),

    #[error(transparent)]
    Validation(#[from] RequestValidationError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueueError {
    pub fn connection_failed(msg: impl Into<String>) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    pub fn enqueue_failed(msg: impl Into<String>) -> Self {
        Self::EnqueueFailed(msg.into())
    }

    pub fn dequeue_failed(msg: impl Into<String>) -> Self {
        Self::DequeueFailed(msg.into())
    }

    pub fn invalid_transition(job_id: &JobId, source: TransitionError) -> Self {
        Self::InvalidTransition {
            job_id: job_id.clone(),
            source,
        }
    }

    /// Mutations against a missing or terminal job, and lost CAS races,
    /// are all integrity failures from the caller's point of view.
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            Self::JobNotFound(_) | Self::InvalidTransition { .. } | Self::Conflict(_)
        )
    }

    /// A stage completion refused because the job was cancelled meanwhile.
    pub fn is_cancel_requested(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition {
                source: TransitionError::CancelRequested,
                ..
            }
        )
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::JobNotFound(_) | Self::InvalidTransition { .. } | Self::Conflict(_) => {
                ErrorCode::InvalidStateTransition
            }
            Self::Validation(_) => ErrorCode::ValidationError,
            _ => ErrorCode::Internal,
        }
    }
}
