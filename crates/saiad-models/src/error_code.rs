//! Stable error codes attached to failed jobs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::StageName;

/// Error code surfaced to clients for programmatic handling.
///
/// Serialized as the variant name (e.g. `"RateLimited"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    /// Bad submit input, rejected before a job exists
    ValidationError,
    /// Vendor throttled the request
    RateLimited,
    /// Vendor call, stage or job exceeded its time budget
    Timeout,
    /// Vendor unreachable or returned a server error
    UpstreamUnavailable,
    /// Vendor refused the request (policy, auth)
    UpstreamRejected,
    /// Vendor reported the request itself as malformed
    InvalidInput,
    /// Storyboard not ready for compositing
    IncompleteStoryboard,
    /// Cancelled by the user
    Cancelled,
    /// State store integrity violation
    InvalidStateTransition,
    /// Renderer crashed again after its retry
    RendererFailed,
    /// Storage or other internal failure
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::RateLimited => "RateLimited",
            ErrorCode::Timeout => "Timeout",
            ErrorCode::UpstreamUnavailable => "UpstreamUnavailable",
            ErrorCode::UpstreamRejected => "UpstreamRejected",
            ErrorCode::InvalidInput => "InvalidInput",
            ErrorCode::IncompleteStoryboard => "IncompleteStoryboard",
            ErrorCode::Cancelled => "Cancelled",
            ErrorCode::InvalidStateTransition => "InvalidStateTransition",
            ErrorCode::RendererFailed => "RendererFailed",
            ErrorCode::Internal => "Internal",
        }
    }

    /// Transient codes are retried by the orchestrator.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::RateLimited | ErrorCode::Timeout | ErrorCode::UpstreamUnavailable
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail recorded on a job or stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobFailure {
    pub code: ErrorCode,
    pub message: String,
    /// Stage that produced the failure, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
}

impl JobFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            stage: None,
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Job was cancelled")
    }

    pub fn at_stage(mut self, stage: StageName) -> Self {
        self.stage = Some(stage);
        self
    }
}

impl fmt::Display for JobFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} during {}: {}", self.code, stage, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_serializes_as_name() {
        let json = serde_json::to_string(&ErrorCode::IncompleteStoryboard).unwrap();
        assert_eq!(json, "\"IncompleteStoryboard\"");
        assert_eq!(ErrorCode::RateLimited.as_str(), "RateLimited");
    }

    #[test]
    fn test_transient_codes() {
        assert!(ErrorCode::RateLimited.is_transient());
        assert!(ErrorCode::Timeout.is_transient());
        assert!(!ErrorCode::UpstreamRejected.is_transient());
        assert!(!ErrorCode::Cancelled.is_transient());
    }

    #[test]
    fn test_failure_display() {
        let failure = JobFailure::new(ErrorCode::InvalidInput, "bad prompt")
            .at_stage(StageName::ImageProcessing);
        assert_eq!(failure.to_string(), "InvalidInput during image_processing: bad prompt");
    }
}
