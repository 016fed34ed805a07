//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use saiad_models::ErrorCode;
use saiad_queue::QueueError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] saiad_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Queue(QueueError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Queue(QueueError::JobNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Queue(QueueError::InvalidTransition { .. } | QueueError::Conflict(_)) => {
                StatusCode::CONFLICT
            }
            ApiError::Internal(_) | ApiError::Storage(_) | ApiError::Queue(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation(_) => ErrorCode::ValidationError,
            ApiError::Conflict(_) => ErrorCode::InvalidStateTransition,
            ApiError::RateLimited => ErrorCode::RateLimited,
            ApiError::Storage(e) => e.error_code(),
            ApiError::Queue(e) => e.error_code(),
            ApiError::NotFound(_) | ApiError::Internal(_) => ErrorCode::Internal,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    code: ErrorCode,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = if self.is_internal() {
            error!(error = %self, "Request failed");
            if std::env::var("ENVIRONMENT").unwrap_or_default() == "production" {
                "An internal error occurred".to_string()
            } else {
                self.to_string()
            }
        } else {
            match &self {
                ApiError::Queue(e) => e.to_string(),
                other => other.to_string(),
            }
        };

        let body = ErrorResponse {
            detail,
            code: self.error_code(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saiad_models::{JobId, JobStatus, TransitionError};

    #[test]
    fn test_queue_errors_map_to_http_status() {
        let id = JobId::from_string("j1");
        assert_eq!(
            ApiError::from(QueueError::JobNotFound(id.clone())).status_code(),
            StatusCode::NOT_FOUND
        );
        let terminal = QueueError::invalid_transition(&id, TransitionError::Terminal(JobStatus::Completed));
        let err = ApiError::from(terminal);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.error_code(), ErrorCode::InvalidStateTransition);
        assert_eq!(
            ApiError::from(QueueError::connection_failed("down")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
