//! Worker error types.

use saiad_models::{ErrorCode, JobFailure, StageName};
use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Adapter(#[from] saiad_adapters::AdapterError),

    #[error("Media error: {0}")]
    Media(#[from] saiad_media::MediaError),

    #[error("Storage error: {0}")]
    Storage(#[from] saiad_storage::StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] saiad_queue::QueueError),

    #[error("Stage {stage} exceeded its {secs}s budget")]
    StageTimeout { stage: StageName, secs: u64 },

    #[error("Job exceeded its {0}s lifetime")]
    JobTimeout(u64),

    #[error("Job was cancelled")]
    Cancelled,

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Missing asset: {0}")]
    MissingAsset(String),

    #[error("Asset rejected: {0}")]
    AssetRejected(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn missing_asset(msg: impl Into<String>) -> Self {
        Self::MissingAsset(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn asset_rejected(msg: impl Into<String>) -> Self {
        Self::AssetRejected(msg.into())
    }

    /// Transient failure of a single adapter call or asset transfer.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Adapter(e) => e.is_retryable(),
            WorkerError::Storage(e) => e.is_retryable(),
            WorkerError::DownloadFailed(_) => true,
            _ => false,
        }
    }

    /// A stage attempt ran out of time; the whole stage may run again.
    pub fn is_stage_retryable(&self) -> bool {
        matches!(self, WorkerError::StageTimeout { .. })
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            WorkerError::Adapter(e) => e.error_code(),
            WorkerError::Media(e) => e.error_code(),
            WorkerError::Storage(e) => e.error_code(),
            WorkerError::Queue(e) => e.error_code(),
            WorkerError::StageTimeout { .. } | WorkerError::JobTimeout(_) => ErrorCode::Timeout,
            WorkerError::Cancelled => ErrorCode::Cancelled,
            WorkerError::DownloadFailed(_) => ErrorCode::UpstreamUnavailable,
            WorkerError::AssetRejected(_) => ErrorCode::InvalidInput,
            WorkerError::MissingAsset(_)
            | WorkerError::ConfigError(_)
            | WorkerError::Io(_)
            | WorkerError::Json(_) => ErrorCode::Internal,
        }
    }

    /// Failure record for the job, attributed to `stage`.
    pub fn to_failure(&self, stage: Option<StageName>) -> JobFailure {
        if matches!(self, WorkerError::Cancelled) {
            return JobFailure::cancelled();
        }
        let failure = JobFailure::new(self.error_code(), self.to_string());
        match stage {
            Some(stage) => failure.at_stage(stage),
            None => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saiad_adapters::AdapterError;
    use saiad_media::MediaError;

    #[test]
    fn test_adapter_errors_keep_their_code() {
        let err = WorkerError::from(AdapterError::rate_limited("runway", "slow down"));
        assert!(err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::RateLimited);

        let err = WorkerError::from(AdapterError::invalid_input("imagen", "bad prompt"));
        assert!(!err.is_retryable());
        assert_eq!(err.error_code(), ErrorCode::InvalidInput);
    }

    #[test]
    fn test_stage_timeout_retries_stage_only() {
        let err = WorkerError::StageTimeout {
            stage: StageName::VideoGeneration,
            secs: 900,
        };
        assert!(err.is_stage_retryable());
        assert!(!err.is_retryable());
        let failure = err.to_failure(Some(StageName::VideoGeneration));
        assert_eq!(failure.code, ErrorCode::Timeout);
        assert_eq!(failure.stage, Some(StageName::VideoGeneration));
    }

    #[test]
    fn test_renderer_crash_maps_to_renderer_failed() {
        let err = WorkerError::from(MediaError::renderer_crashed("signal 9", None));
        assert_eq!(err.error_code(), ErrorCode::RendererFailed);
    }

    #[test]
    fn test_cancelled_failure() {
        let failure = WorkerError::Cancelled.to_failure(Some(StageName::ImageProcessing));
        assert_eq!(failure.code, ErrorCode::Cancelled);
    }
}
