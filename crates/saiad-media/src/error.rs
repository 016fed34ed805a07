//! Error types for media operations.

use std::path::PathBuf;

use saiad_models::{ErrorCode, StoryboardError};
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    /// FFmpeg ran and exited non-zero: the inputs are the problem.
    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    /// The renderer died (signal, no exit code, failed to spawn).
    #[error("Renderer crashed: {message}")]
    RendererCrashed {
        message: String,
        stderr: Option<String>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Incomplete storyboard: {0}")]
    IncompleteStoryboard(#[from] StoryboardError),

    #[error("Rendered duration {actual:.3}s differs from expected {expected:.3}s")]
    DurationDrift { expected: f64, actual: f64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid video file: {0}")]
    InvalidVideo(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    pub fn renderer_crashed(message: impl Into<String>, stderr: Option<String>) -> Self {
        Self::RendererCrashed {
            message: message.into(),
            stderr,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Only a crash earns another attempt.
    pub fn is_crash(&self) -> bool {
        matches!(self, MediaError::RendererCrashed { .. })
    }

    /// Stable code a failed job carries.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            MediaError::IncompleteStoryboard(_) => ErrorCode::IncompleteStoryboard,
            MediaError::FfmpegFailed { .. }
            | MediaError::InvalidVideo(_)
            | MediaError::FileNotFound(_)
            | MediaError::FfprobeFailed { .. } => ErrorCode::InvalidInput,
            MediaError::RendererCrashed { .. } => ErrorCode::RendererFailed,
            MediaError::Timeout(_) => ErrorCode::Timeout,
            MediaError::FfmpegNotFound
            | MediaError::FfprobeNotFound
            | MediaError::DurationDrift { .. }
            | MediaError::Io(_)
            | MediaError::JsonParse(_)
            | MediaError::Internal(_) => ErrorCode::Internal,
        }
    }
}
