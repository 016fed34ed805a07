//! Adapter error taxonomy.

use reqwest::StatusCode;
use saiad_models::ErrorCode;
use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

/// Normalized vendor failure. Every vendor client maps its own
/// status codes and payloads onto the first five cases; `Config` is
/// raised while building the registry, never by a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdapterError {
    #[error("Rate limited by {vendor}: {message}")]
    RateLimited { vendor: String, message: String },

    #[error("Invalid input for {vendor}: {message}")]
    InvalidInput { vendor: String, message: String },

    #[error("{vendor} unavailable: {message}")]
    UpstreamUnavailable { vendor: String, message: String },

    #[error("{vendor} timed out: {message}")]
    Timeout { vendor: String, message: String },

    #[error("{vendor} rejected the request: {message}")]
    UpstreamRejected { vendor: String, message: String },

    #[error("Adapter configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    pub fn rate_limited(vendor: &str, message: impl Into<String>) -> Self {
        Self::RateLimited {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_input(vendor: &str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }

    pub fn unavailable(vendor: &str, message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }

    pub fn timeout(vendor: &str, secs: u64) -> Self {
        Self::Timeout {
            vendor: vendor.to_string(),
            message: format!("no response within {}s", secs),
        }
    }

    pub fn rejected(vendor: &str, message: impl Into<String>) -> Self {
        Self::UpstreamRejected {
            vendor: vendor.to_string(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Map a non-success HTTP status to the taxonomy.
    pub fn from_status(vendor: &str, status: StatusCode, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status.as_u16(), truncate(body, 300));
        match status.as_u16() {
            429 => Self::rate_limited(vendor, message),
            400 | 413 | 415 | 422 => Self::invalid_input(vendor, message),
            401 | 402 | 403 | 451 => Self::rejected(vendor, message),
            408 => Self::Timeout {
                vendor: vendor.to_string(),
                message,
            },
            _ if status.is_server_error() => Self::unavailable(vendor, message),
            _ => Self::rejected(vendor, message),
        }
    }

    /// Map a transport error.
    pub fn from_reqwest(vendor: &str, error: &reqwest::Error, timeout_secs: u64) -> Self {
        if error.is_timeout() {
            Self::timeout(vendor, timeout_secs)
        } else if let Some(status) = error.status() {
            Self::from_status(vendor, status, &error.to_string())
        } else if error.is_decode() {
            Self::unavailable(vendor, format!("Malformed response: {}", error))
        } else {
            Self::unavailable(vendor, error.to_string())
        }
    }

    /// Transient errors are retried with backoff; the rest are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdapterError::RateLimited { .. }
                | AdapterError::UpstreamUnavailable { .. }
                | AdapterError::Timeout { .. }
        )
    }

    pub fn vendor(&self) -> &str {
        match self {
            AdapterError::RateLimited { vendor, .. }
            | AdapterError::InvalidInput { vendor, .. }
            | AdapterError::UpstreamUnavailable { vendor, .. }
            | AdapterError::Timeout { vendor, .. }
            | AdapterError::UpstreamRejected { vendor, .. } => vendor,
            AdapterError::Config(_) => "registry",
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            AdapterError::RateLimited { .. } => ErrorCode::RateLimited,
            AdapterError::InvalidInput { .. } => ErrorCode::InvalidInput,
            AdapterError::UpstreamUnavailable { .. } => ErrorCode::UpstreamUnavailable,
            AdapterError::Timeout { .. } => ErrorCode::Timeout,
            AdapterError::UpstreamRejected { .. } => ErrorCode::UpstreamRejected,
            AdapterError::Config(_) => ErrorCode::Internal,
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let e = AdapterError::from_status("v", StatusCode::TOO_MANY_REQUESTS, "");
        assert_eq!(e.error_code(), ErrorCode::RateLimited);
        assert!(e.is_retryable());

        let e = AdapterError::from_status("v", StatusCode::UNPROCESSABLE_ENTITY, "bad");
        assert_eq!(e.error_code(), ErrorCode::InvalidInput);
        assert!(!e.is_retryable());

        let e = AdapterError::from_status("v", StatusCode::FORBIDDEN, "");
        assert_eq!(e.error_code(), ErrorCode::UpstreamRejected);

        let e = AdapterError::from_status("v", StatusCode::BAD_GATEWAY, "");
        assert_eq!(e.error_code(), ErrorCode::UpstreamUnavailable);
        assert!(e.is_retryable());
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("한국어", 2), "한국");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
