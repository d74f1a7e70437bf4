//! Error types for boostgate
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

use crate::llm::LlmError;

/// All error types that can occur while orchestrating a request
#[derive(Debug, Error)]
pub enum BoostError {
    /// Planning endpoint could not be used (unreachable, timeout, non-success)
    #[error("Boost model unavailable: {0}")]
    BoostUnavailable(String),

    /// Executor call failed at a stage with nothing beneath it
    #[error("Auxiliary model failed{}: {message}", status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    AuxiliaryFailure { status: Option<u16>, message: String },

    /// Caller went away before a result was produced
    #[error("Request cancelled")]
    Cancelled,

    /// Wrapper template is missing a required placeholder
    #[error("Invalid wrapper template: {0}")]
    InvalidTemplate(String),

    /// Configuration is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// Transport-level LLM error
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BoostError {
    /// Wrap an executor-side failure, keeping the upstream status when there is one
    pub fn auxiliary(err: LlmError) -> Self {
        match err {
            LlmError::ApiError { status, message } => BoostError::AuxiliaryFailure {
                status: Some(status),
                message,
            },
            other => BoostError::AuxiliaryFailure {
                status: other.status(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, BoostError::Cancelled)
    }
}

/// Result type alias for boostgate operations
pub type Result<T> = std::result::Result<T, BoostError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_unavailable_error() {
        let err = BoostError::BoostUnavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Boost model unavailable: connection refused");
    }

    #[test]
    fn test_auxiliary_failure_with_status() {
        let err = BoostError::AuxiliaryFailure {
            status: Some(502),
            message: "bad gateway".to_string(),
        };
        assert_eq!(err.to_string(), "Auxiliary model failed (502): bad gateway");
    }

    #[test]
    fn test_auxiliary_failure_without_status() {
        let err = BoostError::AuxiliaryFailure {
            status: None,
            message: "timed out".to_string(),
        };
        assert_eq!(err.to_string(), "Auxiliary model failed: timed out");
    }

    #[test]
    fn test_auxiliary_keeps_upstream_status() {
        let err = BoostError::auxiliary(LlmError::ApiError {
            status: 429,
            message: "slow down".to_string(),
        });
        match err {
            BoostError::AuxiliaryFailure { status, message } => {
                assert_eq!(status, Some(429));
                assert_eq!(message, "slow down");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_auxiliary_from_timeout() {
        let err = BoostError::auxiliary(LlmError::Timeout(std::time::Duration::from_secs(5)));
        assert!(matches!(err, BoostError::AuxiliaryFailure { status: None, .. }));
    }

    #[test]
    fn test_cancelled() {
        assert!(BoostError::Cancelled.is_cancelled());
        assert!(!BoostError::Config("x".to_string()).is_cancelled());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: BoostError = json_err.into();
        assert!(matches!(err, BoostError::Json(_)));
    }
}
