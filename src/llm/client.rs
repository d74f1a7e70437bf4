//! Client traits for the two endpoints the orchestrator talks to

use std::time::Duration;

use async_trait::async_trait;

use crate::llm::streaming::StreamHandle;
use crate::llm::types::{ChatRequest, ChatResponse};

/// Text-only planning endpoint. Implementations must never attach a tool schema.
#[async_trait]
pub trait PlanningClient: Send + Sync {
    /// Send the rendered wrapper prompt as a single user message and return the raw reply text
    async fn plan(&self, prompt: &str) -> Result<String, LlmError>;

    /// Model name used for planning (part of the cache fingerprint)
    fn model(&self) -> &str;
}

/// Tool-capable executor endpoint
#[async_trait]
pub trait ExecutorClient: Send + Sync {
    /// Batched completion
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, LlmError>;

    /// Streaming completion; fails before yielding a handle if the upstream rejects the request
    async fn stream(&self, request: ChatRequest) -> Result<StreamHandle, LlmError>;
}

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Missing API key for {endpoint}")]
    MissingApiKey { endpoint: String },

    #[error("Event source error: {0}")]
    EventSource(String),
}

impl LlmError {
    /// Upstream HTTP status, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::ApiError { status, .. } => Some(*status),
            LlmError::RateLimited { .. } => Some(429),
            LlmError::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            LlmError::Timeout(_) => true,
            LlmError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_of_api_error() {
        let err = LlmError::ApiError {
            status: 503,
            message: "overloaded".to_string(),
        };
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.to_string(), "API error 503: overloaded");
    }

    #[test]
    fn test_rate_limited_reports_429() {
        let err = LlmError::RateLimited {
            retry_after: Duration::from_secs(60),
        };
        assert_eq!(err.status(), Some(429));
    }

    #[test]
    fn test_timeout() {
        let err = LlmError::Timeout(Duration::from_millis(1500));
        assert!(err.is_timeout());
        assert_eq!(err.status(), None);
        assert!(!LlmError::InvalidResponse("x".to_string()).is_timeout());
    }
}
