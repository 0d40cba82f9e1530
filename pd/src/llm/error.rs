//! Caption LLM errors

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// 429 from the provider
    #[error("Provider is rate limiting requests, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Non-success HTTP status other than 429
    #[error("Provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Request to provider failed: {0}")]
    Network(#[from] reqwest::Error),

    /// Body could not be decoded, or the mock ran dry
    #[error("Unreadable completion: {0}")]
    Decode(String),

    #[error("LLM is not configured: {0}")]
    Config(String),
}

impl LlmError {
    /// Worth another attempt with backoff
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) => true,
            Self::Status { status, .. } => *status == 408 || *status >= 500,
            Self::Decode(_) | Self::Config(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> LlmError {
        LlmError::Status {
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_is_retryable() {
        let limited = LlmError::RateLimited {
            retry_after: Duration::from_secs(2),
        };
        assert!(limited.is_retryable());
        assert!(status(503).is_retryable());
        assert!(status(408).is_retryable());

        assert!(!status(401).is_retryable());
        assert!(!LlmError::Decode("trailing comma".to_string()).is_retryable());
        assert!(!LlmError::Config("OPENAI_API_KEY not set".to_string()).is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(status(401).to_string(), "Provider returned HTTP 401: ");
    }
}
