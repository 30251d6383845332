//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// LLM error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct LlmError {
    pub kind: LlmErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl LlmError {
    pub fn new(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    #[must_use]
    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn overloaded(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Overloaded, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::InvalidRequest, message)
    }

    pub fn timeout(after: Duration) -> Self {
        Self::new(
            LlmErrorKind::Network,
            format!("Request timed out after {}s", after.as_secs()),
        )
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(LlmErrorKind::Unknown, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Provider is temporarily overloaded (Anthropic 529) - retryable
    Overloaded,
    /// Rate limited (429) - retryable, with an extended backoff floor
    RateLimit,
    /// Network issues, timeouts - not retried
    Network,
    /// Server error (5xx) - not retried
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Bad request (400) - not retryable
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl LlmErrorKind {
    /// Only provider back-pressure is treated as transient. Everything else
    /// surfaces on the first failure.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Overloaded | Self::RateLimit)
    }

    pub fn is_rate_limit(self) -> bool {
        matches!(self, Self::RateLimit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_backpressure_is_retryable() {
        assert!(LlmErrorKind::Overloaded.is_retryable());
        assert!(LlmErrorKind::RateLimit.is_retryable());
        for kind in [
            LlmErrorKind::Network,
            LlmErrorKind::ServerError,
            LlmErrorKind::Auth,
            LlmErrorKind::InvalidRequest,
            LlmErrorKind::Unknown,
        ] {
            assert!(!kind.is_retryable(), "{kind:?} must not be retried");
        }
    }

    #[test]
    fn test_display_is_message() {
        let err = LlmError::overloaded("overloaded_error: try later");
        assert_eq!(err.to_string(), "overloaded_error: try later");
    }
}
