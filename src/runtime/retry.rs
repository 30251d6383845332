//! Backoff schedule for model provider calls

use crate::llm::LlmError;
use std::time::Duration;

/// Bounded exponential backoff with a rate-limit floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Minimum wait after a rate-limit rejection
    pub rate_limit_floor: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            rate_limit_floor: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Exponential delay after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exp)
            .min(self.max_delay)
    }

    /// How long to wait before the next attempt, or `None` when the error is
    /// terminal or attempts are exhausted.
    pub fn next_delay(&self, attempt: u32, error: &LlmError) -> Option<Duration> {
        if attempt >= self.max_attempts || !error.kind.is_retryable() {
            return None;
        }
        let delay = self.backoff(attempt);
        if error.kind.is_rate_limit() {
            let hinted = error.retry_after.unwrap_or_default();
            return Some(delay.max(self.rate_limit_floor).max(hinted));
        }
        Some(delay)
    }
}
