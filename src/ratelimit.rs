//! Per-user rate limiting for inbound mentions.
//!
//! Token bucket per key: `limit` tokens refill per second up to `burst`.
//! Buckets idle for longer than `expires_in` are forgotten.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Rate limit configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    pub enable: bool,
    /// Tokens added per second. Non-positive values fall back to 1.
    pub limit: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Idle time after which a user's bucket is dropped.
    pub expires_in_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enable: false,
            limit: 1.0,
            burst: 1,
            expires_in_secs: 180,
        }
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

/// A rate limiter keyed by user id.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: f64,
    expires_in: Duration,
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let rate = if config.limit > 0.0 { config.limit } else { 1.0 };
        Self {
            rate,
            burst: f64::from(config.burst.max(1)),
            expires_in: Duration::from_secs(config.expires_in_secs),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Take one token for `key`; false when the bucket is empty.
    pub fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        buckets.retain(|_, b| now.duration_since(b.last_seen) < self.expires_in);

        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.burst,
            last_seen: now,
        });
        let elapsed = now.duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn tracked_keys(&self) -> usize {
        self.buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: f64, burst: u32) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            enable: true,
            limit,
            burst,
            expires_in_secs: 60,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_allows_burst_then_blocks() {
        let limiter = limiter(1.0, 3);
        for _ in 0..3 {
            assert!(limiter.allow("U1"));
        }
        assert!(!limiter.allow("U1"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_refills_over_time() {
        let limiter = limiter(0.5, 1);
        assert!(limiter.allow("U1"));
        assert!(!limiter.allow("U1"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!limiter.allow("U1"), "half a token is not enough");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("U1"));
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_per_key_isolation() {
        let limiter = limiter(1.0, 1);
        assert!(limiter.allow("U1"));
        assert!(!limiter.allow("U1"));
        assert!(limiter.allow("U2"));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_buckets_expire() {
        let limiter = limiter(1.0, 1);
        limiter.allow("U1");
        limiter.allow("U2");
        assert_eq!(limiter.tracked_keys(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.allow("U3");
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn non_positive_limit_falls_back_to_one() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            limit: 0.0,
            ..RateLimitConfig::default()
        });
        assert!((limiter.rate - 1.0).abs() < f64::EPSILON);
    }
}
