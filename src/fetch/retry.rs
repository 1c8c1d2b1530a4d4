//! Retry policy for idempotent GET requests
//!
//! - Only 429, 500, 502, 503 and 504 responses are retried
//! - A `Retry-After` header (delta-seconds or HTTP-date) wins over backoff
//! - Every delay is clamped to [`MAX_RETRY_DELAY`]

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;

/// Upper bound on any single retry wait
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5 * 60);

/// Largest exponent applied to the backoff base
const MAX_BACKOFF_EXPONENT: u32 = 6;

/// Upper bound (exclusive) of the random jitter added to backoff delays
const JITTER_MS: u64 = 250;

/// Returns true for status codes worth another attempt
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Backoff schedule plus attempt cap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            jitter: true,
        }
    }

    /// Disables jitter, giving deterministic delays
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before retry number `retry` (0 for the first retry)
    ///
    /// `base * 2^min(retry, 6)` plus up to 250ms of jitter, clamped.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.pow(retry.min(MAX_BACKOFF_EXPONENT));
        let jitter = if self.jitter {
            Duration::from_millis(rand::thread_rng().gen_range(0..JITTER_MS))
        } else {
            Duration::ZERO
        };
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(MAX_RETRY_DELAY)
    }
}

/// Reads the server-directed wait from a `Retry-After` header
///
/// # Arguments
///
/// * `headers` - Response headers
/// * `now` - Reference time for HTTP-date values
///
/// # Returns
///
/// The clamped delay, or `None` when the header is absent or unparseable
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    parse_retry_after(value, now)
}

/// Parses a `Retry-After` value given as delta-seconds or an HTTP-date
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(seconds) = trimmed.parse::<i64>() {
        let seconds = u64::try_from(seconds.max(0)).unwrap_or(0);
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_DELAY));
    }

    let date = DateTime::parse_from_rfc2822(trimmed).ok()?;
    let wait = date
        .with_timezone(&Utc)
        .signed_duration_since(now)
        .to_std()
        .unwrap_or(Duration::ZERO);
    Some(wait.min(MAX_RETRY_DELAY))
}
