//! Retry policy for page fetches and store flushes
//!
//! Failures are classified by the caller (`NavigationError::is_transient`);
//! the policy only decides whether and how long to wait before the next try.

use std::time::Duration;

use tracing::debug;

use super::config::CrawlConfig;
use super::page_source::NavigationError;

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Exponential backoff with jitter, bounded by `max_attempts`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Policy for page navigation
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
            Duration::from_millis(config.retry_max_delay_ms),
        )
    }

    /// Policy for store flushes: same backoff, `flush_retries` attempts
    pub fn for_flushes(config: &CrawlConfig) -> Self {
        Self {
            max_attempts: config.flush_retries.max(1),
            ..Self::from_config(config)
        }
    }

    /// Policy with no waiting, for tests and replays
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Backoff before attempt `attempt + 1`: `base * 2^(attempt-1)` plus up to 25% jitter, capped at `max_delay`
    pub fn backoff(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay.saturating_mul(1 << exponent);
        let jitter_ceiling = exponential.as_millis() as u64 / 4;
        let jitter = Duration::from_millis(fastrand::u64(0..=jitter_ceiling));
        (exponential + jitter).min(self.max_delay)
    }

    /// Decide after `attempt` (1-based) failed with `error`
    pub fn decide(&self, attempt: u32, error: &NavigationError) -> RetryDecision {
        if !error.is_transient() {
            debug!("Not retrying non-transient error: {}", error);
            return RetryDecision::GiveUp;
        }
        self.decide_attempt(attempt)
    }

    /// Decide after `attempt` failed, without classifying the error
    pub fn decide_attempt(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryAfter(self.backoff(attempt))
        }
    }
}
