//! Per-subscription retry policy and exponential backoff calculation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WebhookError;

/// Bounds for retry policy fields, enforced at create/update time.
pub const MAX_ATTEMPTS_RANGE: std::ops::RangeInclusive<i32> = 1..=10;
pub const BACKOFF_MULTIPLIER_RANGE: std::ops::RangeInclusive<f64> = 1.0..=10.0;
pub const INITIAL_DELAY_MS_RANGE: std::ops::RangeInclusive<i64> = 100..=60_000;
pub const MAX_DELAY_MS_RANGE: std::ops::RangeInclusive<i64> = 1_000..=3_600_000;

/// Retry policy embedded in a webhook subscription.
///
/// Delay before attempt `n + 1`, after attempt `n` (1-based) has failed:
/// `min(initial_delay * backoff_multiplier^(n-1), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(rename = "maxAttempts")]
    pub max_attempts: i32,
    #[serde(rename = "backoffMultiplier")]
    pub backoff_multiplier: f64,
    /// Initial delay in milliseconds.
    #[serde(rename = "initialDelay")]
    pub initial_delay_ms: i64,
    /// Delay ceiling in milliseconds.
    #[serde(rename = "maxDelay")]
    pub max_delay_ms: i64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_multiplier: 2.0,
            initial_delay_ms: 1_000,
            max_delay_ms: 300_000,
        }
    }
}

/// Outcome of the retry decision after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Attempt budget spent; finalize as exhausted.
    Exhausted,
    /// Schedule the next attempt after this delay.
    RetryAfter(Duration),
}

impl RetryPolicy {
    /// Check field bounds, returning a validation error on the first
    /// out-of-range value.
    pub fn validate(&self) -> Result<(), WebhookError> {
        if !MAX_ATTEMPTS_RANGE.contains(&self.max_attempts) {
            return Err(WebhookError::Validation(format!(
                "maxAttempts must be between {} and {}",
                MAX_ATTEMPTS_RANGE.start(),
                MAX_ATTEMPTS_RANGE.end()
            )));
        }
        if !BACKOFF_MULTIPLIER_RANGE.contains(&self.backoff_multiplier) {
            return Err(WebhookError::Validation(format!(
                "backoffMultiplier must be between {} and {}",
                BACKOFF_MULTIPLIER_RANGE.start(),
                BACKOFF_MULTIPLIER_RANGE.end()
            )));
        }
        if !INITIAL_DELAY_MS_RANGE.contains(&self.initial_delay_ms) {
            return Err(WebhookError::Validation(format!(
                "initialDelay must be between {} and {} ms",
                INITIAL_DELAY_MS_RANGE.start(),
                INITIAL_DELAY_MS_RANGE.end()
            )));
        }
        if !MAX_DELAY_MS_RANGE.contains(&self.max_delay_ms) {
            return Err(WebhookError::Validation(format!(
                "maxDelay must be between {} and {} ms",
                MAX_DELAY_MS_RANGE.start(),
                MAX_DELAY_MS_RANGE.end()
            )));
        }
        Ok(())
    }

    /// Delay before the attempt following failed attempt `attempt` (1-based).
    pub fn delay_after_attempt(&self, attempt: i32) -> Duration {
        let exponent = (attempt - 1).max(0);
        let raw = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        let capped = raw.min(self.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    /// Decide whether failed attempt `attempt` (1-based) retries or exhausts.
    pub fn decide(&self, attempt: i32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::Exhausted
        } else {
            RetryDecision::RetryAfter(self.delay_after_attempt(attempt))
        }
    }
}
