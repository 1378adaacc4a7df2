//! Retry policy: decides retry versus terminal failure and the backoff delay.

use std::time::Duration;

use rand::Rng;

use crate::config::QueueConfig;
use crate::error::TaskError;

/// Exponential backoff with a ceiling and optional jitter.
///
/// delay = min(base * 2^(retry_count - 1), max), then up to `jitter * delay`
/// extra, still capped at `max`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Upper bound for any delay.
    pub max_delay: Duration,

    /// Fraction of the backoff added as random extra delay.
    pub jitter: f64,
}

/// Outcome of a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Re-admit after `delay`; `retry_count` is the new count.
    Retry { retry_count: u32, delay: Duration },
    Fail,
}

impl RetryPolicy {
    pub fn from_config(config: &QueueConfig) -> Self {
        Self {
            base_delay: config.retry_delay_base(),
            max_delay: config.max_retry_delay(),
            jitter: config.retry_jitter,
        }
    }

    /// Deterministic part of the delay before retry number `retry_count` (1-indexed).
    ///
    /// Example with base=1s, max=30s:
    /// - retry 1: 1s
    /// - retry 2: 2s
    /// - retry 3: 4s
    /// - retry 6: 30s (32s capped)
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let exponent = retry_count.saturating_sub(1);
        2u32.checked_pow(exponent)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Backoff plus jitter.
    pub fn next_delay(&self, retry_count: u32) -> Duration {
        let delay = self.backoff(retry_count);
        if self.jitter <= 0.0 {
            return delay;
        }
        let extra = delay.mul_f64(rand::thread_rng().gen_range(0.0..=self.jitter));
        delay.saturating_add(extra).min(self.max_delay)
    }

    /// `retry_count` is the number of retries already consumed.
    pub fn decide(&self, retry_count: u32, max_retries: u32, error: &TaskError) -> RetryDecision {
        if !error.is_retryable() || retry_count >= max_retries {
            return RetryDecision::Fail;
        }
        let retry_count = retry_count + 1;
        RetryDecision::Retry {
            retry_count,
            delay: self.next_delay(retry_count),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}
