//! Exponential backoff policy shared by the fetcher and the notifier

use crate::config::HttpConfig;
use rand::Rng;
use std::time::Duration;

/// Retry ceiling and backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound for any single delay
    pub cap: Duration,
    /// Pick a random delay in `[delay / 2, delay]` instead of the exact value
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base: Duration::from_secs(2),
            cap: Duration::from_secs(10),
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
            jitter: config.jitter,
        }
    }

    /// Returns the delay to wait after failed attempt number `attempt`
    /// (1-based): `min(cap, base * 2^(attempt - 1))`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base
            .saturating_mul(1u32 << exponent)
            .min(self.cap);

        if self.jitter && !delay.is_zero() {
            let millis = delay.as_millis() as u64;
            let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
            Duration::from_millis(jittered)
        } else {
            delay
        }
    }

    /// Returns true if another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
