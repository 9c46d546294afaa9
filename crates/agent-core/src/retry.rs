//! Bounded exponential backoff for LLM calls.

use std::time::Duration;

/// Retry policy for a single LLM round-trip
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total submission attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    /// Maximum backoff cap
    pub max_delay: Duration,
    /// Multiplier per consecutive failure
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to wait after `failed_attempts` consecutive failures (1-based)
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        let exponent = i32::try_from(failed_attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = delay_secs.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}
