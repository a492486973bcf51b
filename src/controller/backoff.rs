//! # Backoff Calculation
//!
//! Exponential requeue delays for the dispatcher.
//!
//! The delay after `n` consecutive failed or retry-requested passes is
//! `base * 2^n`, capped at `max`. Retries are never exhausted; a successful
//! pass resets the count.

use std::time::Duration;

/// Per-item exponential backoff
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    failures: u32,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: 0,
        }
    }

    /// Delay before the next attempt; advances the failure count
    pub fn next_backoff(&mut self) -> Duration {
        let delay = Self::delay_for(self.base, self.max, self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// Forget all previous failures
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn delay_for(base: Duration, max: Duration, failures: u32) -> Duration {
        // 2^31 already exceeds any sane max for a millisecond base
        let factor = 2u32.checked_pow(failures.min(31)).unwrap_or(u32::MAX);
        base.checked_mul(factor).map_or(max, |delay| delay.min(max))
    }
}
