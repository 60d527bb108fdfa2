//! Retry policy: decides backoff delays after a failed cycle.

use std::time::Duration;

/// Backoff applied by the worker after a store or connection failure.
///
/// The worker never retries the failed entry itself (it is already off the
/// queue); the delay only throttles the next cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay after the first consecutive failure.
    pub base_delay: Duration,

    /// Backoff multiplier. `1.0` keeps the delay fixed.
    pub multiplier: f64,

    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Same delay after every failure.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            base_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
        }
    }

    /// Doubles the delay for each consecutive failure, capped at `max_delay`.
    pub fn exponential(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            multiplier: 2.0,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// No delay at all. Useful in tests.
    pub fn immediate() -> Self {
        Self::fixed(Duration::ZERO)
    }

    /// Delay before the next cycle.
    ///
    /// # Arguments
    /// * `failures` - consecutive failures so far (1-indexed). `0` is treated as `1`.
    ///
    /// delay = min(base_delay * multiplier^(failures - 1), max_delay)
    pub fn next_delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !delay_secs.is_finite() || delay_secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(delay_secs)
    }
}

impl Default for RetryPolicy {
    /// One second between failed cycles.
    fn default() -> Self {
        Self::fixed(Duration::from_secs(1))
    }
}
