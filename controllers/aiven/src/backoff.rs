//! # Exponential Backoff
//!
//! Requeue delays for hard reconcile errors. Each consecutive failure of the
//! same object doubles the delay, starting at the base and capped at the
//! maximum. A successful reconcile resets the object's counter.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Exponential backoff calculator
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    /// Create a backoff starting at `base` and capped at `max`
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Delay for the given number of consecutive failures (1-indexed)
    ///
    /// Sequence with base 5s: 5s, 10s, 20s, 40s, ... capped at `max`.
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

/// Consecutive-failure counts per object key (`namespace/name`)
#[derive(Debug)]
pub struct ErrorBackoff {
    backoff: ExponentialBackoff,
    failures: Mutex<HashMap<String, u32>>,
}

impl ErrorBackoff {
    /// Tracker using the given calculator
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record one more failure for `key` and return the delay to requeue with
    pub fn record_failure(&self, key: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let count = failures.entry(key.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        self.backoff.delay_for(*count)
    }

    /// Forget the failures of `key`
    pub fn reset(&self, key: &str) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(900));

        assert_eq!(backoff.delay_for(1), Duration::from_secs(5));
        assert_eq!(backoff.delay_for(2), Duration::from_secs(10));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(20));
        assert_eq!(backoff.delay_for(4), Duration::from_secs(40));
        assert_eq!(backoff.delay_for(8), Duration::from_secs(640));
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(5), Duration::from_secs(900));

        // 5 * 2^8 = 1280s, capped at 900s
        assert_eq!(backoff.delay_for(9), Duration::from_secs(900));
        // Should stay at max, even far past overflow
        assert_eq!(backoff.delay_for(64), Duration::from_secs(900));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(900));
    }

    #[test]
    fn test_error_backoff_reset() {
        let tracker = ErrorBackoff::new(ExponentialBackoff::new(
            Duration::from_secs(5),
            Duration::from_secs(900),
        ));

        assert_eq!(tracker.record_failure("ns/a"), Duration::from_secs(5));
        assert_eq!(tracker.record_failure("ns/a"), Duration::from_secs(10));
        // Other keys are independent
        assert_eq!(tracker.record_failure("ns/b"), Duration::from_secs(5));

        tracker.reset("ns/a");

        // Should restart from beginning after success
        assert_eq!(tracker.record_failure("ns/a"), Duration::from_secs(5));
    }
}
