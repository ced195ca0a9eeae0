//! # Exponential Backoff
//!
//! Per-key retry delays for the work queue. The delay doubles on every
//! failure, starting at the configured base and capped at the configured
//! ceiling. A successful reconciliation resets the sequence.
//!
//! ## Usage
//!
//! ```rust
//! use object_bucket_controller::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(10));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(10));
//! ```

use std::time::Duration;

/// Exponential backoff calculator
///
/// Delay for attempt `n` (0-based) is `base * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    /// Failures seen since the last reset
    attempts: u32,
}

impl ExponentialBackoff {
    /// Create a new backoff. A `max` below `base` is raised to `base`.
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
            attempts: 0,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempts).unwrap_or(u32::MAX);
        let delay = self
            .base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max));
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    /// Number of delays handed out since the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the backoff to the initial state
    ///
    /// # Example
    ///
    /// ```
    /// use object_bucket_controller::controller::backoff::ExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let mut backoff = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(60));
    /// backoff.next_backoff();
    /// backoff.next_backoff();
    /// backoff.reset();
    /// assert_eq!(backoff.next_backoff(), Duration::from_millis(500));
    /// ```
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(16));
        assert_eq!(backoff.attempts(), 5);
    }

    #[test]
    fn test_exponential_backoff_max_cap() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(5));

        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
        // Should stay at max
        assert_eq!(backoff.next_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn test_exponential_backoff_survives_many_attempts() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_secs(60));
        for _ in 0..200 {
            assert!(backoff.next_backoff() <= Duration::from_secs(60));
        }
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        backoff.next_backoff();
        backoff.next_backoff();
        backoff.next_backoff();

        backoff.reset();

        // Should restart from beginning after success
        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_exponential_backoff_max_below_base() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(3), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(3));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(3));
    }

    #[test]
    fn test_exponential_backoff_per_key_state() {
        let mut first = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
        let mut second = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        first.next_backoff();
        first.next_backoff();
        assert_eq!(first.next_backoff(), Duration::from_secs(4));

        // Second key starts fresh
        assert_eq!(second.next_backoff(), Duration::from_secs(1));
    }
}
