//! Reconnect delay policy.
//!
//! Exponential backoff, `min(max, base * 2^attempt)`, plus a random jitter
//! so many clients do not reconnect in lockstep.

use std::time::Duration;

use rand::Rng;

use super::config::WsConfig;

/// Exponential backoff with bounded jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    max_jitter: Duration,
}

impl Backoff {
    /// Creates a new policy.
    #[must_use]
    pub const fn new(base: Duration, max: Duration, max_jitter: Duration) -> Self {
        Self {
            base,
            max,
            max_jitter,
        }
    }

    /// Creates the policy described by a connection config.
    #[must_use]
    pub fn from_config(config: &WsConfig) -> Self {
        Self::new(
            config.reconnect_delay,
            config.max_reconnect_delay,
            config.max_jitter,
        )
    }

    /// Returns the delay before jitter for the given zero-based attempt.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.max, |d| d.min(self.max))
    }

    /// Returns the delay for the given attempt with an explicit jitter,
    /// clamped to the configured maximum jitter.
    #[must_use]
    pub fn delay_with_jitter(&self, attempt: u32, jitter: Duration) -> Duration {
        self.base_delay(attempt) + jitter.min(self.max_jitter)
    }

    /// Returns the delay for the given attempt with random jitter.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let max_ms = u64::try_from(self.max_jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter = if max_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Returns the largest delay this policy can produce.
    #[must_use]
    pub fn ceiling(&self) -> Duration {
        self.max + self.max_jitter
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&WsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delay_within_jitter_window() {
        let backoff = Backoff::default();
        for _ in 0..100 {
            let d = backoff.delay(0);
            assert!(d >= Duration::from_secs(1));
            assert!(d <= Duration::from_millis(1300));
        }
    }

    #[test]
    fn test_delays_non_decreasing_and_capped() {
        let backoff = Backoff::default();
        let mut previous = Duration::ZERO;
        for attempt in 0..40 {
            let d = backoff.base_delay(attempt);
            assert!(d >= previous);
            assert!(d <= Duration::from_secs(30));
            previous = d;
        }
        assert_eq!(backoff.base_delay(1), Duration::from_secs(2));
        assert_eq!(backoff.base_delay(4), Duration::from_secs(16));
        assert_eq!(backoff.base_delay(5), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_is_clamped() {
        let backoff = Backoff::default();
        assert_eq!(
            backoff.delay_with_jitter(0, Duration::from_secs(5)),
            Duration::from_millis(1300)
        );
        assert_eq!(backoff.ceiling(), Duration::from_millis(30_300));
        for attempt in 0..40 {
            assert!(backoff.delay(attempt) <= backoff.ceiling());
        }
    }

    #[test]
    fn test_zero_jitter() {
        let backoff = Backoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            Duration::ZERO,
        );
        assert_eq!(backoff.delay(0), Duration::from_millis(10));
        assert_eq!(backoff.delay(3), Duration::from_millis(80));
        assert_eq!(backoff.delay(4), Duration::from_millis(100));
    }
}
