//! Retry logic with exponential backoff

use std::time::Duration;

use rand::Rng;
use serde::Deserialize;

const fn default_base_retry_delay() -> u64 {
    30
}

const fn default_max_retry_delay() -> u64 {
    3600
}

const fn default_retry_jitter_factor() -> f64 {
    0.2
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry (in seconds)
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: u64,

    /// Upper bound on any single delay (in seconds)
    #[serde(default = "default_max_retry_delay")]
    pub max_retry_delay_secs: u64,

    /// A factor of 0.2 means ±20% randomness
    #[serde(default = "default_retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_retry_delay_secs: default_base_retry_delay(),
            max_retry_delay_secs: default_max_retry_delay(),
            retry_jitter_factor: default_retry_jitter_factor(),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-indexed), without jitter.
    ///
    /// Doubles from `base_retry_delay_secs` and stops at
    /// `max_retry_delay_secs`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1);
        let secs = 2u64
            .checked_pow(doublings)
            .map_or(u64::MAX, |factor| self.base_retry_delay_secs.saturating_mul(factor))
            .min(self.max_retry_delay_secs);

        Duration::from_secs(secs)
    }

    /// Delay before retry number `attempt`, spread by the jitter factor.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        jitter(self.backoff(attempt), self.retry_jitter_factor)
    }
}

/// Move `delay` by a random amount of up to `factor` of itself either way.
fn jitter(delay: Duration, factor: f64) -> Duration {
    let spread = delay.as_secs_f64() * factor.abs();
    if spread <= 0.0 {
        return delay;
    }

    let offset: f64 = rand::rng().random_range(-spread..=spread);
    Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy {
            base_retry_delay_secs: 30,
            max_retry_delay_secs: 3600,
            retry_jitter_factor: jitter,
        }
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let policy = policy(0.0);
        let delays: Vec<u64> = (1..=9).map(|n| policy.backoff(n).as_secs()).collect();
        assert_eq!(delays, vec![30, 60, 120, 240, 480, 960, 1920, 3600, 3600]);

        assert_eq!(policy.backoff(0), Duration::from_secs(30));
        assert_eq!(policy.backoff(200), Duration::from_secs(3600));
        assert_eq!(policy.delay(4), Duration::from_secs(240));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = policy(0.2);
        for _ in 0..50 {
            let delay = policy.delay(2).as_secs_f64();
            assert!((47.9..=72.1).contains(&delay), "delay {delay} outside ±20% of 60");
        }
    }
}
