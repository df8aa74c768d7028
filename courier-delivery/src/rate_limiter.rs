//! Per brand and provider rate limiting using the token bucket algorithm
//!
//! Each brand sends through one provider account, so limits are tracked per
//! `(brand, provider)` pair. The bucket refills at the provider's reported
//! maximum send rate and a daily budget, taken from the provider's
//! 24 hour (or monthly) allowance, caps the total.
//!
//! # Token Bucket Algorithm
//!
//! - Tokens are added to the bucket at a constant rate (`refill_rate`)
//! - Each message consumes one token
//! - If no tokens are available the send waits, or the job is throttled
//! - The bucket never holds more than one second of the provider's rate
//!
//! # Example
//!
//! ```text
//! Quota: 14 msg/sec, 50 000 per day, 49 990 sent, burst: 20
//! - Bucket starts with 14 tokens
//! - Tokens refill at 14/sec
//! - After 10 more sends the daily budget is spent and every
//!   acquire is refused until the next quota refresh
//! ```

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use courier_common::{BrandId, tracing};
use courier_providers::Quota;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Rate used before a provider's quota has been read
    #[serde(default = "default_messages_per_second")]
    pub messages_per_second: f64,

    /// Upper bound on bucket capacity
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,

    /// How long a quota reading stays fresh
    #[serde(default = "default_quota_refresh")]
    pub quota_refresh_secs: u64,

    /// How long to back off once the daily budget is spent
    #[serde(default = "default_budget_wait")]
    pub budget_wait_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            messages_per_second: default_messages_per_second(),
            burst_size: default_burst_size(),
            quota_refresh_secs: default_quota_refresh(),
            budget_wait_secs: default_budget_wait(),
        }
    }
}

const fn default_messages_per_second() -> f64 {
    1.0
}

const fn default_burst_size() -> u32 {
    20
}

const fn default_quota_refresh() -> u64 {
    300
}

const fn default_budget_wait() -> u64 {
    3600
}

/// The account a send is charged to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub brand_id: BrandId,
    pub provider: &'static str,
}

impl RateLimitKey {
    #[must_use]
    pub const fn new(brand_id: BrandId, provider: &'static str) -> Self {
        Self { brand_id, provider }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.brand_id, self.provider)
    }
}

/// Shared send permits for every worker sending on behalf of a brand
///
/// Implementations must be safe to share between workers; the in-process
/// [`RateLimiter`] covers workers running in the same process.
pub trait SendLimiter: Send + Sync + fmt::Debug {
    /// Whether the provider should be asked for a fresh quota.
    fn needs_quota(&self, key: &RateLimitKey) -> bool;

    /// Reconfigure the limits for `key` from a quota reading.
    fn apply_quota(&self, key: &RateLimitKey, quota: &Quota);

    /// Take one send permit.
    ///
    /// Returns `Err(Duration)` with the time until a permit may be available.
    fn try_acquire(&self, key: &RateLimitKey) -> Result<(), Duration>;
}

/// Token bucket for a single brand and provider
#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per second
    refill_rate: f64,
    last_refill: Instant,
}

fn capacity_for(messages_per_second: f64, burst_size: u32) -> f64 {
    messages_per_second.ceil().min(f64::from(burst_size)).max(1.0)
}

impl TokenBucket {
    fn new(messages_per_second: f64, burst_size: u32) -> Self {
        let capacity = capacity_for(messages_per_second, burst_size);
        Self {
            tokens: capacity,
            capacity,
            refill_rate: messages_per_second.max(f64::MIN_POSITIVE),
            last_refill: Instant::now(),
        }
    }

    fn reconfigure(&mut self, messages_per_second: f64, burst_size: u32) {
        self.refill();
        self.capacity = capacity_for(messages_per_second, burst_size);
        self.refill_rate = messages_per_second.max(f64::MIN_POSITIVE);
        self.tokens = self.tokens.min(self.capacity);
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();

        self.tokens = elapsed.mul_add(self.refill_rate, self.tokens).min(self.capacity);
        self.last_refill = now;
    }

    fn try_consume(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn time_until_available(&mut self) -> Duration {
        self.refill();

        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }

        let tokens_needed = 1.0 - self.tokens;
        Duration::from_secs_f64(tokens_needed / self.refill_rate)
    }
}

#[derive(Debug)]
struct LimiterState {
    bucket: TokenBucket,
    /// Sends left in the provider's window, `None` when unlimited
    budget: Option<u64>,
    refreshed_at: Option<Instant>,
}

/// In-process limiter shared by every worker of this process
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    limits: DashMap<RateLimitKey, Arc<parking_lot::Mutex<LimiterState>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            limits: DashMap::new(),
        }
    }

    fn get_state(&self, key: &RateLimitKey) -> Arc<parking_lot::Mutex<LimiterState>> {
        self.limits
            .entry(key.clone())
            .or_insert_with(|| {
                Arc::new(parking_lot::Mutex::new(LimiterState {
                    bucket: TokenBucket::new(
                        self.config.messages_per_second,
                        self.config.burst_size,
                    ),
                    budget: None,
                    refreshed_at: None,
                }))
            })
            .clone()
    }

    /// Current limits for `key`, for inspection.
    pub fn get_stats(&self, key: &RateLimitKey) -> Option<RateLimitStats> {
        self.limits.get(key).map(|state| {
            let mut state = state.lock();
            state.bucket.refill();

            RateLimitStats {
                available_tokens: state.bucket.tokens,
                capacity: state.bucket.capacity,
                refill_rate: state.bucket.refill_rate,
                budget: state.budget,
            }
        })
    }
}

impl SendLimiter for RateLimiter {
    fn needs_quota(&self, key: &RateLimitKey) -> bool {
        let refresh = Duration::from_secs(self.config.quota_refresh_secs);
        self.limits.get(key).is_none_or(|state| {
            state
                .lock()
                .refreshed_at
                .is_none_or(|at| at.elapsed() >= refresh)
        })
    }

    fn apply_quota(&self, key: &RateLimitKey, quota: &Quota) {
        let state = self.get_state(key);
        let mut state = state.lock();

        state
            .bucket
            .reconfigure(quota.max_send_rate, self.config.burst_size);
        state.budget = quota.remaining();
        state.refreshed_at = Some(Instant::now());
        drop(state);

        tracing::debug!(
            limit = %key,
            max_send_rate = quota.max_send_rate,
            remaining = ?quota.remaining(),
            "Applied provider quota"
        );
    }

    fn try_acquire(&self, key: &RateLimitKey) -> Result<(), Duration> {
        let state = self.get_state(key);
        let mut state = state.lock();

        if state.budget == Some(0) {
            drop(state);
            tracing::debug!(limit = %key, "Sending budget exhausted");
            return Err(Duration::from_secs(self.config.budget_wait_secs));
        }

        if state.bucket.try_consume() {
            if let Some(budget) = state.budget.as_mut() {
                *budget -= 1;
            }
            Ok(())
        } else {
            let wait_time = state.bucket.time_until_available();
            drop(state);
            tracing::debug!(
                limit = %key,
                wait_seconds = wait_time.as_secs_f64(),
                "Rate limit exceeded, must wait"
            );
            Err(wait_time)
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub available_tokens: f64,
    /// Maximum capacity (burst size)
    pub capacity: f64,
    /// Tokens per second
    pub refill_rate: f64,
    pub budget: Option<u64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn key() -> RateLimitKey {
        RateLimitKey::new(BrandId::from("brand-1"), "ses")
    }

    fn quota(rate: f64, max: Option<u64>, sent: u64) -> Quota {
        Quota {
            max_send_rate: rate,
            max_24_hour_send: max,
            sent_last_24_hours: sent,
            is_monthly_quota: false,
        }
    }

    #[test]
    fn test_token_bucket_consume() {
        let mut bucket = TokenBucket::new(10.0, 20);

        // Capacity is one second of the rate
        assert!(bucket.tokens >= 9.9);

        for _ in 0..10 {
            assert!(bucket.try_consume());
        }

        assert!(!bucket.try_consume());
    }

    #[test]
    #[cfg_attr(miri, ignore = "Time-based test not compatible with Miri")]
    fn test_token_bucket_refill() {
        let mut bucket = TokenBucket::new(10.0, 20);

        for _ in 0..10 {
            assert!(bucket.try_consume());
        }
        assert!(!bucket.try_consume());

        bucket.last_refill = Instant::now().checked_sub(Duration::from_millis(200)).unwrap();
        assert!(bucket.try_consume());
    }

    #[test]
    fn test_burst_caps_capacity() {
        let bucket = TokenBucket::new(100.0, 20);
        assert!((bucket.capacity - 20.0).abs() < f64::EPSILON);

        let slow = TokenBucket::new(0.5, 20);
        assert!((slow.capacity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_time_until_available() {
        let mut bucket = TokenBucket::new(2.0, 20);
        assert_eq!(bucket.time_until_available(), Duration::ZERO);

        bucket.try_consume();
        bucket.try_consume();
        let wait = bucket.time_until_available();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_millis(500));
    }

    #[test]
    fn test_quota_is_needed_until_applied() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        assert!(limiter.needs_quota(&key()));

        limiter.apply_quota(&key(), &quota(14.0, Some(50_000), 0));
        assert!(!limiter.needs_quota(&key()));

        let stale = RateLimiter::new(RateLimitConfig {
            quota_refresh_secs: 0,
            ..RateLimitConfig::default()
        });
        stale.apply_quota(&key(), &quota(14.0, None, 0));
        assert!(stale.needs_quota(&key()));
    }

    #[test]
    fn test_daily_budget_stops_sends() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter.apply_quota(&key(), &quota(100.0, Some(10), 8));

        assert!(limiter.try_acquire(&key()).is_ok());
        assert!(limiter.try_acquire(&key()).is_ok());

        let wait = limiter.try_acquire(&key()).unwrap_err();
        assert_eq!(wait, Duration::from_secs(3600));
        assert_eq!(limiter.get_stats(&key()).unwrap().budget, Some(0));
    }

    #[test]
    fn test_rate_limit_reports_wait() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        limiter.apply_quota(&key(), &quota(1.0, None, 0));

        assert!(limiter.try_acquire(&key()).is_ok());
        let wait = limiter.try_acquire(&key()).unwrap_err();
        assert!(wait > Duration::ZERO);
        assert!(wait <= Duration::from_secs(1));
    }

    #[test]
    fn test_limits_are_per_brand_and_provider() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        let other = RateLimitKey::new(BrandId::from("brand-2"), "ses");

        limiter.apply_quota(&key(), &quota(1.0, Some(1), 0));
        assert!(limiter.try_acquire(&key()).is_ok());
        assert!(limiter.try_acquire(&key()).is_err());

        assert!(limiter.try_acquire(&other).is_ok());
        assert_eq!(key().to_string(), "brand-1/ses");
    }
}
