//! Token-bucket rate limiting with optional minimum spacing.
//!
//! A [`RateLimiter`] holds up to `capacity` tokens. Every whole
//! `refill_interval` that elapses restores `capacity` tokens, capped at
//! `capacity`; partial-interval progress is discarded when a refill happens.
//! An optional `min_spacing` additionally forces a gap between two successful
//! admissions, independent of how many tokens remain.
//!
//! [`RateLimiters`] keys independent limiters by resource name.

use crate::error::{PacerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Smallest sleep taken by [`RateLimiter::acquire`] while the bucket is empty.
pub const MIN_RETRY_WAIT: Duration = Duration::from_millis(10);

/// Construction-time settings for one [`RateLimiter`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Maximum tokens held, also the number restored per refill.
    pub capacity: u32,
    /// Milliseconds after which `capacity` tokens are restored.
    pub refill_interval_ms: u64,
    /// Minimum milliseconds between two successful admissions.
    pub min_spacing_ms: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_interval_ms: 60_000,
            min_spacing_ms: None,
        }
    }
}

impl RateLimitConfig {
    /// Validates this configuration.
    ///
    /// Checks:
    /// - `capacity` must be greater than 0
    /// - `refill_interval_ms` must be greater than 0
    /// - `min_spacing_ms`, when set, must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(PacerError::Config(
                "capacity must be greater than 0".into(),
            ));
        }
        if self.refill_interval_ms == 0 {
            return Err(PacerError::Config(
                "refill_interval_ms must be greater than 0".into(),
            ));
        }
        if self.min_spacing_ms == Some(0) {
            return Err(PacerError::Config(
                "min_spacing_ms must be greater than 0 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// A token was consumed.
    Admitted,
    /// Denied by spacing; carries the remaining spacing time.
    Spacing(Duration),
    /// Denied by an empty bucket; carries the time until the next refill.
    Empty(Duration),
}

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill_at: Instant,
    last_admitted_at: Option<Instant>,
}

/// Discrete token bucket with an optional minimum spacing between admissions.
///
/// All methods take `&self`; share one limiter across tasks with an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    capacity: u32,
    refill_interval: Duration,
    min_spacing: Option<Duration>,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a full limiter from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::Config`] if the configuration is invalid.
    pub fn new(config: &RateLimitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            capacity: config.capacity,
            refill_interval: Duration::from_millis(config.refill_interval_ms),
            min_spacing: config.min_spacing_ms.map(Duration::from_millis),
            bucket: Mutex::new(Bucket {
                tokens: config.capacity,
                last_refill_at: Instant::now(),
                last_admitted_at: None,
            }),
        })
    }

    /// Try to take one token without waiting.
    ///
    /// Returns `false` when the minimum spacing has not elapsed since the last
    /// admission or when the bucket is empty. A denial consumes nothing.
    pub fn try_acquire(&self) -> bool {
        matches!(self.admit(), Admission::Admitted)
    }

    /// Wait until a token can be taken, then take it.
    ///
    /// Spacing denials sleep for exactly the remaining spacing. Empty-bucket
    /// denials sleep until the next refill, never less than [`MIN_RETRY_WAIT`].
    /// No ordering is guaranteed among concurrent waiters.
    pub async fn acquire(&self) {
        loop {
            match self.admit() {
                Admission::Admitted => return,
                Admission::Spacing(wait) => {
                    trace!(wait_ms = wait.as_millis() as u64, "rate limiter spacing wait");
                    tokio::time::sleep(wait).await;
                }
                Admission::Empty(until_refill) => {
                    let wait = until_refill.max(MIN_RETRY_WAIT);
                    trace!(
                        wait_ms = wait.as_millis() as u64,
                        "rate limiter empty, waiting for refill"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Current token count after applying any due refill. Consumes nothing.
    #[must_use]
    pub fn tokens(&self) -> u32 {
        let mut bucket = self.lock();
        let now = Instant::now();
        self.refill(&mut bucket, now);
        bucket.tokens
    }

    /// Maximum tokens held.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Interval after which the bucket is refilled.
    #[must_use]
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Minimum gap between admissions, if configured.
    #[must_use]
    pub fn min_spacing(&self) -> Option<Duration> {
        self.min_spacing
    }

    pub(crate) fn admit(&self) -> Admission {
        let mut bucket = self.lock();
        // Read the clock under the lock so timestamps never move backwards.
        let now = Instant::now();
        self.refill(&mut bucket, now);

        if let (Some(spacing), Some(last)) = (self.min_spacing, bucket.last_admitted_at) {
            let since = now.saturating_duration_since(last);
            if since < spacing {
                return Admission::Spacing(spacing - since);
            }
        }

        if bucket.tokens >= 1 {
            bucket.tokens -= 1;
            bucket.last_admitted_at = Some(now);
            return Admission::Admitted;
        }

        let since_refill = now.saturating_duration_since(bucket.last_refill_at);
        Admission::Empty(self.refill_interval.saturating_sub(since_refill))
    }

    fn refill(&self, bucket: &mut Bucket, now: Instant) {
        let elapsed = now.saturating_duration_since(bucket.last_refill_at);
        if elapsed < self.refill_interval {
            return;
        }

        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos();
        let restored = u128::from(self.capacity).saturating_mul(intervals);
        let total = u128::from(bucket.tokens)
            .saturating_add(restored)
            .min(u128::from(self.capacity));
        bucket.tokens = u32::try_from(total).unwrap_or(self.capacity);
        bucket.last_refill_at = now;
    }

    fn lock(&self) -> MutexGuard<'_, Bucket> {
        self.bucket.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Independent limiters keyed by resource name.
///
/// Resources without a configured limiter are unlimited.
#[derive(Debug, Default)]
pub struct RateLimiters {
    limiters: HashMap<String, RateLimiter>,
}

impl RateLimiters {
    /// Build one limiter per configured resource.
    ///
    /// # Errors
    ///
    /// Returns [`PacerError::Config`] naming the first invalid resource.
    pub fn new(configs: &BTreeMap<String, RateLimitConfig>) -> Result<Self> {
        let mut limiters = HashMap::with_capacity(configs.len());
        for (name, config) in configs {
            let limiter = RateLimiter::new(config)
                .map_err(|e| PacerError::Config(format!("limit '{name}': {e}")))?;
            limiters.insert(name.clone(), limiter);
        }
        debug!("built {} rate limiters", limiters.len());
        Ok(Self { limiters })
    }

    /// Limiter for `resource`, if one is configured.
    #[must_use]
    pub fn get(&self, resource: &str) -> Option<&RateLimiter> {
        self.limiters.get(resource)
    }

    /// Non-blocking admission for `resource`.
    pub fn try_acquire(&self, resource: &str) -> bool {
        match self.limiters.get(resource) {
            Some(limiter) => limiter.try_acquire(),
            // Unknown resource - allow by default
            None => true,
        }
    }

    /// Wait for admission on `resource`.
    pub async fn acquire(&self, resource: &str) {
        if let Some(limiter) = self.limiters.get(resource) {
            limiter.acquire().await;
        }
    }

    /// Remaining tokens for `resource`.
    #[must_use]
    pub fn tokens(&self, resource: &str) -> Option<u32> {
        self.limiters.get(resource).map(RateLimiter::tokens)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::sync::Arc;

    fn limiter(capacity: u32, refill_interval_ms: u64, min_spacing_ms: Option<u64>) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            capacity,
            refill_interval_ms,
            min_spacing_ms,
        })
        .expect("valid config")
    }

    #[tokio::test(start_paused = true)]
    async fn burst_then_empty() {
        let limiter = limiter(3, 1_000, None);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refills_after_interval() {
        let limiter = limiter(2, 200, None);

        assert!(limiter.try_acquire());
        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn partial_interval_does_not_refill() {
        let limiter = limiter(1, 200, None);

        assert!(limiter.try_acquire());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn long_idle_caps_at_capacity() {
        let limiter = limiter(3, 100, None);

        for _ in 0..3 {
            assert!(limiter.try_acquire());
        }
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(limiter.tokens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn refill_discards_partial_progress() {
        let limiter = limiter(1, 100, None);

        assert!(limiter.try_acquire());
        // 1.5 intervals: one refill, and the half interval is not banked.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(limiter.try_acquire());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!limiter.try_acquire());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(limiter.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_denial_keeps_token() {
        let limiter = limiter(5, 60_000, Some(100));

        assert!(limiter.try_acquire());
        assert!(!limiter.try_acquire());
        assert_eq!(limiter.tokens(), 4);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(limiter.try_acquire());
        assert_eq!(limiter.tokens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_bucket_denies_without_spacing_violation() {
        let limiter = limiter(1, 10_000, Some(10));

        assert!(limiter.try_acquire());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!limiter.try_acquire());
        assert!(matches!(limiter.admit(), Admission::Empty(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_enforces_spacing() {
        let limiter = limiter(10, 60_000, Some(100));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_waits_for_refill() {
        let limiter = limiter(1, 500, None);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(limiter.tokens(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquirers_all_admitted() {
        let limiter = Arc::new(limiter(2, 1_000, None));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for handle in handles {
            handle.await.expect("acquire task");
        }

        // Five admissions from a bucket of two need two refills.
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(limiter.tokens() <= limiter.capacity());
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_stay_within_bounds() {
        let limiter = limiter(4, 30, Some(5));

        for step in 0..200_u64 {
            let _ = limiter.try_acquire();
            let tokens = limiter.tokens();
            assert!(tokens <= 4, "step {step}: {tokens} tokens");
            tokio::time::sleep(Duration::from_millis(step % 7)).await;
        }
    }

    #[test]
    fn rejects_invalid_config() {
        let zero_capacity = RateLimitConfig {
            capacity: 0,
            ..Default::default()
        };
        let err = RateLimiter::new(&zero_capacity).unwrap_err();
        assert!(err.to_string().contains("capacity"));

        let zero_interval = RateLimitConfig {
            refill_interval_ms: 0,
            ..Default::default()
        };
        assert!(RateLimiter::new(&zero_interval).is_err());

        let zero_spacing = RateLimitConfig {
            min_spacing_ms: Some(0),
            ..Default::default()
        };
        assert!(RateLimiter::new(&zero_spacing).is_err());
    }

    #[tokio::test]
    async fn keyed_limiters_are_isolated() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "discord".to_owned(),
            RateLimitConfig {
                capacity: 2,
                refill_interval_ms: 60_000,
                min_spacing_ms: None,
            },
        );
        configs.insert(
            "email".to_owned(),
            RateLimitConfig {
                capacity: 3,
                refill_interval_ms: 60_000,
                min_spacing_ms: None,
            },
        );
        let limiters = RateLimiters::new(&configs).expect("limiters");

        assert!(limiters.try_acquire("discord"));
        assert!(limiters.try_acquire("discord"));
        assert!(!limiters.try_acquire("discord"));

        assert!(limiters.try_acquire("email"));
        assert_eq!(limiters.tokens("email"), Some(2));
        assert_eq!(limiters.tokens("discord"), Some(0));
    }

    #[tokio::test]
    async fn unknown_resource_is_unlimited() {
        let limiters = RateLimiters::new(&BTreeMap::new()).expect("limiters");

        assert!(limiters.try_acquire("anything"));
        limiters.acquire("anything").await;
        assert!(limiters.tokens("anything").is_none());
        assert!(limiters.get("anything").is_none());
    }

    #[test]
    fn keyed_config_error_names_resource() {
        let mut configs = BTreeMap::new();
        configs.insert(
            "broken".to_owned(),
            RateLimitConfig {
                capacity: 0,
                ..Default::default()
            },
        );
        let err = RateLimiters::new(&configs).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
