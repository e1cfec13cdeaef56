//! Configuration for the sync engine.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracksync_protocol::PendingOperation;

/// Default cache time-to-live.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// Default delay inserted before every cache-miss fetch.
pub const DEFAULT_CACHE_THROTTLE: Duration = Duration::from_millis(200);

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Interval between automatic queue drains.
    pub drain_interval: Duration,
    /// Interval between automatic fetch-and-merge cycles.
    pub merge_interval: Duration,
    /// Retry policy for queued operations.
    pub retry: RetryPolicy,
    /// Read-through cache configuration.
    pub cache: CacheConfig,
}

impl SyncConfig {
    /// Creates a new sync configuration with default intervals.
    pub fn new() -> Self {
        Self {
            drain_interval: Duration::from_secs(30),
            merge_interval: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            cache: CacheConfig::default(),
        }
    }

    /// Sets the drain interval.
    pub fn with_drain_interval(mut self, interval: Duration) -> Self {
        self.drain_interval = interval;
        self
    }

    /// Sets the merge interval.
    pub fn with_merge_interval(mut self, interval: Duration) -> Self {
        self.merge_interval = interval;
        self
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the cache configuration.
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry behavior for queued operations.
///
/// The default retries every operation on every drain, forever.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Failed attempts after which an operation is dead-lettered.
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound on the delay.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Creates a policy that dead-letters after `max_attempts` failures,
    /// backing off exponentially from one second up to five minutes.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5 * 60),
            backoff_multiplier: 2.0,
        }
    }

    /// Creates a policy that retries forever without delay.
    pub fn unlimited() -> Self {
        Self {
            max_attempts: None,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the wait after `failures` failed attempts.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(failures.saturating_sub(1) as i32);

        Duration::from_secs_f64(base_delay.min(self.max_delay.as_secs_f64()))
    }

    /// Returns true if the operation may be replayed at `now`.
    pub fn is_due(&self, operation: &PendingOperation, now: DateTime<Utc>) -> bool {
        let Some(last) = operation.last_attempt_at else {
            return true;
        };
        let delay = self.delay_for_attempt(operation.attempts);
        match chrono::Duration::from_std(delay) {
            Ok(delay) => now >= last + delay,
            Err(_) => false,
        }
    }

    /// Returns true if an operation with `failures` failed attempts is dead.
    pub fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// Configuration for the read-through query cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Age after which an entry is treated as absent.
    pub ttl: Duration,
    /// Delay inserted before every cache-miss fetch.
    pub throttle: Duration,
    /// Maximum number of entries. `None` is unbounded.
    pub max_entries: Option<usize>,
}

impl CacheConfig {
    /// Creates a cache configuration with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            throttle: DEFAULT_CACHE_THROTTLE,
            max_entries: Some(256),
        }
    }

    /// Sets the throttle delay.
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Sets the maximum number of entries.
    pub fn with_max_entries(mut self, max_entries: Option<usize>) -> Self {
        self.max_entries = max_entries;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
