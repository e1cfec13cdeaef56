//! Read-through query cache with TTL.

use crate::config::CacheConfig;
use crate::error::SyncResult;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;
use tracing::debug;

/// A cache key derived deterministically from query parameters.
///
/// Rendered as `<namespace>-<canonical json>` with object keys sorted at
/// every level, so equal parameters always produce equal keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives a key from serializable parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters cannot be represented as JSON.
    pub fn new<P: Serialize + ?Sized>(namespace: &str, params: &P) -> SyncResult<Self> {
        let value = serde_json::to_value(params)?;
        Ok(Self::from_value(namespace, &value))
    }

    /// Derives a key from a JSON value.
    pub fn from_value(namespace: &str, params: &Value) -> Self {
        Self(format!("{namespace}-{}", canonical(params)))
    }

    /// Returns the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonical(v)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(values) => Value::Array(values.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

struct CacheEntry<V> {
    value: V,
    stored_at: Instant,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that invoked the producer.
    pub misses: u64,
}

/// Time-bounded memoization of remote read queries.
///
/// Entries older than the TTL are treated as absent. Every miss waits for
/// the configured throttle before calling the producer, which spaces out
/// bursts of remote reads. When `max_entries` is set, inserting at capacity
/// first drops expired entries and then the oldest one.
///
/// The map lock is never held across the producer call; two concurrent
/// misses for the same key both fetch and the later result wins.
pub struct QueryCache<V> {
    config: CacheConfig,
    entries: Mutex<HashMap<CacheKey, CacheEntry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> QueryCache<V> {
    /// Creates an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Returns the cached value for `key` if it is still fresh.
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.config.ttl)
            .map(|entry| entry.value.clone())
    }

    /// Returns the cached value for `key`, or fetches and stores it.
    ///
    /// Only successful results are stored; a producer error is returned
    /// unchanged and leaves the cache untouched.
    pub async fn cached_query<F, Fut, E>(&self, key: &CacheKey, producer: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache hit");
            return Ok(value);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "cache miss");

        if !self.config.throttle.is_zero() {
            tokio::time::sleep(self.config.throttle).await;
        }

        let value = producer().await?;
        self.insert(key.clone(), value.clone());
        Ok(value)
    }

    /// Stores a value, stamping it with the current time.
    pub fn insert(&self, key: CacheKey, value: V) {
        let mut entries = self.entries.lock();

        if let Some(max) = self.config.max_entries {
            if !entries.contains_key(&key) && entries.len() >= max {
                let ttl = self.config.ttl;
                entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);

                if entries.len() >= max {
                    let oldest = entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.stored_at)
                        .map(|(k, _)| k.clone());
                    if let Some(oldest) = oldest {
                        entries.remove(&oldest);
                    }
                }
            }
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Removes the entry for `key`. Returns true if one existed.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Removes all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Removes expired entries and returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let ttl = self.config.ttl;
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        before - entries.len()
    }

    /// Returns the number of stored entries, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
