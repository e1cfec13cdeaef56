//! Remote store abstraction.

use crate::cache::CacheKey;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::DateTime;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracksync_protocol::OperationType;

/// Namespace used for cache keys of record queries.
const QUERY_NAMESPACE: &str = "shipments";

/// A read query against the remote store: exact matches on top-level fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecordQuery {
    /// Field name to required value.
    pub filters: BTreeMap<String, Value>,
}

impl RecordQuery {
    /// Creates a query matching every record.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an exact-match filter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    /// Returns true if `record` satisfies every filter.
    pub fn matches(&self, record: &Value) -> bool {
        self.filters
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    }

    /// Returns the cache key for this query.
    pub fn cache_key(&self) -> CacheKey {
        let params: serde_json::Map<String, Value> = self.filters.clone().into_iter().collect();
        CacheKey::from_value(QUERY_NAMESPACE, &Value::Object(params))
    }
}

/// The remote store holding the shared copy of all records.
///
/// Writes must be idempotent per record identifier: the pending queue
/// replays at least once, so the same operation may arrive twice.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Applies a mutation payload.
    async fn write(&self, op_type: OperationType, payload: &Value) -> SyncResult<()>;

    /// Fetches raw records matching `query`, newest `created_at` first.
    ///
    /// Records are untrusted and validated by the caller.
    async fn fetch(&self, query: &RecordQuery) -> SyncResult<Vec<Value>>;
}

/// An in-memory remote store for testing and demos.
///
/// Inserts are keyed by `id`, so replays are idempotent. Connectivity and
/// per-record write failures can be injected.
#[derive(Debug)]
pub struct InMemoryRemote {
    records: RwLock<Vec<Value>>,
    connected: AtomicBool,
    failing_ids: RwLock<HashSet<String>>,
    writes: AtomicU64,
    fetches: AtomicU64,
}

impl InMemoryRemote {
    /// Creates an empty, connected remote.
    pub fn new() -> Self {
        Self::with_records(Vec::new())
    }

    /// Creates a connected remote seeded with raw records.
    ///
    /// Seeded records are stored as given, malformed ones included.
    pub fn with_records(records: Vec<Value>) -> Self {
        Self {
            records: RwLock::new(records),
            connected: AtomicBool::new(true),
            failing_ids: RwLock::new(HashSet::new()),
            writes: AtomicU64::new(0),
            fetches: AtomicU64::new(0),
        }
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns true if the remote is reachable.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Makes every write for record `id` fail until cleared.
    pub fn fail_writes_for(&self, id: impl Into<String>) {
        self.failing_ids.write().insert(id.into());
    }

    /// Clears injected write failures.
    pub fn clear_failures(&self) {
        self.failing_ids.write().clear();
    }

    /// Replaces or appends a raw record by `id`.
    pub fn put_raw(&self, record: Value) {
        let mut records = self.records.write();
        upsert(&mut records, record);
    }

    /// Returns a copy of all stored records.
    pub fn records(&self) -> Vec<Value> {
        self.records.read().clone()
    }

    /// Returns the stored record with the given id.
    pub fn record(&self, id: &str) -> Option<Value> {
        self.records
            .read()
            .iter()
            .find(|r| record_id(r) == Some(id))
            .cloned()
    }

    /// Returns the number of write calls received, failed ones included.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Returns the number of fetch calls received, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn write(&self, op_type: OperationType, payload: &Value) -> SyncResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let id = record_id(payload)
            .ok_or_else(|| SyncError::remote_fatal("payload has no id"))?
            .to_string();
        if self.failing_ids.read().contains(&id) {
            return Err(SyncError::remote_retryable(format!("write rejected for {id}")));
        }

        let mut records = self.records.write();
        match op_type {
            OperationType::Add | OperationType::Update => upsert(&mut records, payload.clone()),
            OperationType::Delete => records.retain(|r| record_id(r) != Some(id.as_str())),
        }
        Ok(())
    }

    async fn fetch(&self, query: &RecordQuery) -> SyncResult<Vec<Value>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let mut matching: Vec<Value> = self
            .records
            .read()
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matching.sort_by_key(|r| Reverse(created_at_millis(r)));
        Ok(matching)
    }
}

fn record_id(record: &Value) -> Option<&str> {
    record.get("id").and_then(Value::as_str)
}

fn created_at_millis(record: &Value) -> Option<i64> {
    record
        .get("created_at")
        .and_then(Value::as_str)
        .and_then(|text| DateTime::parse_from_rfc3339(text).ok())
        .map(|ts| ts.timestamp_millis())
}

fn upsert(records: &mut Vec<Value>, record: Value) {
    let existing = record_id(&record)
        .and_then(|id| records.iter().position(|r| record_id(r) == Some(id)));
    match existing {
        Some(index) => records[index] = record,
        None => records.push(record),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str, created_at: &str, status: &str) -> Value {
        json!({"id": id, "created_at": created_at, "status": status})
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let remote = InMemoryRemote::new();
        let payload = record("A", "2024-01-01T00:00:00Z", "pending");

        remote.write(OperationType::Add, &payload).await.unwrap();
        remote.write(OperationType::Add, &payload).await.unwrap();

        assert_eq!(remote.records().len(), 1);
        assert_eq!(remote.write_count(), 2);
    }

    #[tokio::test]
    async fn delete_removes_by_id() {
        let remote = InMemoryRemote::with_records(vec![record("A", "2024-01-01T00:00:00Z", "pending")]);
        remote
            .write(OperationType::Delete, &json!({"id": "A"}))
            .await
            .unwrap();
        assert!(remote.record("A").is_none());
    }

    #[tokio::test]
    async fn disconnected_remote_fails() {
        let remote = InMemoryRemote::new();
        remote.set_connected(false);

        let result = remote.write(OperationType::Add, &json!({"id": "A"})).await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
        assert!(matches!(
            remote.fetch(&RecordQuery::all()).await,
            Err(SyncError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn injected_failures_are_per_record() {
        let remote = InMemoryRemote::new();
        remote.fail_writes_for("B");

        assert!(remote.write(OperationType::Add, &json!({"id": "A"})).await.is_ok());
        let err = remote
            .write(OperationType::Add, &json!({"id": "B"}))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        remote.clear_failures();
        assert!(remote.write(OperationType::Add, &json!({"id": "B"})).await.is_ok());
    }

    #[tokio::test]
    async fn fetch_filters_and_orders_newest_first() {
        let remote = InMemoryRemote::with_records(vec![
            record("A", "2024-01-01T00:00:00Z", "pending"),
            record("B", "2024-01-03T00:00:00Z", "pending"),
            record("C", "2024-01-02T00:00:00Z", "shipped"),
        ]);

        let all = remote.fetch(&RecordQuery::all()).await.unwrap();
        let ids: Vec<_> = all.iter().filter_map(|r| record_id(r)).collect();
        assert_eq!(ids, vec!["B", "C", "A"]);

        let pending = remote
            .fetch(&RecordQuery::all().with("status", "pending"))
            .await
            .unwrap();
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn query_cache_keys_are_canonical() {
        let a = RecordQuery::all().with("status", "pending").with("destination", "Lagos");
        let b = RecordQuery::all().with("destination", "Lagos").with("status", "pending");
        assert_eq!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), RecordQuery::all().cache_key());
    }
}
