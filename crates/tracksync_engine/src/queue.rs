//! Durable queue of mutations awaiting replay against the remote store.
//!
//! The queue is stored as a single JSON array. Every change rewrites the
//! whole document through [`QueueStorage::store`], so a crash leaves either
//! the old or the new sequence on disk.
//!
//! Replay is at-least-once: an operation is removed only after the remote
//! store acknowledged it, and a crash between the acknowledgement and the
//! rewrite replays it again on the next drain.

use crate::config::RetryPolicy;
use crate::error::{SyncError, SyncResult};
use crate::in_flight::InFlight;
use crate::remote::RemoteStore;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};
use tracksync_protocol::{OperationType, PendingOperation};
use tracksync_storage::{QueueStorage, StorageError};

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Operations acknowledged by the remote store and removed.
    pub replayed: usize,
    /// Operations that failed and stay queued.
    pub failed: usize,
    /// Operations skipped because their retry delay has not elapsed.
    pub deferred: usize,
    /// Operations removed after exhausting their retry budget.
    pub dead_lettered: Vec<PendingOperation>,
    /// Queue length after the drain, including operations added meanwhile.
    pub remaining: usize,
}

impl DrainReport {
    /// Returns true if every drained operation was replayed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.deferred == 0 && self.dead_lettered.is_empty()
    }
}

/// Ordered, persistent queue of pending operations.
pub struct PendingQueue<S: QueueStorage> {
    storage: S,
    retry: RetryPolicy,
    /// Serializes read-modify-write cycles on the stored document.
    write_lock: Mutex<()>,
    draining: AtomicBool,
}

impl<S: QueueStorage> PendingQueue<S> {
    /// Opens the queue, checking that any stored document is readable.
    pub fn open(storage: S, retry: RetryPolicy) -> SyncResult<Self> {
        let queue = Self {
            storage,
            retry,
            write_lock: Mutex::new(()),
            draining: AtomicBool::new(false),
        };
        let pending = queue.load()?;
        debug!(pending = pending.len(), "opened pending queue");
        Ok(queue)
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns the retry policy.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Returns the queued operations, oldest first.
    pub fn pending(&self) -> SyncResult<Vec<PendingOperation>> {
        self.load()
    }

    /// Returns the number of queued operations.
    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.load()?.len())
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Returns true while a drain is running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Appends a new operation stamped with the current time.
    pub fn enqueue(&self, op_type: OperationType, payload: Value) -> SyncResult<PendingOperation> {
        let operation = PendingOperation::new(op_type, payload, Utc::now());
        self.enqueue_operation(operation.clone())?;
        Ok(operation)
    }

    /// Appends an existing operation.
    pub fn enqueue_operation(&self, operation: PendingOperation) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        let mut pending = self.load()?;
        debug!(
            op = %operation.op_type,
            id = operation.record_id().unwrap_or_default(),
            "queueing operation"
        );
        pending.push(operation);
        self.save(&pending)
    }

    /// Removes every queued operation.
    pub fn clear(&self) -> SyncResult<()> {
        let _guard = self.write_lock.lock();
        if self.is_draining() {
            return Err(SyncError::DrainInProgress);
        }
        self.storage.clear()?;
        Ok(())
    }

    /// Replays queued operations in order against `remote`.
    ///
    /// Failed operations stay in place, in their original order, and are
    /// retried on a later drain. Operations enqueued while the drain runs
    /// are kept after them.
    pub async fn drain<R: RemoteStore + ?Sized>(&self, remote: &R) -> SyncResult<DrainReport> {
        let _drain = InFlight::acquire(&self.draining).ok_or(SyncError::DrainInProgress)?;

        let snapshot = {
            let _guard = self.write_lock.lock();
            self.load()?
        };
        let drained = snapshot.len();
        let mut report = DrainReport::default();
        if drained == 0 {
            return Ok(report);
        }

        let mut kept = Vec::with_capacity(drained);
        for mut operation in snapshot {
            if !self.retry.is_due(&operation, Utc::now()) {
                report.deferred += 1;
                kept.push(operation);
                continue;
            }

            match remote.write(operation.op_type, &operation.payload).await {
                Ok(()) => report.replayed += 1,
                Err(e) => {
                    operation.record_failure(Utc::now());
                    warn!(
                        op = %operation.op_type,
                        id = operation.record_id().unwrap_or_default(),
                        attempts = operation.attempts,
                        error = %e,
                        "replay failed"
                    );
                    if self.retry.is_exhausted(operation.attempts) {
                        error!(
                            op = %operation.op_type,
                            id = operation.record_id().unwrap_or_default(),
                            attempts = operation.attempts,
                            "dropping operation after repeated failures"
                        );
                        report.dead_lettered.push(operation);
                    } else {
                        report.failed += 1;
                        kept.push(operation);
                    }
                }
            }
        }

        {
            let _guard = self.write_lock.lock();
            let current = self.load()?;
            // The snapshot is a prefix of the stored sequence: clear is
            // refused while draining and enqueue only appends.
            kept.extend(current.into_iter().skip(drained));
            self.save(&kept)?;
        }
        report.remaining = kept.len();

        debug!(
            replayed = report.replayed,
            failed = report.failed,
            deferred = report.deferred,
            remaining = report.remaining,
            "drain finished"
        );
        Ok(report)
    }

    fn load(&self) -> SyncResult<Vec<PendingOperation>> {
        match self.storage.load()? {
            None => Ok(Vec::new()),
            Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                SyncError::Storage(StorageError::Corrupted(format!(
                    "unreadable pending queue: {e}"
                )))
            }),
        }
    }

    fn save(&self, pending: &[PendingOperation]) -> SyncResult<()> {
        let bytes = serde_json::to_vec(pending)?;
        self.storage.store(&bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{InMemoryRemote, RecordQuery};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use tracksync_storage::InMemoryStorage;

    fn open(storage: &InMemoryStorage, retry: RetryPolicy) -> PendingQueue<InMemoryStorage> {
        PendingQueue::open(storage.clone(), retry).unwrap()
    }

    fn ids(queue: &PendingQueue<InMemoryStorage>) -> Vec<String> {
        queue
            .pending()
            .unwrap()
            .iter()
            .filter_map(|op| op.record_id().map(str::to_string))
            .collect()
    }

    /// Delegates to an in-memory remote after a one second delay.
    struct SlowRemote(InMemoryRemote);

    #[async_trait]
    impl RemoteStore for SlowRemote {
        async fn write(&self, op_type: OperationType, payload: &Value) -> SyncResult<()> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.0.write(op_type, payload).await
        }

        async fn fetch(&self, query: &RecordQuery) -> SyncResult<Vec<Value>> {
            self.0.fetch(query).await
        }
    }

    #[test]
    fn enqueue_survives_reopen() {
        let storage = InMemoryStorage::new();
        let queue = open(&storage, RetryPolicy::default());
        queue.enqueue(OperationType::Add, json!({"id": "A"})).unwrap();
        queue.enqueue(OperationType::Delete, json!({"id": "B"})).unwrap();
        drop(queue);

        let reopened = open(&storage, RetryPolicy::default());
        let pending = reopened.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].op_type, OperationType::Add);
        assert_eq!(pending[1].op_type, OperationType::Delete);
    }

    #[test]
    fn empty_document_is_empty_queue() {
        let storage = InMemoryStorage::with_data(b"  \n".to_vec());
        let queue = open(&storage, RetryPolicy::default());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn malformed_document_is_corruption() {
        let storage = InMemoryStorage::with_data(b"{not json".to_vec());
        let result = PendingQueue::open(storage, RetryPolicy::default());
        assert!(matches!(
            result,
            Err(SyncError::Storage(StorageError::Corrupted(_)))
        ));
    }

    #[test]
    fn clear_empties_storage() {
        let storage = InMemoryStorage::new();
        let queue = open(&storage, RetryPolicy::default());
        queue.enqueue(OperationType::Add, json!({"id": "A"})).unwrap();
        queue.clear().unwrap();
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn drain_replays_in_order() {
        let storage = InMemoryStorage::new();
        let queue = open(&storage, RetryPolicy::default());
        let remote = InMemoryRemote::new();
        for id in ["A", "B", "C"] {
            queue.enqueue(OperationType::Add, json!({"id": id})).unwrap();
        }

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.replayed, 3);
        assert!(report.is_clean());
        assert!(queue.is_empty().unwrap());
        let remote_ids: Vec<_> = remote.records().iter().map(|r| r["id"].clone()).collect();
        assert_eq!(remote_ids, vec![json!("A"), json!("B"), json!("C")]);
    }

    #[tokio::test]
    async fn drain_on_empty_queue_writes_nothing() {
        let queue = open(&InMemoryStorage::new(), RetryPolicy::default());
        let remote = InMemoryRemote::new();

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report, DrainReport::default());
        assert_eq!(remote.write_count(), 0);
    }

    #[tokio::test]
    async fn partial_failure_keeps_failed_operation() {
        let storage = InMemoryStorage::new();
        let queue = open(&storage, RetryPolicy::default());
        let remote = InMemoryRemote::new();
        remote.fail_writes_for("B");
        for id in ["A", "B", "C"] {
            queue.enqueue(OperationType::Add, json!({"id": id})).unwrap();
        }

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.replayed, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(ids(&queue), vec!["B"]);
        assert_eq!(queue.pending().unwrap()[0].attempts, 1);
    }

    #[tokio::test]
    async fn offline_drain_preserves_order() {
        let storage = InMemoryStorage::new();
        let queue = open(&storage, RetryPolicy::default());
        let remote = InMemoryRemote::new();
        remote.set_connected(false);
        for id in ["A", "B", "C"] {
            queue.enqueue(OperationType::Update, json!({"id": id})).unwrap();
        }

        let report = queue.drain(&remote).await.unwrap();
        assert_eq!(report.failed, 3);
        assert_eq!(ids(&queue), vec!["A", "B", "C"]);

        remote.set_connected(true);
        let report = queue.drain(&remote).await.unwrap();
        assert_eq!(report.replayed, 3);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test]
    async fn backoff_defers_recent_failures() {
        let queue = open(&InMemoryStorage::new(), RetryPolicy::new(5));
        let remote = InMemoryRemote::new();
        remote.set_connected(false);
        queue.enqueue(OperationType::Add, json!({"id": "A"})).unwrap();

        queue.drain(&remote).await.unwrap();
        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.deferred, 1);
        assert_eq!(remote.write_count(), 1);
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn exhausted_operations_are_dead_lettered() {
        let retry = RetryPolicy::new(2).with_initial_delay(Duration::ZERO);
        let queue = open(&InMemoryStorage::new(), retry);
        let remote = InMemoryRemote::new();
        remote.fail_writes_for("A");
        queue.enqueue(OperationType::Add, json!({"id": "A"})).unwrap();
        queue.enqueue(OperationType::Add, json!({"id": "B"})).unwrap();

        let first = queue.drain(&remote).await.unwrap();
        assert_eq!(first.failed, 1);
        assert!(first.dead_lettered.is_empty());

        let second = queue.drain(&remote).await.unwrap();
        assert_eq!(second.dead_lettered.len(), 1);
        assert_eq!(second.dead_lettered[0].record_id(), Some("A"));
        assert_eq!(second.dead_lettered[0].attempts, 2);
        assert!(queue.is_empty().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_drain_is_refused() {
        let queue = open(&InMemoryStorage::new(), RetryPolicy::default());
        let remote = SlowRemote(InMemoryRemote::new());
        queue.enqueue(OperationType::Add, json!({"id": "A"})).unwrap();

        let (first, second) = tokio::join!(queue.drain(&remote), async {
            tokio::task::yield_now().await;
            assert!(queue.is_draining());
            assert!(matches!(queue.clear(), Err(SyncError::DrainInProgress)));
            queue.drain(&remote).await
        });

        assert_eq!(first.unwrap().replayed, 1);
        assert!(matches!(second, Err(SyncError::DrainInProgress)));
        assert!(!queue.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn operations_enqueued_during_drain_are_kept() {
        let queue = open(&InMemoryStorage::new(), RetryPolicy::default());
        let remote = SlowRemote(InMemoryRemote::new());
        queue.enqueue(OperationType::Add, json!({"id": "A"})).unwrap();

        let (report, _) = tokio::join!(queue.drain(&remote), async {
            tokio::task::yield_now().await;
            queue.enqueue(OperationType::Add, json!({"id": "B"})).unwrap();
        });

        let report = report.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(ids(&queue), vec!["B"]);
    }
}
