//! Sync orchestrator state machine.

use crate::cache::QueryCache;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::in_flight::{InFlight, Occupied};
use crate::local::{LocalStore, Mutation};
use crate::queue::{DrainReport, PendingQueue};
use crate::remote::{RecordQuery, RemoteStore};
use crate::resolver::{ConflictResolver, DeferResolver};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use tracksync_protocol::{merge, validate_record, Conflict, ConflictResolution, Shipment};
use tracksync_storage::QueueStorage;

/// The current state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing in flight and nothing queued.
    Idle,
    /// Applying a mutation to the local record set.
    WritingLocal,
    /// Sending a mutation to the remote store.
    WritingRemote,
    /// Operations are waiting in the pending queue.
    Queued,
    /// Replaying the pending queue.
    Draining,
    /// Fetching and merging remote records.
    Merging,
}

impl SyncState {
    /// Returns true while a remote call or local write is in flight.
    pub fn is_active(&self) -> bool {
        !matches!(self, SyncState::Idle | SyncState::Queued)
    }
}

/// Counters describing the orchestrator's activity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Mutations applied locally.
    pub mutations: u64,
    /// Mutations written to the remote store on the first attempt.
    pub synced: u64,
    /// Mutations handed to the pending queue.
    pub queued: u64,
    /// Queued operations replayed successfully.
    pub replayed: u64,
    /// Queued operations dropped after exhausting their retries.
    pub dead_lettered: u64,
    /// Completed merge cycles.
    pub merge_cycles: u64,
    /// Conflicts passed to the resolver.
    pub conflicts_surfaced: u64,
    /// Resolutions written back as updates.
    pub resolutions_applied: u64,
    /// Resolutions that could not be applied.
    pub resolutions_failed: u64,
    /// Completion time of the last merge cycle.
    pub last_merge: Option<DateTime<Utc>>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Result of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The remote store accepted the write.
    Synced,
    /// The remote write failed and the operation was queued.
    Queued,
}

/// Result of a merge cycle.
#[derive(Debug, Clone)]
pub struct MergeCycleResult {
    /// True if every fetched record passed validation.
    pub valid: bool,
    /// Local records overwritten by newer remote copies.
    pub conflicts: Vec<Conflict>,
    /// Number of fetched records dropped by validation.
    pub rejected: usize,
    /// Number of remote records added locally.
    pub added: usize,
    /// Size of the local record set after the merge.
    pub total_records: usize,
    /// Resolutions returned by the resolver and written back.
    pub resolutions_applied: usize,
    /// Resolutions that named an unknown or read-only field, or whose
    /// update failed locally.
    pub resolutions_failed: usize,
    /// Duration of the cycle.
    pub duration: Duration,
}

impl MergeCycleResult {
    /// Returns one human-readable note per conflict.
    pub fn conflict_notes(&self) -> Vec<String> {
        self.conflicts.iter().map(Conflict::note).collect()
    }
}

/// Coordinates local writes, the pending queue, merges and cached reads.
///
/// The local record set sits behind a mutex: a merge reads, merges and
/// writes it back under one lock, so it cannot interleave with a local
/// mutation. The lock is never held across a remote call.
///
/// The drain and merge loops may overlap, so each activity keeps its own
/// marker and [`state`](Self::state) is derived from them.
pub struct SyncOrchestrator<R: RemoteStore, L: LocalStore, S: QueueStorage> {
    config: SyncConfig,
    remote: Arc<R>,
    local: Mutex<L>,
    queue: PendingQueue<S>,
    cache: QueryCache<Vec<Shipment>>,
    resolver: Arc<dyn ConflictResolver>,
    stats: RwLock<SyncStats>,
    merging: AtomicBool,
    writing_local: AtomicUsize,
    writing_remote: AtomicUsize,
    queued: AtomicBool,
}

impl<R: RemoteStore, L: LocalStore, S: QueueStorage> SyncOrchestrator<R, L, S> {
    /// Creates an orchestrator that only reports conflicts.
    ///
    /// Fails if the stored queue document cannot be read.
    pub fn new(config: SyncConfig, remote: Arc<R>, local: L, storage: S) -> SyncResult<Self> {
        let queue = PendingQueue::open(storage, config.retry.clone())?;
        let queued = !queue.is_empty()?;

        Ok(Self {
            cache: QueryCache::new(config.cache.clone()),
            config,
            remote,
            local: Mutex::new(local),
            queue,
            resolver: Arc::new(DeferResolver),
            stats: RwLock::new(SyncStats::default()),
            merging: AtomicBool::new(false),
            writing_local: AtomicUsize::new(0),
            writing_remote: AtomicUsize::new(0),
            queued: AtomicBool::new(queued),
        })
    }

    /// Sets the conflict resolver.
    pub fn with_resolver(mut self, resolver: Arc<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Gets the current state.
    ///
    /// When activities overlap, a drain wins over a merge, which wins over
    /// an in-flight mutation. `Queued` means a mutation was queued since
    /// the last drain started; a drain that leaves failed operations behind
    /// returns to `Idle` and they are retried on the next pass.
    pub fn state(&self) -> SyncState {
        if self.queue.is_draining() {
            SyncState::Draining
        } else if self.merging.load(Ordering::Acquire) {
            SyncState::Merging
        } else if self.writing_remote.load(Ordering::Acquire) > 0 {
            SyncState::WritingRemote
        } else if self.writing_local.load(Ordering::Acquire) > 0 {
            SyncState::WritingLocal
        } else if self.queued.load(Ordering::Acquire) {
            SyncState::Queued
        } else {
            SyncState::Idle
        }
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Returns the remote store.
    pub fn remote(&self) -> &Arc<R> {
        &self.remote
    }

    /// Returns the pending queue.
    pub fn queue(&self) -> &PendingQueue<S> {
        &self.queue
    }

    /// Returns the query cache.
    pub fn cache(&self) -> &QueryCache<Vec<Shipment>> {
        &self.cache
    }

    /// Runs `f` with exclusive access to the local store.
    pub fn with_local<T>(&self, f: impl FnOnce(&mut L) -> T) -> T {
        f(&mut self.local.lock())
    }

    /// Returns a snapshot of the local record set.
    pub fn records(&self) -> Vec<Shipment> {
        self.local.lock().records()
    }

    fn record_error(&self, error: &SyncError) {
        self.stats.write().last_error = Some(error.to_string());
    }

    /// Applies a mutation locally, then writes it to the remote store.
    ///
    /// A local failure is returned and nothing is queued. A remote failure
    /// queues the operation for a later drain and is not an error.
    pub async fn mutate(&self, mutation: Mutation) -> SyncResult<MutationOutcome> {
        let writing = Occupied::enter(&self.writing_local);
        let applied = self.local.lock().apply(&mutation);
        drop(writing);
        if let Err(e) = applied {
            warn!(id = mutation.id(), error = %e, "local write failed");
            self.record_error(&e);
            return Err(e);
        }
        self.cache.clear();
        self.stats.write().mutations += 1;

        let op_type = mutation.op_type();
        let payload = mutation.payload()?;

        let _writing = Occupied::enter(&self.writing_remote);
        match self.remote.write(op_type, &payload).await {
            Ok(()) => {
                debug!(op = %op_type, id = mutation.id(), "mutation synced");
                self.stats.write().synced += 1;
                Ok(MutationOutcome::Synced)
            }
            Err(e) => {
                warn!(op = %op_type, id = mutation.id(), error = %e, "remote write failed, queueing");
                self.record_error(&e);
                self.queue.enqueue(op_type, payload)?;
                self.queued.store(true, Ordering::Release);
                self.stats.write().queued += 1;
                Ok(MutationOutcome::Queued)
            }
        }
    }

    /// Replays the pending queue.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        if self.queue.is_draining() {
            return Err(SyncError::DrainInProgress);
        }

        // Operations queued from here on keep the state at `Queued`.
        let was_queued = self.queued.swap(false, Ordering::AcqRel);
        let result = self.queue.drain(self.remote.as_ref()).await;
        match &result {
            Ok(report) => {
                debug!(
                    replayed = report.replayed,
                    remaining = report.remaining,
                    "drain finished"
                );
                let mut stats = self.stats.write();
                stats.replayed += report.replayed as u64;
                stats.dead_lettered += report.dead_lettered.len() as u64;
            }
            Err(e) => {
                if was_queued {
                    self.queued.store(true, Ordering::Release);
                }
                if !matches!(e, SyncError::DrainInProgress) {
                    self.record_error(e);
                }
            }
        }
        result
    }

    /// Handles a restored connection by draining the pending queue.
    pub async fn reconnect(&self) -> SyncResult<DrainReport> {
        info!("connection restored, draining pending queue");
        self.drain().await
    }

    /// Fetches all remote records and merges them into the local set.
    ///
    /// Conflicts go to the resolver once the local lock is released, and
    /// each returned resolution is applied as an update. A resolution that
    /// cannot be applied is logged and counted; it does not fail the cycle.
    pub async fn merge_cycle(&self) -> SyncResult<MergeCycleResult> {
        let _merging = InFlight::acquire(&self.merging).ok_or(SyncError::MergeInProgress)?;

        let result = self.run_merge().await;
        match &result {
            Ok(cycle) => {
                info!(
                    conflicts = cycle.conflicts.len(),
                    added = cycle.added,
                    rejected = cycle.rejected,
                    "merge cycle completed in {:?}",
                    cycle.duration
                );
            }
            Err(e) => {
                warn!(error = %e, "merge cycle failed");
                self.record_error(e);
            }
        }
        result
    }

    async fn run_merge(&self) -> SyncResult<MergeCycleResult> {
        let started = Instant::now();
        let raw = self.remote.fetch(&RecordQuery::all()).await?;

        let (outcome, before) = {
            let mut local = self.local.lock();
            let current = local.records();
            let outcome = merge(&current, &raw);
            local.replace_all(outcome.merged.clone())?;
            (outcome, current.len())
        };

        if !outcome.valid {
            warn!(
                rejected = outcome.rejected.len(),
                "remote batch contained invalid records"
            );
        }
        for note in outcome.conflict_notes() {
            debug!("{note}");
        }

        {
            let mut stats = self.stats.write();
            stats.merge_cycles += 1;
            stats.conflicts_surfaced += outcome.conflicts.len() as u64;
            stats.last_merge = Some(Utc::now());
        }
        if !outcome.conflicts.is_empty() {
            // The merged data may differ from what the cache holds.
            self.cache.clear();
        }

        let resolutions = if outcome.conflicts.is_empty() {
            Vec::new()
        } else {
            self.resolver.resolve(&outcome.conflicts).await
        };

        let (mut applied, mut failed) = (0, 0);
        for resolution in &resolutions {
            match self.apply_resolution(resolution).await {
                Ok(true) => applied += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %resolution.id, error = %e, "resolution not applied");
                    self.record_error(&e);
                    failed += 1;
                }
            }
        }
        {
            let mut stats = self.stats.write();
            stats.resolutions_applied += applied as u64;
            stats.resolutions_failed += failed as u64;
        }

        Ok(MergeCycleResult {
            valid: outcome.valid,
            rejected: outcome.rejected.len(),
            added: outcome.merged.len().saturating_sub(before),
            total_records: outcome.merged.len(),
            conflicts: outcome.conflicts,
            resolutions_applied: applied,
            resolutions_failed: failed,
            duration: started.elapsed(),
        })
    }

    /// Writes one resolution back as an update. Returns false if the record
    /// no longer exists locally.
    async fn apply_resolution(&self, resolution: &ConflictResolution) -> SyncResult<bool> {
        let current = self.local.lock().get(&resolution.id);
        let Some(current) = current else {
            warn!(id = %resolution.id, "resolution for unknown record ignored");
            return Ok(false);
        };
        let resolved = resolution.apply(&current, Utc::now())?;
        self.mutate(Mutation::Update(resolved)).await?;
        Ok(true)
    }

    /// Reads validated records from the remote store through the cache.
    ///
    /// Records come back newest `created_at` first. Invalid records are
    /// dropped.
    pub async fn query(&self, query: &RecordQuery) -> SyncResult<Vec<Shipment>> {
        let key = query.cache_key();
        self.cache
            .cached_query(&key, || async {
                let raw = self.remote.fetch(query).await?;
                let mut records: Vec<Shipment> =
                    raw.iter().filter_map(|v| validate_record(v).ok()).collect();
                records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                Ok::<_, SyncError>(records)
            })
            .await
    }

    /// Runs the periodic drain and merge loops until `shutdown` turns true
    /// or its sender is dropped.
    ///
    /// The two loops run concurrently; both tick once immediately.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) {
        info!(
            drain_interval = ?self.config.drain_interval,
            merge_interval = ?self.config.merge_interval,
            "sync orchestrator started"
        );
        tokio::join!(
            self.drain_loop(shutdown.clone()),
            self.merge_loop(shutdown)
        );
        info!("sync orchestrator stopped");
    }

    async fn drain_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = ticker(self.config.drain_interval);
        while next_tick(&mut ticker, &mut shutdown).await {
            if matches!(self.queue.is_empty(), Ok(true)) {
                continue;
            }
            match self.drain().await {
                Ok(report) if !report.is_clean() => {
                    debug!(remaining = report.remaining, "pending operations left after drain");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "periodic drain skipped"),
            }
        }
    }

    async fn merge_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = ticker(self.config.merge_interval);
        while next_tick(&mut ticker, &mut shutdown).await {
            // Failures are logged and recorded by merge_cycle.
            let _ = self.merge_cycle().await;
        }
    }
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Waits for the next tick. Returns false once shutdown is signalled.
async fn next_tick(ticker: &mut Interval, shutdown: &mut watch::Receiver<bool>) -> bool {
    loop {
        if *shutdown.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = ticker.tick() => return true,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalStore;
    use crate::remote::InMemoryRemote;
    use async_trait::async_trait;
    use serde_json::Value;
    use tracksync_protocol::OperationType;
    use tracksync_storage::InMemoryStorage;
    use tracksync_testkit::{remote_record, shipment};

    /// Delays every write by one second; fetches are immediate.
    struct SlowWrites(InMemoryRemote);

    #[async_trait]
    impl RemoteStore for SlowWrites {
        async fn write(&self, op_type: OperationType, payload: &Value) -> SyncResult<()> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            self.0.write(op_type, payload).await
        }

        async fn fetch(&self, query: &RecordQuery) -> SyncResult<Vec<Value>> {
            self.0.fetch(query).await
        }
    }

    type Orchestrator = SyncOrchestrator<InMemoryRemote, MemoryLocalStore, InMemoryStorage>;

    fn orchestrator(remote: InMemoryRemote) -> Orchestrator {
        SyncOrchestrator::new(
            SyncConfig::default(),
            Arc::new(remote),
            MemoryLocalStore::new(),
            InMemoryStorage::new(),
        )
        .unwrap()
    }

    #[test]
    fn active_states() {
        assert!(!SyncState::Idle.is_active());
        assert!(!SyncState::Queued.is_active());
        assert!(SyncState::Draining.is_active());
        assert!(SyncState::Merging.is_active());
    }

    #[tokio::test]
    async fn online_mutation_is_synced() {
        let sync = orchestrator(InMemoryRemote::new());

        let outcome = sync
            .mutate(Mutation::Add(shipment("A", "2024-01-01T00:00:00Z")))
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Synced);
        assert_eq!(sync.state(), SyncState::Idle);
        assert!(sync.remote().record("A").is_some());
        assert_eq!(sync.records().len(), 1);
        assert_eq!(sync.stats().synced, 1);
    }

    #[tokio::test]
    async fn offline_mutation_is_queued() {
        let remote = InMemoryRemote::new();
        remote.set_connected(false);
        let sync = orchestrator(remote);

        let outcome = sync
            .mutate(Mutation::Add(shipment("A", "2024-01-01T00:00:00Z")))
            .await
            .unwrap();

        assert_eq!(outcome, MutationOutcome::Queued);
        assert_eq!(sync.state(), SyncState::Queued);
        assert_eq!(sync.records().len(), 1);
        assert_eq!(sync.queue().len().unwrap(), 1);
        assert!(sync.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn local_failure_is_not_queued() {
        let remote = InMemoryRemote::new();
        remote.set_connected(false);
        let sync = orchestrator(remote);
        sync.with_local(|local| local.set_fail_writes(true));

        let result = sync
            .mutate(Mutation::Add(shipment("A", "2024-01-01T00:00:00Z")))
            .await;

        assert!(matches!(result, Err(SyncError::LocalWrite(_))));
        assert!(sync.queue().is_empty().unwrap());
        assert_eq!(sync.remote().write_count(), 0);
    }

    #[tokio::test]
    async fn merge_cycle_reports_conflicts() {
        let remote = InMemoryRemote::with_records(vec![remote_record(
            "A",
            "2024-01-02T00:00:00Z",
            "shipped",
        )]);
        let sync = orchestrator(remote);
        sync.with_local(|local| {
            local
                .apply(&Mutation::Add(shipment("A", "2024-01-01T00:00:00Z")))
                .unwrap()
        });

        let cycle = sync.merge_cycle().await.unwrap();

        assert!(cycle.valid);
        assert_eq!(cycle.conflict_notes(), vec!["Updated shipment A"]);
        assert_eq!(cycle.resolutions_applied, 0);
        assert_eq!(sync.records()[0].status.as_str(), "shipped");
        assert_eq!(sync.state(), SyncState::Idle);
        assert_eq!(sync.stats().merge_cycles, 1);
    }

    #[tokio::test]
    async fn drain_with_failures_returns_to_idle() {
        let remote = InMemoryRemote::new();
        remote.fail_writes_for("A");
        let sync = orchestrator(remote);

        sync.mutate(Mutation::Add(shipment("A", "2024-01-01T00:00:00Z")))
            .await
            .unwrap();
        assert_eq!(sync.state(), SyncState::Queued);

        let report = sync.drain().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.remaining, 1);
        assert_eq!(sync.state(), SyncState::Idle);
        assert_eq!(sync.queue().len().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn merge_during_drain_keeps_draining_state() {
        let inner = InMemoryRemote::with_records(vec![remote_record(
            "B",
            "2024-01-01T00:00:00Z",
            "pending",
        )]);
        inner.set_connected(false);
        let sync = SyncOrchestrator::new(
            SyncConfig::default(),
            Arc::new(SlowWrites(inner)),
            MemoryLocalStore::new(),
            InMemoryStorage::new(),
        )
        .unwrap();
        sync.mutate(Mutation::Add(shipment("A", "2024-01-01T00:00:00Z")))
            .await
            .unwrap();
        sync.remote().0.set_connected(true);

        let (drained, (merged, state_after_merge)) = tokio::join!(sync.drain(), async {
            let merged = sync.merge_cycle().await;
            (merged, sync.state())
        });

        assert_eq!(merged.unwrap().added, 1);
        assert_eq!(state_after_merge, SyncState::Draining);
        assert_eq!(drained.unwrap().replayed, 1);
        assert_eq!(sync.state(), SyncState::Idle);
        assert!(sync.remote().0.record("A").is_some());
        assert_eq!(sync.records().len(), 2);
    }
}
