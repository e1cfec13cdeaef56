//! # TrackSync Engine
//!
//! Offline-first synchronization of shipment records with a remote store.
//!
//! This crate provides:
//! - Sync orchestrator state machine (local write → remote write → queue)
//! - Durable pending-operation queue with at-least-once replay
//! - Retry policy with optional backoff and dead-lettering
//! - Read-through query cache with TTL and request throttling
//! - Remote store, local store and conflict resolver abstractions
//!
//! ## Architecture
//!
//! Every mutation is applied locally first and then written to the remote
//! store. A failed remote write is queued and replayed later by a drain.
//! Merge cycles fetch the remote record set, validate it and merge it into
//! local state last-writer-wins; overwritten records are surfaced to a
//! [`ConflictResolver`] whose decisions come back as ordinary updates.
//!
//! ## Key Invariants
//!
//! - Local mutations never wait on the remote store
//! - Queued operations are removed only after a confirmed replay
//! - Drains and merge cycles are each non-reentrant
//! - A merge never interleaves with a local mutation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod error;
mod in_flight;
mod local;
mod queue;
mod remote;
mod resolver;
mod state;

pub use cache::{CacheKey, CacheStats, QueryCache};
pub use config::{CacheConfig, RetryPolicy, SyncConfig, DEFAULT_CACHE_THROTTLE, DEFAULT_CACHE_TTL};
pub use error::{SyncError, SyncResult};
pub use local::{LocalStore, MemoryLocalStore, Mutation};
pub use queue::{DrainReport, PendingQueue};
pub use remote::{InMemoryRemote, RecordQuery, RemoteStore};
pub use resolver::{ConflictResolver, DeferResolver, KeepLocalResolver};
pub use state::{MergeCycleResult, MutationOutcome, SyncOrchestrator, SyncState, SyncStats};
