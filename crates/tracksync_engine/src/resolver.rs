//! Conflict resolution hooks.

use async_trait::async_trait;
use tracksync_protocol::{Conflict, ConflictResolution};

/// Decides how to settle conflicts reported by a merge cycle.
///
/// Each returned resolution is written back as an ordinary update, so it
/// goes through the same local-then-remote path (and queue) as any other
/// mutation. Conflicts themselves are never persisted.
#[async_trait]
pub trait ConflictResolver: Send + Sync {
    /// Returns the resolutions to apply for `conflicts`.
    async fn resolve(&self, conflicts: &[Conflict]) -> Vec<ConflictResolution>;
}

/// Accepts every merge result as-is; conflicts are only reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferResolver;

#[async_trait]
impl ConflictResolver for DeferResolver {
    async fn resolve(&self, _conflicts: &[Conflict]) -> Vec<ConflictResolution> {
        Vec::new()
    }
}

/// Reinstates the local value of every editable conflicting field.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepLocalResolver;

#[async_trait]
impl ConflictResolver for KeepLocalResolver {
    async fn resolve(&self, conflicts: &[Conflict]) -> Vec<ConflictResolution> {
        conflicts
            .iter()
            .map(ConflictResolution::keep_local)
            .filter(|resolution| !resolution.is_empty())
            .collect()
    }
}
