//! Last-writer-wins merge of a remote batch into local state.

use crate::conflict::Conflict;
use crate::record::Shipment;
use crate::validate::{validate_batch, Rejection};
use serde_json::Value;
use tracing::debug;

/// Result of merging a remote batch.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// True if every remote value passed validation.
    ///
    /// This is a data-quality signal; the merge proceeds either way.
    pub valid: bool,
    /// Local records with remote updates and additions applied.
    pub merged: Vec<Shipment>,
    /// Local records that were overwritten by newer remote copies.
    pub conflicts: Vec<Conflict>,
    /// Remote values dropped by validation.
    pub rejected: Vec<Rejection>,
}

impl MergeOutcome {
    /// Returns one human-readable note per conflict.
    pub fn conflict_notes(&self) -> Vec<String> {
        self.conflicts.iter().map(Conflict::note).collect()
    }
}

/// Merges validated remote records into a copy of `local`.
///
/// For each valid remote record, in batch order:
/// - no local record with the same id: the record is appended;
/// - the remote `updated_at` is strictly newer (millisecond resolution):
///   the local record is replaced and a [`Conflict`] is reported;
/// - otherwise the local record is kept. Local wins ties.
///
/// Local records absent from the batch are always kept.
pub fn merge(local: &[Shipment], remote_raw: &[Value]) -> MergeOutcome {
    let batch = validate_batch(remote_raw);
    for rejection in &batch.rejected {
        debug!(index = rejection.index, error = %rejection.error, "dropping invalid remote record");
    }

    let mut merged = local.to_vec();
    let mut conflicts = Vec::new();

    for remote in batch.valid {
        match merged.iter().position(|s| s.id == remote.id) {
            Some(index) => {
                if remote.is_newer_than(&merged[index]) {
                    conflicts.push(Conflict::between(&merged[index], &remote));
                    merged[index] = remote;
                }
            }
            None => merged.push(remote),
        }
    }

    MergeOutcome {
        valid: batch.rejected.is_empty(),
        merged,
        conflicts,
        rejected: batch.rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ShipmentStatus;
    use serde_json::json;

    fn remote(id: &str, updated_at: &str, status: &str) -> Value {
        json!({
            "id": id,
            "items": ["box"],
            "destination": "Lagos",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": updated_at,
            "status": status
        })
    }

    fn local(id: &str, updated_at: &str, status: &str) -> Shipment {
        crate::validate_record(&remote(id, updated_at, status)).unwrap()
    }

    #[test]
    fn newer_remote_replaces_local() {
        let l = vec![local("A", "2024-01-01T00:00:00Z", "pending")];
        let r = vec![remote("A", "2024-01-02T00:00:00Z", "shipped")];

        let outcome = merge(&l, &r);
        assert!(outcome.valid);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].status, ShipmentStatus::Shipped);
        assert_eq!(outcome.conflict_notes(), vec!["Updated shipment A"]);
    }

    #[test]
    fn local_wins_ties() {
        let l = vec![local("A", "2024-01-02T00:00:00Z", "pending")];
        let r = vec![remote("A", "2024-01-02T00:00:00Z", "shipped")];

        let outcome = merge(&l, &r);
        assert_eq!(outcome.merged, l);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn sub_millisecond_difference_is_a_tie() {
        let l = vec![local("A", "2024-01-02T00:00:00.100Z", "pending")];
        let r = vec![remote("A", "2024-01-02T00:00:00.100900Z", "shipped")];

        let outcome = merge(&l, &r);
        assert_eq!(outcome.merged, l);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn older_remote_is_ignored() {
        let l = vec![local("A", "2024-01-03T00:00:00Z", "delayed")];
        let r = vec![remote("A", "2024-01-02T00:00:00Z", "shipped")];

        let outcome = merge(&l, &r);
        assert_eq!(outcome.merged, l);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn additions_are_appended_in_remote_order() {
        let l = vec![local("A", "2024-01-01T00:00:00Z", "pending")];
        let r = vec![
            remote("C", "2024-01-01T00:00:00Z", "pending"),
            remote("B", "2024-01-01T00:00:00Z", "pending"),
        ];

        let outcome = merge(&l, &r);
        let ids: Vec<_> = outcome.merged.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "C", "B"]);
        assert!(outcome.conflicts.is_empty());
    }

    #[test]
    fn invalid_records_are_dropped_and_flagged() {
        let l = vec![local("A", "2024-01-01T00:00:00Z", "pending")];
        let r = vec![
            remote("A", "2024-01-05T00:00:00Z", "unknown"),
            remote("B", "2024-01-01T00:00:00Z", "pending"),
        ];

        let outcome = merge(&l, &r);
        assert!(!outcome.valid);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].index, 0);
        assert_eq!(outcome.merged[0], l[0]);
        assert_eq!(outcome.merged.len(), 2);
    }

    #[test]
    fn duplicate_remote_ids_apply_in_order() {
        let r = vec![
            remote("A", "2024-01-02T00:00:00Z", "shipped"),
            remote("A", "2024-01-03T00:00:00Z", "delayed"),
            remote("A", "2024-01-01T00:00:00Z", "pending"),
        ];

        let outcome = merge(&[], &r);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged[0].status, ShipmentStatus::Delayed);
        assert_eq!(outcome.conflicts.len(), 1);
    }

    #[test]
    fn empty_batch_is_valid() {
        let l = vec![local("A", "2024-01-01T00:00:00Z", "pending")];
        let outcome = merge(&l, &[]);
        assert!(outcome.valid);
        assert_eq!(outcome.merged, l);
    }
}
