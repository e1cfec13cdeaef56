//! Property tests for the last-writer-wins merge.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracksync_protocol::{merge, validate_record, Shipment, ShipmentStatus};
use tracksync_testkit::{
    local_set_strategy, mixed_batch_strategy, remote_json, shipment, valid_batch_strategy,
};

fn as_batch(records: &[Shipment]) -> Vec<Value> {
    records.iter().map(remote_json).collect()
}

fn by_id(records: &[Shipment]) -> HashMap<&str, &Shipment> {
    records.iter().map(|s| (s.id.as_str(), s)).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn merge_is_idempotent(local in local_set_strategy(), remote in valid_batch_strategy()) {
        let once = merge(&local, &remote);
        let twice = merge(&once.merged, &remote);

        prop_assert_eq!(&twice.merged, &once.merged);
        prop_assert!(twice.conflicts.is_empty());
    }

    #[test]
    fn conflict_iff_remote_strictly_newer(
        local in local_set_strategy(),
        remote in local_set_strategy(),
    ) {
        let outcome = merge(&local, &as_batch(&remote));
        let local_by_id = by_id(&local);
        let conflicted: Vec<&str> = outcome.conflicts.iter().map(|c| c.id.as_str()).collect();

        for r in &remote {
            if let Some(l) = local_by_id.get(r.id.as_str()) {
                let newer = r.updated_at.timestamp_millis() > l.updated_at.timestamp_millis();
                prop_assert_eq!(conflicted.contains(&r.id.as_str()), newer);

                let kept = outcome.merged.iter().find(|s| s.id == r.id).unwrap();
                if newer {
                    prop_assert_eq!(kept, r);
                } else {
                    prop_assert_eq!(kept, *l);
                }
            }
        }
    }

    #[test]
    fn remote_additions_always_appear(
        local in local_set_strategy(),
        remote in local_set_strategy(),
    ) {
        let outcome = merge(&local, &as_batch(&remote));
        let local_by_id = by_id(&local);

        for r in remote.iter().filter(|r| !local_by_id.contains_key(r.id.as_str())) {
            prop_assert!(outcome.merged.contains(r));
        }
    }

    #[test]
    fn local_records_are_never_dropped(local in local_set_strategy(), remote in mixed_batch_strategy()) {
        let outcome = merge(&local, &remote);

        for l in &local {
            prop_assert!(outcome.merged.iter().any(|s| s.id == l.id));
        }
    }

    #[test]
    fn only_validated_records_are_merged(local in local_set_strategy(), remote in mixed_batch_strategy()) {
        let outcome = merge(&local, &remote);
        let validated: Vec<Shipment> = remote.iter().filter_map(|v| validate_record(v).ok()).collect();

        prop_assert_eq!(outcome.valid, validated.len() == remote.len());
        prop_assert_eq!(outcome.rejected.len(), remote.len() - validated.len());

        for s in &outcome.merged {
            prop_assert!(local.contains(s) || validated.contains(s));
        }
    }
}

#[test]
fn newer_remote_status_wins() {
    let local = vec![shipment("A", "2024-01-01T00:00:00Z")];
    let remote = vec![json!({
        "id": "A",
        "items": ["box"],
        "destination": "Lagos",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": "2024-01-02T00:00:00Z",
        "status": "shipped"
    })];

    let outcome = merge(&local, &remote);

    assert!(outcome.valid);
    assert_eq!(outcome.merged.len(), 1);
    assert_eq!(outcome.merged[0].status, ShipmentStatus::Shipped);
    assert_eq!(outcome.conflict_notes(), vec!["Updated shipment A"]);
}
