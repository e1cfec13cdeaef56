//! Property-based test generators using proptest.
//!
//! Provides strategies for generating shipments and remote batches.
//! Identifiers are drawn from a small alphabet so local and remote sets
//! overlap often enough to exercise conflict handling.

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;
use tracksync_protocol::{Shipment, ShipmentStatus};

/// First millisecond of 2024.
const EPOCH_2024_MS: i64 = 1_704_067_200_000;
/// Range of generated timestamps (ten days).
const SPAN_MS: i64 = 10 * 24 * 60 * 60 * 1000;

/// Strategy for timestamps at millisecond resolution within a ten day window.
pub fn timestamp_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0..SPAN_MS).prop_map(|offset| {
        Utc.timestamp_millis_opt(EPOCH_2024_MS + offset)
            .single()
            .expect("Timestamp in range")
    })
}

/// Strategy for record identifiers from a small pool.
pub fn id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-F]").expect("Invalid regex")
}

/// Strategy for shipment statuses.
pub fn status_strategy() -> impl Strategy<Value = ShipmentStatus> {
    prop_oneof![
        Just(ShipmentStatus::Pending),
        Just(ShipmentStatus::Shipped),
        Just(ShipmentStatus::Delayed),
    ]
}

/// Strategy for valid shipments.
pub fn shipment_strategy() -> impl Strategy<Value = Shipment> {
    (
        id_strategy(),
        prop::collection::vec("[a-z]{1,8}", 0..4),
        "[A-Z][a-z]{2,10}",
        timestamp_strategy(),
        0..SPAN_MS,
        status_strategy(),
    )
        .prop_map(|(id, items, destination, created_at, age_ms, status)| {
            let updated_at = created_at + chrono::Duration::milliseconds(age_ms);
            Shipment::new(id, items, destination, created_at)
                .with_updated_at(updated_at)
                .with_status(status)
        })
}

/// Strategy for a local record set with unique identifiers.
pub fn local_set_strategy() -> impl Strategy<Value = Vec<Shipment>> {
    prop::collection::vec(shipment_strategy(), 0..6).prop_map(|shipments| {
        let mut by_id = BTreeMap::new();
        for shipment in shipments {
            by_id.entry(shipment.id.clone()).or_insert(shipment);
        }
        by_id.into_values().collect()
    })
}

/// Strategy for raw remote values that always fail validation.
pub fn malformed_record_strategy() -> impl Strategy<Value = Value> {
    (shipment_strategy(), 0..6usize).prop_map(|(shipment, corruption)| {
        let mut value = serde_json::to_value(&shipment).expect("Shipment serializes");
        let object = value.as_object_mut().expect("Shipment is an object");
        match corruption {
            0 => {
                object.insert("id".into(), Value::from(""));
            }
            1 => {
                object.insert("items".into(), Value::from(vec![1, 2]));
            }
            2 => {
                object.remove("destination");
            }
            3 => {
                object.insert("created_at".into(), Value::from("not a date"));
            }
            4 => {
                object.insert("status".into(), Value::from("lost"));
            }
            _ => return Value::from(42),
        }
        value
    })
}

/// Strategy for a remote batch of valid records only.
pub fn valid_batch_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        shipment_strategy().prop_map(|s| serde_json::to_value(&s).expect("Shipment serializes")),
        0..8,
    )
}

/// Strategy for a remote batch mixing valid and malformed values.
pub fn mixed_batch_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(
        prop_oneof![
            3 => shipment_strategy()
                .prop_map(|s| serde_json::to_value(&s).expect("Shipment serializes")),
            1 => malformed_record_strategy(),
        ],
        0..8,
    )
}
