//! The shipment record synchronized between local and remote stores.

use crate::error::ValidationError;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Names of the fields carried by a [`Shipment`], in wire order.
pub const FIELD_NAMES: [&str; 6] = [
    "id",
    "items",
    "destination",
    "created_at",
    "updated_at",
    "status",
];

/// Delivery status of a shipment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentStatus {
    /// Not yet dispatched.
    Pending,
    /// Dispatched to the destination.
    Shipped,
    /// Behind schedule.
    Delayed,
}

impl ShipmentStatus {
    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ShipmentStatus::Pending => "pending",
            ShipmentStatus::Shipped => "shipped",
            ShipmentStatus::Delayed => "delayed",
        }
    }
}

impl FromStr for ShipmentStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ShipmentStatus::Pending),
            "shipped" => Ok(ShipmentStatus::Shipped),
            "delayed" => Ok(ShipmentStatus::Delayed),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ShipmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A shipment record.
///
/// # Invariants
///
/// - `id` is non-empty
/// - `updated_at >= created_at`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    /// Unique identifier.
    pub id: String,
    /// Item descriptions carried by the shipment.
    pub items: Vec<String>,
    /// Delivery destination.
    pub destination: String,
    /// Creation time.
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Delivery status.
    pub status: ShipmentStatus,
}

impl Shipment {
    /// Creates a pending shipment created and updated at `now`.
    pub fn new(
        id: impl Into<String>,
        items: Vec<String>,
        destination: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            items,
            destination: destination.into(),
            created_at: now,
            updated_at: now,
            status: ShipmentStatus::Pending,
        }
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ShipmentStatus) -> Self {
        self.status = status;
        self
    }

    /// Sets the modification time.
    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Advances `updated_at` to `now`, never moving it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Returns true if this record was modified strictly later than `other`,
    /// compared at millisecond resolution.
    pub fn is_newer_than(&self, other: &Shipment) -> bool {
        self.updated_at.timestamp_millis() > other.updated_at.timestamp_millis()
    }

    /// Returns the JSON value of a named field.
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "id" => Value::from(self.id.clone()),
            "items" => Value::from(self.items.clone()),
            "destination" => Value::from(self.destination.clone()),
            "created_at" => Value::from(format_timestamp(&self.created_at)),
            "updated_at" => Value::from(format_timestamp(&self.updated_at)),
            "status" => Value::from(self.status.as_str()),
            _ => return None,
        };
        Some(value)
    }

    /// Returns the names of fields whose values differ from `other`.
    pub fn differing_fields(&self, other: &Shipment) -> Vec<&'static str> {
        FIELD_NAMES
            .iter()
            .copied()
            .filter(|name| self.field(name) != other.field(name))
            .collect()
    }
}

/// Formats a timestamp as RFC 3339 with a `Z` suffix.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an RFC 3339 timestamp that must be expressed in UTC (`Z` suffix)
/// with an uppercase `T` separating date and time.
pub(crate) fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if !text.ends_with('Z') || text.as_bytes().get(10) != Some(&b'T') {
        return None;
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

pub(crate) mod timestamp {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_timestamp(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid UTC timestamp: {text:?}")))
    }
}
