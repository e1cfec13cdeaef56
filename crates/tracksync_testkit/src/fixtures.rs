//! Test fixtures for records and queue storage.
//!
//! Provides convenience functions for building shipments, their raw remote
//! form, and file-backed queue storage that cleans up after itself.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use tracksync_protocol::{Shipment, ShipmentStatus};
use tracksync_storage::FileStorage;

/// Parses an RFC 3339 timestamp, panicking on malformed input.
pub fn ts(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .expect("Invalid test timestamp")
        .with_timezone(&Utc)
}

/// Creates a pending shipment to "Lagos" created on 2024-01-01 and updated at `updated_at`.
pub fn shipment(id: &str, updated_at: &str) -> Shipment {
    Shipment::new(id, vec!["box".to_string()], "Lagos", ts("2024-01-01T00:00:00Z"))
        .with_updated_at(ts(updated_at))
}

/// Creates a shipment with the given status.
pub fn shipment_with_status(id: &str, updated_at: &str, status: ShipmentStatus) -> Shipment {
    shipment(id, updated_at).with_status(status)
}

/// Renders a shipment as the raw JSON a remote store would return.
pub fn remote_json(shipment: &Shipment) -> Value {
    serde_json::to_value(shipment).expect("Shipment serializes")
}

/// Builds a raw remote record directly from its parts.
pub fn remote_record(id: &str, updated_at: &str, status: &str) -> Value {
    json!({
        "id": id,
        "items": ["box"],
        "destination": "Lagos",
        "created_at": "2024-01-01T00:00:00Z",
        "updated_at": updated_at,
        "status": status
    })
}

/// A queue file inside a temporary directory.
pub struct TempQueueFile {
    /// Path of the queue file.
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TempQueueFile {
    /// Creates a fresh temporary location for a queue file.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("pending_ops.json");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    /// Opens file storage at the queue path.
    pub fn open(&self) -> FileStorage {
        FileStorage::open(&self.path).expect("Failed to open queue storage")
    }
}

impl Default for TempQueueFile {
    fn default() -> Self {
        Self::new()
    }
}
