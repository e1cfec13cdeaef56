//! Pending operations awaiting replay against the remote store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Kind of local mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A record was created.
    Add,
    /// A record was modified.
    Update,
    /// A record was removed.
    Delete,
}

impl OperationType {
    /// Returns the wire name of the operation type.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Add => "add",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local mutation not yet acknowledged by the remote store.
///
/// Persisted as `{"type", "payload", "timestamp"}`; the retry bookkeeping
/// fields are optional on load. The payload is an opaque record snapshot
/// and is never modified by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    /// Kind of mutation.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Record snapshot to replay.
    pub payload: Value,
    /// When the operation was queued.
    #[serde(rename = "timestamp", with = "crate::record::timestamp")]
    pub enqueued_at: DateTime<Utc>,
    /// Number of failed replay attempts.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
    /// Time of the last failed replay attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl PendingOperation {
    /// Creates an operation queued at `now`.
    pub fn new(op_type: OperationType, payload: Value, now: DateTime<Utc>) -> Self {
        Self {
            op_type,
            payload,
            enqueued_at: now,
            attempts: 0,
            last_attempt_at: None,
        }
    }

    /// Returns the identifier of the record in the payload, if present.
    pub fn record_id(&self) -> Option<&str> {
        self.payload.get("id").and_then(Value::as_str)
    }

    /// Records a failed replay attempt at `now`.
    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_attempt_at = Some(now);
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}
