//! Conflict reporting and manual resolution.

use crate::error::{ResolutionError, ResolutionResult};
use crate::record::{Shipment, ShipmentStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// One field on which the local and remote copies of a record disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldConflict {
    /// Field name.
    pub field: String,
    /// Value held locally before the merge.
    pub local: Value,
    /// Value received from the remote store.
    pub remote: Value,
}

/// A local record that was overwritten by a newer remote copy.
///
/// Conflicts only live for the merge cycle that produced them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    /// Record identifier.
    pub id: String,
    /// Fields that differ between the two copies.
    pub changes: Vec<FieldConflict>,
}

impl Conflict {
    /// Builds the conflict between a local record and the remote copy replacing it.
    pub fn between(local: &Shipment, remote: &Shipment) -> Self {
        let changes = local
            .differing_fields(remote)
            .into_iter()
            .map(|field| FieldConflict {
                field: field.to_string(),
                local: local.field(field).unwrap_or(Value::Null),
                remote: remote.field(field).unwrap_or(Value::Null),
            })
            .collect();

        Self {
            id: local.id.clone(),
            changes,
        }
    }

    /// Returns the human-readable note for this conflict.
    pub fn note(&self) -> String {
        self.to_string()
    }

    /// Returns the change recorded for `field`, if any.
    pub fn change(&self, field: &str) -> Option<&FieldConflict> {
        self.changes.iter().find(|c| c.field == field)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Updated shipment {}", self.id)
    }
}

/// A decision on a conflict: the value to keep for each chosen field.
///
/// Resolutions are applied as new local mutations, so the resolved record
/// gets a fresh `updated_at` and propagates like any other edit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConflictResolution {
    /// Record identifier.
    pub id: String,
    /// Field name to chosen value.
    pub fields: BTreeMap<String, Value>,
}

impl ConflictResolution {
    /// Creates an empty resolution for a record.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Chooses a value for a field.
    pub fn choose(mut self, field: impl Into<String>, value: Value) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Restores the local value of every conflicting editable field.
    pub fn keep_local(conflict: &Conflict) -> Self {
        let mut resolution = Self::new(conflict.id.clone());
        for change in conflict.changes.iter().filter(|c| is_editable(&c.field)) {
            resolution
                .fields
                .insert(change.field.clone(), change.local.clone());
        }
        resolution
    }

    /// Returns true if no field is chosen.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Applies the chosen values to `record`, stamping it with `now`.
    pub fn apply(&self, record: &Shipment, now: DateTime<Utc>) -> ResolutionResult<Shipment> {
        if record.id != self.id {
            return Err(ResolutionError::IdMismatch {
                resolution: self.id.clone(),
                record: record.id.clone(),
            });
        }

        let mut resolved = record.clone();
        for (field, value) in &self.fields {
            match field.as_str() {
                "items" => {
                    resolved.items = serde_json::from_value(value.clone())
                        .map_err(|e| invalid(field, e.to_string()))?;
                }
                "destination" => {
                    resolved.destination = value
                        .as_str()
                        .ok_or_else(|| invalid(field, "expected a string".into()))?
                        .to_string();
                }
                "status" => {
                    let text = value
                        .as_str()
                        .ok_or_else(|| invalid(field, "expected a string".into()))?;
                    resolved.status = text
                        .parse::<ShipmentStatus>()
                        .map_err(|e| invalid(field, e.to_string()))?;
                }
                "id" | "created_at" | "updated_at" => {
                    return Err(ResolutionError::ReadOnlyField(field.clone()));
                }
                _ => return Err(ResolutionError::UnknownField(field.clone())),
            }
        }

        resolved.touch(now);
        Ok(resolved)
    }
}

fn is_editable(field: &str) -> bool {
    matches!(field, "items" | "destination" | "status")
}

fn invalid(field: &str, reason: String) -> ResolutionError {
    ResolutionError::InvalidValue {
        field: field.to_string(),
        reason,
    }
}
