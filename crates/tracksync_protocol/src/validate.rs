//! Structural validation of untrusted remote records.

use crate::error::ValidationError;
use crate::record::{parse_timestamp, Shipment, ShipmentStatus};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A remote value rejected by the validator.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Position of the value in the remote batch.
    pub index: usize,
    /// Why it was rejected.
    pub error: ValidationError,
}

/// Result of validating a remote batch.
#[derive(Debug, Clone, Default)]
pub struct BatchValidation {
    /// Records that passed validation, in batch order.
    pub valid: Vec<Shipment>,
    /// Values that failed validation.
    pub rejected: Vec<Rejection>,
}

impl BatchValidation {
    /// Returns true if no value was rejected.
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validates an untrusted value as a [`Shipment`].
///
/// Unknown keys are ignored. The function is pure.
pub fn validate_record(value: &Value) -> Result<Shipment, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

    let id = string_field(object, "id")?;
    if id.is_empty() {
        return Err(ValidationError::EmptyId);
    }

    let items = match required(object, "items")? {
        Value::Array(values) => values
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(ValidationError::WrongType {
                field: "items",
                expected: "an array of strings",
            })?,
        _ => {
            return Err(ValidationError::WrongType {
                field: "items",
                expected: "an array of strings",
            })
        }
    };

    let destination = string_field(object, "destination")?;
    let created_at = timestamp_field(object, "created_at")?;
    let updated_at = timestamp_field(object, "updated_at")?;
    let status: ShipmentStatus = string_field(object, "status")?.parse()?;

    if updated_at < created_at {
        return Err(ValidationError::TimestampOrder);
    }

    Ok(Shipment {
        id: id.to_string(),
        items,
        destination: destination.to_string(),
        created_at,
        updated_at,
        status,
    })
}

/// Validates every value in a remote batch, keeping the valid subset.
pub fn validate_batch(values: &[Value]) -> BatchValidation {
    let mut result = BatchValidation::default();
    for (index, value) in values.iter().enumerate() {
        match validate_record(value) {
            Ok(shipment) => result.valid.push(shipment),
            Err(error) => result.rejected.push(Rejection { index, error }),
        }
    }
    result
}

fn required<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a Value, ValidationError> {
    object.get(field).ok_or(ValidationError::MissingField(field))
}

fn string_field<'a>(object: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ValidationError> {
    required(object, field)?
        .as_str()
        .ok_or(ValidationError::WrongType {
            field,
            expected: "a string",
        })
}

fn timestamp_field(object: &Map<String, Value>, field: &'static str) -> Result<DateTime<Utc>, ValidationError> {
    let text = string_field(object, field)?;
    parse_timestamp(text).ok_or_else(|| ValidationError::InvalidTimestamp {
        field,
        value: text.to_string(),
    })
}
