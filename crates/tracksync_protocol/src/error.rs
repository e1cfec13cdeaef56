//! Error types for record validation and conflict resolution.

use thiserror::Error;

/// Result type for applying conflict resolutions.
pub type ResolutionResult<T> = Result<T, ResolutionError>;

/// Reasons a remote value is rejected by the record validator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The value is not a JSON object.
    #[error("record is not an object")]
    NotAnObject,

    /// A required field is absent.
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    /// A field has the wrong JSON type.
    #[error("field `{field}` must be {expected}")]
    WrongType {
        /// Field name.
        field: &'static str,
        /// Expected type description.
        expected: &'static str,
    },

    /// The identifier is an empty string.
    #[error("field `id` must not be empty")]
    EmptyId,

    /// A timestamp is not an RFC 3339 UTC date-time.
    #[error("field `{field}` is not a valid UTC timestamp: {value:?}")]
    InvalidTimestamp {
        /// Field name.
        field: &'static str,
        /// The rejected text.
        value: String,
    },

    /// The status is not one of the known values.
    #[error("unknown status {0:?}")]
    InvalidStatus(String),

    /// `updated_at` precedes `created_at`.
    #[error("updated_at precedes created_at")]
    TimestampOrder,
}

/// Errors raised when a conflict resolution cannot be applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    /// The resolution targets a different record.
    #[error("resolution for {resolution} applied to record {record}")]
    IdMismatch {
        /// Identifier named by the resolution.
        resolution: String,
        /// Identifier of the record it was applied to.
        record: String,
    },

    /// The field does not exist on a shipment.
    #[error("unknown field `{0}`")]
    UnknownField(String),

    /// The field is managed by the sync layer and cannot be chosen.
    #[error("field `{0}` cannot be overridden")]
    ReadOnlyField(String),

    /// The chosen value does not fit the field.
    #[error("invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },
}
