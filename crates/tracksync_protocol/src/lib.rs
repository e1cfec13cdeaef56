//! # tracksync protocol
//!
//! Record types, validation and merge rules for tracksync.
//!
//! This crate provides:
//! - [`Shipment`], the record synchronized between local and remote stores
//! - [`validate_record`] for untrusted remote values
//! - [`merge`], the last-writer-wins merge of a remote batch into local state
//! - [`Conflict`] and [`ConflictResolution`] for surfacing and overriding merges
//! - [`PendingOperation`], the persisted form of an unacknowledged mutation
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Key Invariants
//!
//! - Malformed remote records never reach local state
//! - Local wins when `updated_at` timestamps are equal
//! - Merging the same remote batch twice yields the same result
//! - Merge never removes local records

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod merge;
mod operation;
mod record;
mod validate;

pub use conflict::{Conflict, ConflictResolution, FieldConflict};
pub use error::{ResolutionError, ResolutionResult, ValidationError};
pub use merge::{merge, MergeOutcome};
pub use operation::{OperationType, PendingOperation};
pub use record::{Shipment, ShipmentStatus, FIELD_NAMES};
pub use validate::{validate_batch, validate_record, BatchValidation, Rejection};
