//! # tracksync testkit
//!
//! Test utilities for tracksync.
//!
//! This crate provides:
//! - Record fixtures and temporary queue files
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tracksync_testkit::prelude::*;
//!
//! #[test]
//! fn merge_keeps_local() {
//!     let local = vec![shipment("A", "2024-01-01T00:00:00Z")];
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
