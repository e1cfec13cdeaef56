//! # tracksync storage
//!
//! Durable storage for the pending-operation queue.
//!
//! Storage implementations are **opaque blob stores**: the whole queue is
//! read and rewritten as one document, and interpretation of the bytes is
//! left to the queue.
//!
//! ## Design Principles
//!
//! - One blob per store, replaced atomically on every write
//! - A stored blob reads back byte-for-byte
//! - Must be `Send + Sync` for sharing between tasks
//!
//! ## Available Stores
//!
//! - [`InMemoryStorage`] - For testing and ephemeral sessions
//! - [`FileStorage`] - For persistent storage using OS file APIs
//!
//! ## Example
//!
//! ```rust
//! use tracksync_storage::{QueueStorage, InMemoryStorage};
//!
//! let storage = InMemoryStorage::new();
//! storage.store(b"[]").unwrap();
//! assert_eq!(storage.load().unwrap().as_deref(), Some(&b"[]"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod storage;

pub use error::{StorageError, StorageResult};
pub use file::FileStorage;
pub use memory::InMemoryStorage;
pub use storage::QueueStorage;
