//! Queue storage trait definition.

use crate::error::StorageResult;

/// Durable storage holding a single serialized queue document.
///
/// # Invariants
///
/// - `load` returns exactly the bytes passed to the last successful `store`
/// - `store` replaces the previous blob as a whole; a crash leaves either
///   the old or the new blob, never a mix
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStorage`] - For testing
/// - [`super::FileStorage`] - For persistent storage
pub trait QueueStorage: Send + Sync {
    /// Reads the stored blob.
    ///
    /// Returns `None` if nothing was ever stored.
    ///
    /// # Errors
    ///
    /// Returns an error if an I/O error occurs.
    fn load(&self) -> StorageResult<Option<Vec<u8>>>;

    /// Replaces the stored blob.
    ///
    /// After this returns successfully the blob survives process termination.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn store(&self, data: &[u8]) -> StorageResult<()>;

    /// Removes the stored blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal fails.
    fn clear(&self) -> StorageResult<()>;
}
