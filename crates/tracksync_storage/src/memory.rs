//! In-memory queue storage for testing.

use crate::error::StorageResult;
use crate::storage::QueueStorage;
use parking_lot::RwLock;
use std::sync::Arc;

/// An in-memory queue store.
///
/// Clones share the same buffer, so a clone handed to a new queue sees
/// everything written through the original. This makes it suitable for:
/// - Unit tests, including simulated restarts
/// - Ephemeral sessions that don't need persistence
///
/// # Example
///
/// ```rust
/// use tracksync_storage::{QueueStorage, InMemoryStorage};
///
/// let storage = InMemoryStorage::new();
/// let reopened = storage.clone();
/// storage.store(b"data").unwrap();
/// assert_eq!(reopened.load().unwrap(), Some(b"data".to_vec()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<Option<Vec<u8>>>>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding pre-existing data.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(RwLock::new(Some(data))),
        }
    }
}

impl QueueStorage for InMemoryStorage {
    fn load(&self) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.read().clone())
    }

    fn store(&self, data: &[u8]) -> StorageResult<()> {
        *self.data.write() = Some(data.to_vec());
        Ok(())
    }

    fn clear(&self) -> StorageResult<()> {
        *self.data.write() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_empty() {
        let storage = InMemoryStorage::new();
        assert_eq!(storage.load().unwrap(), None);
    }

    #[test]
    fn memory_store_replaces() {
        let storage = InMemoryStorage::new();
        storage.store(b"first").unwrap();
        storage.store(b"second").unwrap();
        assert_eq!(storage.load().unwrap(), Some(b"second".to_vec()));
    }

    #[test]
    fn memory_clones_share_data() {
        let storage = InMemoryStorage::with_data(b"seed".to_vec());
        let other = storage.clone();

        other.store(b"changed").unwrap();
        assert_eq!(storage.load().unwrap(), Some(b"changed".to_vec()));

        storage.clear().unwrap();
        assert_eq!(other.load().unwrap(), None);
    }
}
