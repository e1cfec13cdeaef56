//! Error types for the sync engine.

use thiserror::Error;
use tracksync_protocol::ResolutionError;
use tracksync_storage::StorageError;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote store rejected or failed a call.
    #[error("remote error: {message}")]
    Remote {
        /// Error message.
        message: String,
        /// Whether the call can be retried.
        retryable: bool,
    },

    /// The remote store is unreachable.
    #[error("not connected to remote store")]
    NotConnected,

    /// Applying a mutation to the local record set failed.
    ///
    /// Fatal to the mutation: nothing is queued.
    #[error("local write failed: {0}")]
    LocalWrite(String),

    /// Queue storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A payload or queue document could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// A conflict resolution could not be applied.
    #[error("resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    /// A drain of the pending queue is already running.
    #[error("queue drain already in progress")]
    DrainInProgress,

    /// A merge cycle is already running.
    #[error("merge cycle already in progress")]
    MergeInProgress,
}

impl SyncError {
    /// Creates a retryable remote error.
    pub fn remote_retryable(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable remote error.
    pub fn remote_fatal(message: impl Into<String>) -> Self {
        Self::Remote {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a local write error.
    pub fn local_write(message: impl Into<String>) -> Self {
        Self::LocalWrite(message.into())
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote { retryable, .. } => *retryable,
            SyncError::NotConnected => true,
            SyncError::DrainInProgress | SyncError::MergeInProgress => true,
            _ => false,
        }
    }
}
