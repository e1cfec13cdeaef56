//! Pending queue commands.

use super::OutputFormat;
use serde::Serialize;
use std::path::Path;
use tracing::info;
use tracksync_engine::{PendingQueue, RetryPolicy, SyncResult};
use tracksync_protocol::PendingOperation;
use tracksync_storage::FileStorage;

fn open(path: &Path, retry: RetryPolicy) -> SyncResult<PendingQueue<FileStorage>> {
    let storage = FileStorage::open(path)?;
    PendingQueue::open(storage, retry)
}

/// Returns the operations queued at `path`.
pub fn pending(path: &Path) -> SyncResult<Vec<PendingOperation>> {
    open(path, RetryPolicy::default())?.pending()
}

/// A queued operation as printed by `queue list`.
#[derive(Debug, Serialize)]
pub struct QueueEntry {
    /// The stored operation.
    #[serde(flatten)]
    pub operation: PendingOperation,
    /// True if the next failure would dead-letter the operation.
    pub last_attempt: bool,
}

/// Pairs each operation with its last-attempt flag under `max_attempts`.
pub fn entries(operations: Vec<PendingOperation>, max_attempts: Option<u32>) -> Vec<QueueEntry> {
    let retry = max_attempts.map(RetryPolicy::new);
    operations
        .into_iter()
        .map(|operation| {
            let last_attempt = retry
                .as_ref()
                .is_some_and(|r| r.is_exhausted(operation.attempts.saturating_add(1)));
            QueueEntry {
                operation,
                last_attempt,
            }
        })
        .collect()
}

/// Runs `queue list`.
///
/// With `max_attempts`, operations that would be dead-lettered on their
/// next failure are flagged in both output formats.
pub fn list(
    path: &Path,
    max_attempts: Option<u32>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let entries = entries(pending(path)?, max_attempts);

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            println!("{} pending operation(s) in {}", entries.len(), path.display());
            for (index, entry) in entries.iter().enumerate() {
                let op = &entry.operation;
                println!(
                    "  [{}] {} {} queued {} attempts={}{}",
                    index,
                    op.op_type,
                    op.record_id().unwrap_or("?"),
                    op.enqueued_at.to_rfc3339(),
                    op.attempts,
                    if entry.last_attempt { " (last attempt)" } else { "" }
                );
            }
        }
    }

    Ok(())
}

/// Runs `queue clear`. Returns how many operations were removed.
pub fn clear(path: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let queue = open(path, RetryPolicy::default())?;
    let removed = queue.len()?;
    queue.clear()?;
    info!(path = %path.display(), removed, "cleared pending queue");
    println!("Removed {} pending operation(s)", removed);
    Ok(removed)
}
