//! Offline merge command implementation.

use super::{read_array, OutputFormat};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracksync_protocol::{merge, validate_batch, Conflict, MergeOutcome};

/// Summary of an offline merge.
#[derive(Debug, Serialize)]
pub struct MergeResult {
    /// True if every remote record passed validation.
    pub valid: bool,
    /// Number of local records.
    pub local: usize,
    /// Number of remote values.
    pub remote: usize,
    /// Number of remote values dropped by validation.
    pub rejected: usize,
    /// Number of merged records.
    pub merged: usize,
    /// Local records overwritten by newer remote copies.
    pub conflicts: Vec<Conflict>,
}

/// Merges the remote file into the local file.
///
/// Local records must be valid; invalid remote records are dropped.
pub fn execute(
    local_path: &Path,
    remote_path: &Path,
) -> Result<(MergeResult, MergeOutcome), Box<dyn std::error::Error>> {
    let local_values = read_array(local_path)?;
    let local = validate_batch(&local_values);
    if let Some(rejection) = local.rejected.first() {
        return Err(format!(
            "local record {} is invalid: {}",
            rejection.index, rejection.error
        )
        .into());
    }

    let remote = read_array(remote_path)?;
    let outcome = merge(&local.valid, &remote);

    let result = MergeResult {
        valid: outcome.valid,
        local: local.valid.len(),
        remote: remote.len(),
        rejected: outcome.rejected.len(),
        merged: outcome.merged.len(),
        conflicts: outcome.conflicts.clone(),
    };
    Ok((result, outcome))
}

/// Runs the merge command.
pub fn run(
    local_path: &Path,
    remote_path: &Path,
    out: Option<&Path>,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let (result, outcome) = execute(local_path, remote_path)?;

    if let Some(out) = out {
        fs::write(out, serde_json::to_string_pretty(&outcome.merged)?)?;
    }

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!(
                "Merged {} local and {} remote records into {}",
                result.local, result.remote, result.merged
            );
            if !result.valid {
                println!("Dropped {} invalid remote record(s)", result.rejected);
            }
            for conflict in &result.conflicts {
                println!("{conflict}");
                for change in &conflict.changes {
                    println!("  {}: {} -> {}", change.field, change.local, change.remote);
                }
            }
            if let Some(out) = out {
                println!("Wrote {}", out.display());
            }
        }
    }

    Ok(())
}
