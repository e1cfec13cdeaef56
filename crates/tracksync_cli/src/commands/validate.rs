//! Validate command implementation.

use super::{read_array, InputError, OutputFormat};
use serde::Serialize;
use std::path::Path;
use tracksync_protocol::validate_batch;

/// Validation summary for one file.
#[derive(Debug, Serialize)]
pub struct ValidateResult {
    /// File path.
    pub path: String,
    /// Number of values in the file.
    pub total: usize,
    /// Number of values that passed validation.
    pub valid: usize,
    /// Values that failed validation.
    pub rejected: Vec<RejectedRecord>,
}

/// A rejected value.
#[derive(Debug, Serialize)]
pub struct RejectedRecord {
    /// Position in the file's array.
    pub index: usize,
    /// Why it was rejected.
    pub reason: String,
}

/// Validates every record in `path`.
pub fn check(path: &Path) -> Result<ValidateResult, InputError> {
    let values = read_array(path)?;
    let batch = validate_batch(&values);

    Ok(ValidateResult {
        path: path.display().to_string(),
        total: values.len(),
        valid: batch.valid.len(),
        rejected: batch
            .rejected
            .iter()
            .map(|r| RejectedRecord {
                index: r.index,
                reason: r.error.to_string(),
            })
            .collect(),
    })
}

/// Runs the validate command. Fails if any record is rejected.
pub fn run(path: &Path, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let result = check(path)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => {
            println!("{}: {}/{} records valid", result.path, result.valid, result.total);
            for rejected in &result.rejected {
                println!("  [{}] {}", rejected.index, rejected.reason);
            }
        }
    }

    if result.rejected.is_empty() {
        Ok(())
    } else {
        Err(format!("{} invalid record(s)", result.rejected.len()).into())
    }
}
