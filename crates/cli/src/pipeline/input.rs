//! Input file - readings handed to the ingest bridge

use std::path::Path;

use serde_json::Value;

use crate::error::CliError;

/// Read `path` and split it into foreign batches
///
/// An array of arrays is taken batch by batch; a flat array of readings is
/// cut into chunks of `batch_size`.
pub fn load_batches(path: &Path, batch_size: usize) -> Result<Vec<Value>, CliError> {
    let content =
        std::fs::read_to_string(path).map_err(|e| CliError::input(path, e.to_string()))?;
    let value: Value =
        serde_json::from_str(&content).map_err(|e| CliError::input(path, e.to_string()))?;

    split_batches(value, batch_size).ok_or_else(|| CliError::input(path, "expected a JSON array"))
}

fn split_batches(value: Value, batch_size: usize) -> Option<Vec<Value>> {
    let Value::Array(items) = value else {
        return None;
    };

    if !items.is_empty() && items.iter().all(Value::is_array) {
        return Some(items);
    }

    Some(
        items
            .chunks(batch_size.max(1))
            .map(|chunk| Value::Array(chunk.to_vec()))
            .collect(),
    )
}
