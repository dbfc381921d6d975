//! FILENAME: core/persistence/src/json_writer.rs

use crate::{PersistenceError, RecordRef};
use engine::RawFrame;
use std::fs;
use std::path::Path;

/// Writes a frame as a pretty-printed array of records, one per row, keys
/// in column order. Parent directories are created as needed.
pub fn save_records(frame: &RawFrame, path: &Path) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let records: Vec<RecordRef<'_>> = frame
        .rows
        .iter()
        .map(|row| RecordRef {
            columns: &frame.columns,
            cells: row,
        })
        .collect();

    // Staged through a sibling file, then renamed into place.
    let staging = path.with_extension("json.tmp");
    fs::write(&staging, serde_json::to_string_pretty(&records)?)?;
    fs::rename(&staging, path)?;
    Ok(())
}
