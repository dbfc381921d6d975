//! FILENAME: core/persistence/src/json_reader.rs

use crate::{PersistenceError, Record};
use engine::{RawFrame, Value};
use std::fs;
use std::path::Path;

/// Reads a record-array file into a frame. Columns appear in first-seen
/// order across the records; keys a record lacks read as empty.
pub fn load_records(path: &Path) -> Result<RawFrame, PersistenceError> {
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(RawFrame::default());
    }

    let records: Vec<Record> = serde_json::from_str(&text).map_err(|e| {
        if e.is_data() {
            PersistenceError::InvalidFormat(format!(
                "{}: expected an array of records ({})",
                path.display(),
                e
            ))
        } else {
            PersistenceError::Json(e)
        }
    })?;

    let mut columns: Vec<String> = Vec::new();
    for record in &records {
        for (key, _) in &record.0 {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let mut frame = RawFrame::new(columns);
    for record in records {
        let mut row = vec![Value::Empty; frame.columns.len()];
        for (key, value) in record.0 {
            if let Some(i) = frame.position(&key) {
                row[i] = value;
            }
        }
        frame.rows.push(row);
    }
    Ok(frame)
}
