//! FILENAME: core/persistence/src/lib.rs
//! Review Flows Persistence Module
//!
//! Stores column groups as JSON record files, one file per group, and
//! plugs into the engine through `GroupSource`.

mod error;
mod json_reader;
mod json_writer;

pub use error::PersistenceError;
pub use json_reader::load_records;
pub use json_writer::save_records;

use engine::{log_debug, log_info, BoxError, GroupSource, RawFrame, Value};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;
use std::fmt;
use std::path::{Path, PathBuf};

/// File extension of group files.
pub const GROUP_EXTENSION: &str = "json";

// ============================================================================
// JSON SOURCE
// ============================================================================

/// Group storage in a directory of record files.
///
/// A group's descriptor may name its file with `"path"` (relative paths are
/// resolved against the base directory); otherwise the file is
/// `<base>/<group>.json`. A `"format"` other than `"json"` is rejected.
#[derive(Debug, Clone)]
pub struct JsonSource {
    base_dir: PathBuf,
    require_existing: bool,
}

impl JsonSource {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            require_existing: false,
        }
    }

    /// Missing group files become `GroupNotFound` instead of empty groups.
    pub fn require_existing(mut self, require: bool) -> Self {
        self.require_existing = require;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The file a group lives in.
    pub fn group_path(&self, name: &str, descriptor: &Json) -> Result<PathBuf, PersistenceError> {
        if let Some(format) = descriptor.get("format") {
            if format.as_str() != Some(GROUP_EXTENSION) {
                return Err(PersistenceError::InvalidFormat(format!(
                    "group '{}' declares format {}; only 'json' is supported",
                    name, format
                )));
            }
        }
        match descriptor.get("path") {
            Some(Json::String(path)) => Ok(self.base_dir.join(path)),
            Some(other) => Err(PersistenceError::InvalidFormat(format!(
                "group '{}': 'path' must be a string, got {}",
                name, other
            ))),
            None => Ok(self.base_dir.join(format!("{}.{}", name, GROUP_EXTENSION))),
        }
    }

    pub fn read(&self, name: &str, descriptor: &Json) -> Result<(RawFrame, Json), PersistenceError> {
        let path = self.group_path(name, descriptor)?;
        let exists = path.exists();
        let frame = if exists {
            load_records(&path)?
        } else if self.require_existing {
            return Err(PersistenceError::GroupNotFound(path.display().to_string()));
        } else {
            log_debug!("STORAGE", "no file for group {} at {}; starting empty", name, path.display());
            RawFrame::default()
        };
        let details = serde_json::json!({
            "source": "json",
            "path": path.display().to_string(),
            "exists": exists,
            "rows": frame.len(),
        });
        Ok((frame, details))
    }

    pub fn write(&self, name: &str, frame: &RawFrame, descriptor: &Json) -> Result<(), PersistenceError> {
        let path = self.group_path(name, descriptor)?;
        save_records(frame, &path)?;
        log_info!("STORAGE", "wrote group {} ({} rows) to {}", name, frame.len(), path.display());
        Ok(())
    }
}

impl GroupSource for JsonSource {
    fn read_group(&mut self, name: &str, descriptor: &Json) -> Result<(RawFrame, Json), BoxError> {
        Ok(self.read(name, descriptor)?)
    }

    fn write_group(&mut self, name: &str, frame: &RawFrame, descriptor: &Json) -> Result<(), BoxError> {
        Ok(self.write(name, frame, descriptor)?)
    }
}

// ============================================================================
// RECORDS
// ============================================================================

/// One record as read from a file, keys in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(pub Vec<(String, Value)>);

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = Record;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a record object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Record, A::Error> {
                let mut pairs = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    pairs.push((key, value));
                }
                Ok(Record(pairs))
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// One frame row serialized as a record, keys in column order.
pub struct RecordRef<'a> {
    pub columns: &'a [String],
    pub cells: &'a [Value],
}

impl Serialize for RecordRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests;
