//! FILENAME: core/engine/src/source.rs
//! PURPOSE: The storage boundary of the engine.
//! CONTEXT: Groups are read from and written to an external collaborator
//! through `GroupSource`. The engine never looks at storage formats: it
//! hands over the group name and the opaque descriptor from the group's
//! declaration, and receives a `RawFrame`. `MemorySource` keeps frames in a
//! map and backs the tests and embedders that assemble data in code.

use std::collections::BTreeMap;

use serde_json::Value as Json;

use crate::error::BoxError;
use crate::frame::RawFrame;

pub trait GroupSource {
    /// Reads a group. Returns the frame and collaborator details (resolved
    /// location, format). A group with nothing stored yet is an empty frame.
    fn read_group(&mut self, name: &str, descriptor: &Json) -> Result<(RawFrame, Json), BoxError>;

    /// Writes a group.
    fn write_group(&mut self, name: &str, frame: &RawFrame, descriptor: &Json) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    frames: BTreeMap<String, RawFrame>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame(mut self, name: &str, frame: RawFrame) -> Self {
        self.insert(name, frame);
        self
    }

    pub fn insert(&mut self, name: &str, frame: RawFrame) {
        self.frames.insert(name.to_string(), frame);
    }

    pub fn get(&self, name: &str) -> Option<&RawFrame> {
        self.frames.get(name)
    }
}

impl GroupSource for MemorySource {
    fn read_group(&mut self, name: &str, _descriptor: &Json) -> Result<(RawFrame, Json), BoxError> {
        let frame = self.frames.get(name).cloned().unwrap_or_default();
        let details = serde_json::json!({ "source": "memory", "group": name, "rows": frame.len() });
        Ok((frame, details))
    }

    fn write_group(&mut self, name: &str, frame: &RawFrame, _descriptor: &Json) -> Result<(), BoxError> {
        self.frames.insert(name.to_string(), frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn unknown_groups_read_as_empty() {
        let mut source = MemorySource::new();
        let (frame, details) = source.read_group("write_data", &Json::Null).unwrap();
        assert!(frame.is_empty());
        assert_eq!(details["rows"], 0);
    }

    #[test]
    fn written_frames_read_back() {
        let mut source = MemorySource::new();
        let frame = RawFrame::from_columns(vec![("id", vec![Value::from("A")])]);
        source.write_group("data", &frame, &Json::Null).unwrap();
        assert_eq!(source.read_group("data", &Json::Null).unwrap().0, frame);
    }
}
