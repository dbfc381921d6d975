//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use engine::{EngineResult, FlowConfig, Flows, MemorySource, RawFrame, Value};
use serde_json::Value as Json;

/// Test harness owning an engine and the in-memory storage it loads from.
pub struct TestHarness {
    pub flows: Flows,
    pub source: MemorySource,
}

impl TestHarness {
    /// Create an unloaded harness for a JSON configuration.
    pub fn new(config: Json) -> Self {
        let config = FlowConfig::from_value(config).unwrap();
        TestHarness {
            flows: Flows::new(config).unwrap(),
            source: MemorySource::new(),
        }
    }

    /// Create a loaded harness over the sample papers.
    pub fn with_sample_data() -> Self {
        let mut harness = Self::new(sample_config());
        harness.populate_sample_data();
        harness.load().unwrap();
        harness
    }

    /// Populate storage with three papers, one stored score and three
    /// series comments on paper A.
    pub fn populate_sample_data(&mut self) {
        self.source.insert(
            "data",
            RawFrame::from_columns(vec![
                ("id", vec!["A".into(), "B".into(), "C".into()]),
                (
                    "Paper Title",
                    vec!["Graph Rewriting".into(), "Lazy Evaluation".into(), "Type Classes".into()],
                ),
                ("author", vec!["Jane Doe".into(), "Smith, John".into(), "Ada".into()]),
                ("score", vec![1.0.into(), 2.0.into(), 3.0.into()]),
            ]),
        );
        self.source.insert(
            "write_data",
            RawFrame::from_columns(vec![
                ("id", vec!["A".into()]),
                ("score", vec![4.0.into()]),
            ]),
        );
        self.source.insert(
            "write_series",
            RawFrame::from_columns(vec![
                ("id", vec!["A".into(), "A".into(), "A".into()]),
                ("stamp", vec!["s1".into(), "s2".into(), "s3".into()]),
                ("comment", vec!["first".into(), "second".into(), "third".into()]),
            ]),
        );
    }

    pub fn load(&mut self) -> EngineResult<()> {
        self.flows.load_flows(&mut self.source)
    }

    pub fn save(&mut self) -> EngineResult<usize> {
        self.flows.save_flows(&mut self.source)
    }

    /// Registers `name` as a function counting its calls; it returns the
    /// running count.
    pub fn counting_function(&mut self, name: &str) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        self.flows.register_function(name, "Counts its calls.", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Value::Number(n as f64))
        });
        calls
    }
}

pub fn sample_config() -> Json {
    serde_json::json!({
        "data": { "index": "id" },
        "write_data": { "index": "id", "fields": ["score", "notes"] },
        "write_series": { "index": "id", "selector": "stamp", "fields": ["comment"] },
        "cache": {},
        "globals": { "fields": ["reviewer"] },
        "mapping": { "paperTitle": "Paper Title" }
    })
}

pub fn calls(counter: &Arc<AtomicUsize>) -> usize {
    counter.load(Ordering::SeqCst)
}
