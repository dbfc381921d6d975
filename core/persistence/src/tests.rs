//! FILENAME: core/persistence/src/tests.rs

use super::*;
use engine::{FlowConfig, Flows};
use serde_json::json;
use std::fs;
use tempfile::tempdir;

fn sample_frame() -> RawFrame {
    RawFrame::from_columns(vec![
        ("id", vec!["A".into(), "B".into()]),
        ("score", vec![4.0.into(), Value::Empty]),
        ("note", vec!["fine".into(), "needs work".into()]),
    ])
}

// ============================================================================
// RECORD FILES
// ============================================================================

#[test]
fn test_records_round_trip_in_column_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("write_data.json");
    save_records(&sample_frame(), &path).unwrap();

    let loaded = load_records(&path).unwrap();
    assert_eq!(loaded.columns, vec!["id", "score", "note"]);
    assert_eq!(loaded, sample_frame());
}

#[test]
fn test_sparse_records_fill_missing_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, r#"[{"id": "A", "title": "T"}, {"id": "B", "year": 2020}]"#).unwrap();

    let frame = load_records(&path).unwrap();
    assert_eq!(frame.columns, vec!["id", "title", "year"]);
    assert_eq!(frame.rows[1], vec![Value::from("B"), Value::Empty, Value::Number(2020.0)]);
}

#[test]
fn test_non_record_file_is_invalid_format() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("data.json");
    fs::write(&path, r#"{"id": "A"}"#).unwrap();
    assert!(matches!(
        load_records(&path),
        Err(PersistenceError::InvalidFormat(_))
    ));

    fs::write(&path, "[{").unwrap();
    assert!(matches!(load_records(&path), Err(PersistenceError::Json(_))));
}

#[test]
fn test_empty_file_is_empty_frame() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cache.json");
    fs::write(&path, "").unwrap();
    assert!(load_records(&path).unwrap().is_empty());
}

#[test]
fn test_writer_creates_parent_directories() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("deeper").join("g.json");
    save_records(&sample_frame(), &path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("json.tmp").exists());
}

// ============================================================================
// JSON SOURCE
// ============================================================================

#[test]
fn test_group_paths() {
    let source = JsonSource::new("/data/review");
    assert_eq!(
        source.group_path("write_data", &json!({})).unwrap(),
        PathBuf::from("/data/review/write_data.json")
    );
    assert_eq!(
        source.group_path("data", &json!({ "path": "inputs/papers.json" })).unwrap(),
        PathBuf::from("/data/review/inputs/papers.json")
    );
    assert!(matches!(
        source.group_path("data", &json!({ "format": "xlsx" })),
        Err(PersistenceError::InvalidFormat(_))
    ));
}

#[test]
fn test_missing_group_reads_empty_unless_required() {
    let dir = tempdir().unwrap();
    let mut source = JsonSource::new(dir.path());
    let (frame, details) = source.read_group("globals", &json!({})).unwrap();
    assert!(frame.is_empty());
    assert_eq!(details["exists"], false);

    let mut strict = JsonSource::new(dir.path()).require_existing(true);
    let err = strict.read_group("globals", &json!({})).unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_flows_save_and_reload() {
    let dir = tempdir().unwrap();
    let papers = json!([
        { "id": "A", "title": "Graph Rewriting" },
        { "id": "B", "title": "Type Classes" }
    ]);
    fs::write(dir.path().join("papers.json"), papers.to_string()).unwrap();

    let config = json!({
        "data": { "index": "id", "path": "papers.json" },
        "write_data": { "index": "id", "fields": ["verdict"] },
        "write_series": { "index": "id", "selector": "stamp", "fields": ["comment"] },
        "cache": {}
    });

    let mut source = JsonSource::new(dir.path());
    let mut flows = Flows::new(FlowConfig::from_value(config.clone()).unwrap()).unwrap();
    flows.load_flows(&mut source).unwrap();
    flows.set_index("B").unwrap();
    flows.set_value_column("accept", "verdict").unwrap();
    flows.set_value_column("clear argument", "comment").unwrap();
    assert_eq!(flows.save_flows(&mut source).unwrap(), 2);

    assert!(dir.path().join("write_data.json").exists());
    assert!(dir.path().join("write_series.json").exists());
    assert!(!dir.path().join("cache.json").exists());
    assert!(!dir.path().join("data.json").exists());

    let mut reloaded = Flows::new(FlowConfig::from_value(config).unwrap()).unwrap();
    reloaded.load_flows(&mut source).unwrap();
    reloaded.set_index("B").unwrap();
    assert_eq!(reloaded.get_value_column("verdict"), Value::from("accept"));
    assert_eq!(reloaded.get_value_column("comment"), Value::from("clear argument"));
    assert_eq!(reloaded.get_value_column("title"), Value::from("Type Classes"));
}
