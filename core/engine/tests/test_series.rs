//! FILENAME: tests/test_series.rs
//! Integration tests for sub-rows and tally views.

mod common;

use std::collections::BTreeMap;

use common::TestHarness;
use engine::{EngineError, Value, ViewSpec};
use serde_json::json;

fn tally(which: &str) -> ViewSpec {
    ViewSpec::from_json(json!({ "tally": { "which": which, "field": "comment" } })).unwrap()
}

// ============================================================================
// SUB-ROWS
// ============================================================================

#[test]
fn test_cursor_starts_on_first_sub_row() {
    let harness = TestHarness::with_sample_data();
    assert_eq!(harness.flows.get_subindex(), Some("s1"));
    assert_eq!(harness.flows.get_subindices(), vec!["s1", "s2", "s3"]);
    assert_eq!(harness.flows.get_value_column("comment"), Value::from("first"));
}

#[test]
fn test_add_set_get_sub_row() {
    let mut harness = TestHarness::with_sample_data();
    let added = harness.flows.add_series_row("A").unwrap();

    // Adding does not move the cursor.
    assert_eq!(harness.flows.get_subindex(), Some("s1"));
    assert_eq!(harness.flows.get_subindices().last(), Some(&added));

    harness.flows.set_subindex(&added).unwrap();
    harness.flows.set_value_column("fourth", "comment").unwrap();
    assert_eq!(harness.flows.get_value_column("comment"), Value::from("fourth"));

    harness.flows.set_subindex("s2").unwrap();
    assert_eq!(harness.flows.get_value_column("comment"), Value::from("second"));
}

#[test]
fn test_sub_rows_keep_insertion_order() {
    let mut harness = TestHarness::with_sample_data();
    harness.flows.set_index("B").unwrap();
    let first = harness.flows.get_subindex().unwrap().to_string();
    let second = harness.flows.add_series_row("B").unwrap();
    let third = harness.flows.add_series_row("B").unwrap();
    assert_ne!(second, third);
    assert_eq!(harness.flows.get_subindices(), vec![first, second, third]);
}

#[test]
fn test_entering_an_entity_without_sub_rows_creates_one() {
    let mut harness = TestHarness::with_sample_data();
    assert!(harness.flows.store().get_subindices("C").is_empty());
    harness.flows.set_index("C").unwrap();
    assert_eq!(harness.flows.get_subindices().len(), 1);
    harness.flows.set_index("A").unwrap();
    harness.flows.set_index("C").unwrap();
    assert_eq!(harness.flows.get_subindices().len(), 1);
}

#[test]
fn test_unknown_sub_row_is_rejected() {
    let mut harness = TestHarness::with_sample_data();
    let err = harness.flows.set_subindex("s9").unwrap_err();
    assert!(matches!(err, EngineError::InvalidSubindex { ref subindex, .. } if subindex == "s9"));
    assert_eq!(harness.flows.get_subindex(), Some("s1"));
}

#[test]
fn test_add_series_row_for_unknown_entity() {
    let mut harness = TestHarness::with_sample_data();
    let err = harness.flows.add_series_row("Z").unwrap_err();
    assert!(matches!(err, EngineError::InvalidIndex(ref i) if i == "Z"));
}

// ============================================================================
// TALLY
// ============================================================================

#[test]
fn test_tally_next_at_last_sub_row_stays() {
    let mut harness = TestHarness::with_sample_data();
    harness.flows.set_subindex("s3").unwrap();
    let value = harness.flows.view_to_value(&tally("next")).unwrap();
    assert_eq!(value, Value::from("third"));
    assert_eq!(harness.flows.get_subindex(), Some("s3"));
}

#[test]
fn test_tally_earlier_and_others() {
    let mut harness = TestHarness::with_sample_data();
    harness.flows.set_subindex("s2").unwrap();
    assert_eq!(harness.flows.view_to_value(&tally("earlier")).unwrap(), Value::from("first"));
    assert_eq!(
        harness.flows.view_to_value(&tally("others")).unwrap(),
        Value::from("first\n\nthird")
    );
    assert_eq!(harness.flows.get_subindex(), Some("s2"));
}

#[test]
fn test_tally_reverse_with_frame() {
    let mut harness = TestHarness::with_sample_data();
    let spec = ViewSpec::from_json(json!({
        "tally": { "which": "all", "reverse": true, "begin": "Notes:", "field": "comment" }
    }))
    .unwrap();
    assert_eq!(
        harness.flows.view_to_value(&spec).unwrap(),
        Value::from("Notes:\n\nthird\n\nsecond\n\nfirst")
    );
}

#[test]
fn test_tally_templates_see_overrides() {
    let mut harness = TestHarness::with_sample_data();
    let spec = ViewSpec::from_json(json!({
        "tally": { "which": "all", "display": "{who}: {comment}" }
    }))
    .unwrap();
    let overrides: BTreeMap<String, Value> = [("who".to_string(), Value::from("R1"))].into();
    assert_eq!(
        harness.flows.view_to_value_with(&spec, &overrides).unwrap(),
        Value::from("R1: first\n\nR1: second\n\nR1: third")
    );

    // Without the override the key is unknown.
    let err = harness.flows.view_to_value(&spec).unwrap_err();
    assert!(matches!(err, EngineError::TemplateKey { ref key } if key == "who"));
}
