//! FILENAME: tests/test_compute.rs
//! Integration tests for compute specs, refresh policy and navigation hooks.

mod common;

use common::{calls, sample_config, TestHarness};
use engine::{ComputeSpec, EngineError, FunctionEntry, GroupKind, Value, ViewSpec};
use serde_json::json;

// ============================================================================
// REFRESH POLICY
// ============================================================================

#[test]
fn test_run_without_refresh_is_idempotent() {
    let mut harness = TestHarness::with_sample_data();
    let counter = harness.counting_function("tick");
    let spec = ComputeSpec::new("tick").field("ticks");

    let first = harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(first, Some(Value::Number(1.0)));
    assert_eq!(harness.flows.get_value_column("ticks"), Value::Number(1.0));

    // The target is filled now, so the call is skipped.
    assert_eq!(harness.flows.run_compute(&spec, false).unwrap(), None);
    assert_eq!(calls(&counter), 1);

    harness.flows.run_compute(&spec, true).unwrap();
    assert_eq!(calls(&counter), 2);
    assert_eq!(harness.flows.get_value_column("ticks"), Value::Number(2.0));
}

#[test]
fn test_computed_columns_land_in_cache() {
    let mut harness = TestHarness::with_sample_data();
    harness.counting_function("tick");
    harness
        .flows
        .run_compute(&ComputeSpec::new("tick").field("ticks"), false)
        .unwrap();
    assert_eq!(harness.flows.store().owner("ticks"), Some(GroupKind::Cache));
    assert!(harness.flows.set_value_column(0.0, "ticks").is_err());
}

#[test]
fn test_spec_without_target_always_runs() {
    let mut harness = TestHarness::with_sample_data();
    let counter = harness.counting_function("ping");
    let spec = ComputeSpec::new("ping");
    harness.flows.run_compute(&spec, false).unwrap();
    harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(calls(&counter), 2);
}

// ============================================================================
// ARGUMENTS & RESULTS
// ============================================================================

#[test]
fn test_splitname_fills_two_targets() {
    let mut harness = TestHarness::with_sample_data();
    let spec = ComputeSpec::new("splitname")
        .fields(["first", "last"])
        .row_arg("name", "author");

    harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(harness.flows.get_value_column("first"), Value::from("Jane"));
    assert_eq!(harness.flows.get_value_column("last"), Value::from("Doe"));

    harness.flows.set_index("B").unwrap();
    harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(harness.flows.get_value_column("first"), Value::from("John"));
    assert_eq!(harness.flows.get_value_column("last"), Value::from("Smith"));
}

#[test]
fn test_discarded_outputs_are_not_stored() {
    let mut harness = TestHarness::with_sample_data();
    let spec = ComputeSpec::new("splitname")
        .fields(["_", "surname"])
        .row_arg("name", "author");
    harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(harness.flows.get_value_column("surname"), Value::from("Doe"));
    assert!(!harness.flows.store().has_column("_"));
}

#[test]
fn test_result_count_must_match_targets() {
    let mut harness = TestHarness::with_sample_data();
    let spec = ComputeSpec::new("splitname")
        .fields(["a", "b", "c"])
        .row_arg("name", "author");
    let err = harness.flows.run_compute(&spec, false).unwrap_err();
    assert!(matches!(
        err,
        EngineError::ComputeArity {
            expected: 3,
            actual: 2,
            ..
        }
    ));
}

#[test]
fn test_single_entry_field_list_unpacks_the_result() {
    let mut harness = TestHarness::with_sample_data();
    harness
        .flows
        .register_function("one", "Returns a one-element list.", |_| {
            Ok(Value::List(vec![Value::from("Jane")]))
        });
    let spec = ComputeSpec::from_json(json!({ "function": "one", "field": ["first"] })).unwrap();
    harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(harness.flows.get_value_column("first"), Value::from("Jane"));
}

#[test]
fn test_field_list_rejects_a_scalar_result() {
    let mut harness = TestHarness::with_sample_data();
    harness
        .flows
        .register_function("scalar", "Returns one plain value.", |_| Ok(Value::from("Jane")));
    let spec = ComputeSpec::new("scalar").fields(["first"]);
    let err = harness.flows.run_compute(&spec, false).unwrap_err();
    assert!(matches!(err, EngineError::ComputeArity { expected: 1, .. }));
    assert!(harness.flows.get_value_column("first").is_missing());
}

#[test]
fn test_argument_sources_layer_in_order() {
    let mut harness = TestHarness::with_sample_data();
    harness.flows.register_function_entry(
        FunctionEntry::new("echo", "Returns its 'name' argument.", |kwargs| {
            Ok(kwargs.get("name").cloned().unwrap_or_default())
        })
        .with_default("name", "fallback"),
    );

    let defaults_only = ComputeSpec::new("echo");
    assert_eq!(
        harness.flows.run_compute(&defaults_only, false).unwrap(),
        Some(Value::from("fallback"))
    );

    let literal = ComputeSpec::new("echo").arg("name", "literal");
    assert_eq!(
        harness.flows.run_compute(&literal, false).unwrap(),
        Some(Value::from("literal"))
    );

    let from_view = ComputeSpec::new("echo")
        .arg("name", "literal")
        .view_arg("name", ViewSpec::display("{paperTitle}"));
    assert_eq!(
        harness.flows.run_compute(&from_view, false).unwrap(),
        Some(Value::from("Graph Rewriting"))
    );

    // The row value wins over every earlier source.
    let from_row = from_view.clone().row_arg("name", "author");
    assert_eq!(
        harness.flows.run_compute(&from_row, false).unwrap(),
        Some(Value::from("Jane Doe"))
    );
}

#[test]
fn test_function_and_view_arguments_feed_a_call() {
    let mut harness = TestHarness::with_sample_data();
    harness
        .flows
        .register_function("stamp", "Joins a title and a date.", |kwargs| {
            let title = kwargs.get("title").map(Value::display_value).unwrap_or_default();
            let date = kwargs.get("date").map(Value::display_value).unwrap_or_default();
            Ok(Value::Text(format!("{} @ {}", title, date)))
        });
    let spec = ComputeSpec::from_json(json!({
        "function": "stamp",
        "field": "stamped",
        "function_args": { "date": { "function": "today" } },
        "view_args": { "title": "{paperTitle} ({id})" }
    }))
    .unwrap();

    let today = harness
        .flows
        .run_compute(&ComputeSpec::new("today"), false)
        .unwrap()
        .unwrap()
        .display_value();
    harness.flows.run_compute(&spec, false).unwrap();
    assert_eq!(
        harness.flows.get_value_column("stamped"),
        Value::Text(format!("Graph Rewriting (A) @ {}", today))
    );
}

#[test]
fn test_unknown_function() {
    let mut harness = TestHarness::with_sample_data();
    let err = harness
        .flows
        .run_compute(&ComputeSpec::new("nope").field("x"), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::UnknownFunction(ref f) if f == "nope"));
}

#[test]
fn test_function_errors_carry_the_name() {
    let mut harness = TestHarness::with_sample_data();
    harness
        .flows
        .register_function("boom", "Always fails.", |_| Err("kaput".into()));
    let err = harness
        .flows
        .run_compute(&ComputeSpec::new("boom").field("x"), false)
        .unwrap_err();
    assert!(matches!(err, EngineError::Function { ref function, .. } if function == "boom"));
}

#[test]
fn test_column_and_subseries_arguments() {
    let mut harness = TestHarness::with_sample_data();
    let spec = ComputeSpec::from_json(json!({
        "function": "sum",
        "field": "total",
        "column_args": { "values": "score" }
    }))
    .unwrap();
    // write_data shadows data: only A has a stored score.
    assert_eq!(harness.flows.run_compute(&spec, false).unwrap(), Some(Value::Number(4.0)));

    let spec = ComputeSpec::new("count").field("comments").subseries_arg("values", "comment");
    assert_eq!(harness.flows.run_compute(&spec, false).unwrap(), Some(Value::Number(3.0)));
}

#[test]
fn test_compute_view_uses_stored_result_when_skipped() {
    let mut harness = TestHarness::with_sample_data();
    let counter = harness.counting_function("tick");
    let view = ViewSpec::compute(ComputeSpec::new("tick").field("ticks"));
    assert_eq!(harness.flows.view_to_value(&view).unwrap(), Value::Number(1.0));
    assert_eq!(harness.flows.view_to_value(&view).unwrap(), Value::Number(1.0));
    assert_eq!(calls(&counter), 1);
}

// ============================================================================
// NAVIGATION HOOKS
// ============================================================================

#[test]
fn test_set_index_runs_post_then_pre() {
    let mut config = sample_config();
    config["precompute"] = json!([{ "function": "enter", "field": "entered", "refresh": true }]);
    config["postcompute"] = json!([{ "function": "leave", "field": "left", "refresh": true }]);
    let mut harness = TestHarness::new(config);
    harness.populate_sample_data();
    let entered = harness.counting_function("enter");
    let left = harness.counting_function("leave");

    harness.load().unwrap();
    assert_eq!((calls(&entered), calls(&left)), (1, 0));

    harness.flows.set_index("B").unwrap();
    assert_eq!((calls(&entered), calls(&left)), (2, 1));
    assert_eq!(harness.flows.get_value_column("entered"), Value::Number(2.0));

    // Same index: nothing runs.
    harness.flows.set_index("B").unwrap();
    assert_eq!((calls(&entered), calls(&left)), (2, 1));

    harness.flows.set_index("A").unwrap();
    assert_eq!(harness.flows.get_value_column("left"), Value::Number(1.0));
}

#[test]
fn test_set_index_adds_missing_entity() {
    let mut harness = TestHarness::with_sample_data();
    harness.flows.set_index("D").unwrap();
    assert_eq!(harness.flows.get_indices(), vec!["A", "B", "C", "D"]);
    assert_eq!(harness.flows.get_index(), Some("D"));
    harness.flows.set_value_column(9.0, "score").unwrap();
    assert_eq!(harness.flows.get_value_column("score"), Value::Number(9.0));
}

#[test]
fn test_add_row_computes_the_new_entity() {
    let mut config = sample_config();
    config["precompute"] = json!([{ "function": "enter", "field": "entered", "refresh": true }]);
    let mut harness = TestHarness::new(config);
    harness.populate_sample_data();
    let entered = harness.counting_function("enter");
    harness.load().unwrap();
    assert_eq!(calls(&entered), 1);

    assert!(harness.flows.add_row("D").unwrap());
    assert_eq!(calls(&entered), 2);
    assert_eq!(harness.flows.get_index(), Some("A"));
    assert_eq!(harness.flows.get_indices(), vec!["A", "B", "C", "D"]);

    // An existing entity is left alone.
    assert!(!harness.flows.add_row("D").unwrap());
    assert_eq!(calls(&entered), 2);

    harness.flows.set_index("D").unwrap();
    assert_eq!(harness.flows.get_value_column("entered"), Value::Number(3.0));
}
