//! FILENAME: core/engine/src/finalize.rs
//! PURPOSE: Turns a raw collaborator frame into a validated column group.
//! CONTEXT: Runs once per declared group at load time. The declaration says
//! which columns must exist, whether undeclared columns are allowed, how the
//! index is obtained, which extra columns are derived from each row and
//! whether duplicate-index rows collapse into an `entries` list.
//!
//! STEPS:
//! 1. Declared columns exist (created empty if absent)
//! 2. Strict groups reject undeclared columns
//! 3. Group-level mapping entries are registered
//! 4. The index is read or derived, checked, and its column removed
//! 5. Derived fields are computed row by row
//! 6. Series groups are flattened and finalized again
//! 7. Column names are registered in the mapping, types inferred

use std::collections::{HashMap, HashSet};

use regex::Regex;
use template::{Dialect, TemplateValue};

use crate::config::{Derivation, FieldDecl, GroupDecl, IndexSpec};
use crate::error::{EngineError, EngineResult};
use crate::frame::RawFrame;
use crate::group::{Column, ColumnGroup, GroupKind};
use crate::mapping::MappingRegistry;
use crate::value::Value;
use crate::{log_debug, log_enter, log_exit};

/// Column holding the flattened rows of a series group.
pub const ENTRIES_COLUMN: &str = "entries";

/// Row key of a `globals` group when the declaration names none.
pub const DEFAULT_GLOBALS_KEY: &str = "globals";

pub fn finalize(
    kind: GroupKind,
    mut frame: RawFrame,
    decl: &GroupDecl,
    mapping: &mut MappingRegistry,
) -> EngineResult<ColumnGroup> {
    log_enter!("LOAD", "finalize", "{} ({} rows)", kind, frame.len());
    let index_name = decl.index_name().to_string();

    for field in decl.fields.iter().filter(|f| f.derivation.is_none()) {
        frame.ensure_column(&field.name);
    }
    if let Some(selector) = &decl.selector {
        frame.ensure_column(selector);
    }

    if decl.strict_columns {
        check_strict(kind, &frame, decl, &index_name)?;
    }

    for (name, column) in &decl.mapping {
        mapping.update_name_column_map(name, column)?;
    }

    let index = derive_index(kind, &frame, decl, mapping)?;

    for field in &decl.fields {
        if let Some(derivation) = &field.derivation {
            let values = derive_column(&frame, &field.name, derivation, mapping)?;
            frame.set_column(&field.name, values);
        }
    }
    if !matches!(decl.index, Some(IndexSpec::Derived(_))) {
        frame.take_column(&index_name);
    }

    if decl.series {
        let flat = flatten_series(&frame, &index, &index_name, mapping)?;
        let flat_decl = GroupDecl {
            index: Some(IndexSpec::Column(index_name.clone())),
            key: decl.key.clone(),
            ..GroupDecl::default()
        };
        log_debug!("LOAD", "{}: {} rows flattened into {} entities", kind, frame.len(), flat.len());
        let group = finalize(kind, flat, &flat_decl, mapping)?;
        return Ok(group.with_strict(decl.strict_columns));
    }

    check_unique(kind, &frame, &index, decl)?;

    mapping.resolve(&index_name)?;
    for column in &frame.columns {
        mapping.resolve(column)?;
    }

    let mut group = build_group(kind, frame, index, &index_name);
    if let Some(selector) = &decl.selector {
        group = group.with_selector(selector.clone());
    }
    match kind {
        GroupKind::Globals => {
            let key = decl.key.clone().unwrap_or_else(|| DEFAULT_GLOBALS_KEY.to_string());
            if !group.contains_index(&key) {
                group.append_row(key.clone(), Vec::new());
            }
            group = group.with_key(key);
        }
        GroupKind::GlobalConsts if group.is_empty() => {
            group.append_row("0", Vec::new());
        }
        _ => {}
    }
    log_exit!("LOAD", "finalize", "{} ({} rows, {} columns)", kind, group.len(), group.columns().len());
    Ok(group.with_strict(decl.strict_columns))
}

fn check_strict(kind: GroupKind, frame: &RawFrame, decl: &GroupDecl, index_name: &str) -> EngineResult<()> {
    let mut allowed: HashSet<&str> = decl.fields.iter().map(|f| f.name.as_str()).collect();
    allowed.insert(index_name);
    if let Some(selector) = &decl.selector {
        allowed.insert(selector);
    }
    let undeclared: Vec<&str> = frame
        .columns
        .iter()
        .map(String::as_str)
        .filter(|c| !allowed.contains(c))
        .collect();
    if undeclared.is_empty() {
        return Ok(());
    }
    Err(EngineError::StrictColumn {
        group: kind.name().to_string(),
        message: format!("undeclared column(s): {}", undeclared.join(", ")),
    })
}

fn derive_index(
    kind: GroupKind,
    frame: &RawFrame,
    decl: &GroupDecl,
    mapping: &mut MappingRegistry,
) -> EngineResult<Vec<String>> {
    let values = match &decl.index {
        Some(IndexSpec::Derived(FieldDecl {
            name,
            derivation: Some(derivation),
        })) => derive_column(frame, name, derivation, mapping)?,
        Some(IndexSpec::Column(name)) | Some(IndexSpec::Derived(FieldDecl { name, .. })) => {
            match frame.column_values(name) {
                Some(values) => values,
                None if frame.is_empty() => Vec::new(),
                None => {
                    return Err(EngineError::config(format!(
                        "Group '{}' has no index column '{}'",
                        kind, name
                    )))
                }
            }
        }
        None => match frame.column_values("index") {
            Some(values) => values,
            None if frame.is_empty() || kind.is_global() => {
                (0..frame.len()).map(|i| Value::Text(i.to_string())).collect()
            }
            None => {
                return Err(EngineError::config(format!(
                    "Group '{}' declares no 'index'",
                    kind
                )))
            }
        },
    };

    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            if value.is_missing() {
                Err(EngineError::config(format!(
                    "Row {} of group '{}' has no index value",
                    row, kind
                )))
            } else {
                Ok(value.display_value())
            }
        })
        .collect()
}

/// Computes a derived column for every row of `frame`.
fn derive_column(
    frame: &RawFrame,
    name: &str,
    derivation: &Derivation,
    mapping: &mut MappingRegistry,
) -> EngineResult<Vec<Value>> {
    let missing_source = |column: &str| {
        EngineError::config(format!(
            "Field '{}' reads column '{}', which is not in the frame",
            name, column
        ))
    };

    match derivation {
        Derivation::Constant(value) => Ok(vec![value.clone(); frame.len()]),
        Derivation::Field(column) => frame.column_values(column).ok_or_else(|| missing_source(column)),
        Derivation::Regex {
            source,
            pattern,
            group,
        } => {
            let regex = Regex::new(pattern)
                .map_err(|e| EngineError::config(format!("Field '{}': invalid regex: {}", name, e)))?;
            let values = frame.column_values(source).ok_or_else(|| missing_source(source))?;
            Ok(values
                .iter()
                .map(|value| {
                    let text = value.display_value();
                    regex
                        .captures(&text)
                        .and_then(|caps| caps.get(*group))
                        .map(|m| Value::Text(m.as_str().to_string()))
                        .unwrap_or_default()
                })
                .collect())
        }
        Derivation::Display(source) | Derivation::Liquid(source) => {
            let dialect = if matches!(derivation, Derivation::Liquid(_)) {
                Dialect::Liquid
            } else {
                Dialect::Display
            };
            let template = template::parse(dialect, source)?;
            let names = frame
                .columns
                .iter()
                .map(|c| mapping.resolve(c))
                .collect::<EngineResult<Vec<_>>>()?;
            let mut values = Vec::with_capacity(frame.len());
            for row in &frame.rows {
                let scope: HashMap<String, TemplateValue> = names
                    .iter()
                    .cloned()
                    .zip(row.iter().map(Value::to_template))
                    .collect();
                values.push(Value::Text(template::render(&template, &scope)?));
            }
            Ok(values)
        }
    }
}

/// One row per index value, holding the original rows as records.
fn flatten_series(
    frame: &RawFrame,
    index: &[String],
    index_name: &str,
    mapping: &mut MappingRegistry,
) -> EngineResult<RawFrame> {
    let mut order: Vec<&str> = Vec::new();
    let mut entries: HashMap<&str, Vec<Value>> = HashMap::new();
    for (row, key) in index.iter().enumerate() {
        let record = mapping.translate_record(frame.row_record(row))?;
        entries
            .entry(key.as_str())
            .or_insert_with(|| {
                order.push(key.as_str());
                Vec::new()
            })
            .push(Value::Record(record));
    }

    let mut flat = RawFrame::new(vec![index_name.to_string(), ENTRIES_COLUMN.to_string()]);
    for key in order {
        let items = entries.remove(key).unwrap_or_default();
        flat.rows.push(vec![Value::Text(key.to_string()), Value::List(items)]);
    }
    Ok(flat)
}

fn check_unique(kind: GroupKind, frame: &RawFrame, index: &[String], decl: &GroupDecl) -> EngineResult<()> {
    if kind.is_series() {
        let selector = decl.selector.as_deref().ok_or_else(|| {
            EngineError::config("The 'write_series' group needs a 'selector' column")
        })?;
        let values = frame.column_values(selector).unwrap_or_default();
        let mut seen = HashSet::new();
        for (key, value) in index.iter().zip(values.iter()) {
            let subindex = value.display_value();
            if !seen.insert((key.as_str(), subindex.clone())) {
                return Err(EngineError::config(format!(
                    "Duplicate sub-row ('{}', '{}') in group '{}'",
                    key, subindex, kind
                )));
            }
        }
        return Ok(());
    }

    let mut seen = HashSet::new();
    for key in index {
        if !seen.insert(key.as_str()) {
            return Err(EngineError::config(format!(
                "Duplicate index value '{}' in group '{}'; declare 'series: true' to collect repeated rows",
                key, kind
            )));
        }
    }
    Ok(())
}

fn build_group(kind: GroupKind, frame: RawFrame, index: Vec<String>, index_name: &str) -> ColumnGroup {
    let RawFrame { columns, rows } = frame;
    let mut values: Vec<Vec<Value>> = vec![Vec::with_capacity(rows.len()); columns.len()];
    for row in rows {
        for (i, cell) in row.into_iter().enumerate() {
            if let Some(column) = values.get_mut(i) {
                column.push(cell);
            }
        }
    }
    let columns = columns
        .into_iter()
        .zip(values)
        .map(|(name, values)| Column::new(name, values))
        .collect();
    ColumnGroup::from_columns(kind, index_name, index, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ColumnType;
    use serde_json::json;

    fn decl(json: serde_json::Value) -> GroupDecl {
        serde_json::from_value(json).unwrap()
    }

    fn papers() -> RawFrame {
        RawFrame::from_columns(vec![
            ("id", vec!["P1".into(), "P2".into()]),
            ("Paper Title", vec!["On Rust".into(), "On Types".into()]),
            ("Date", vec!["March 2021".into(), "2019-05-01".into()]),
            ("score", vec![3.0.into(), Value::Empty]),
        ])
    }

    #[test]
    fn builds_group_with_index_and_types() {
        let mut mapping = MappingRegistry::new();
        let group = finalize(GroupKind::Data, papers(), &decl(json!({"index": "id"})), &mut mapping).unwrap();
        assert_eq!(group.index(), &["P1".to_string(), "P2".to_string()]);
        assert!(!group.has_column("id"));
        assert_eq!(group.dtype("score"), Some(ColumnType::Number));
        assert_eq!(mapping.column_for("paperTitle"), Some("Paper Title"));
    }

    #[test]
    fn declared_columns_are_created() {
        let mut mapping = MappingRegistry::new();
        let d = decl(json!({"index": "id", "fields": ["comment"]}));
        let group = finalize(GroupKind::WriteData, papers(), &d, &mut mapping).unwrap();
        assert!(group.has_column("comment"));
        assert_eq!(group.get(0, "comment"), Some(&Value::Empty));
    }

    #[test]
    fn strict_groups_reject_extra_columns() {
        let mut mapping = MappingRegistry::new();
        let frame = RawFrame::from_columns(vec![
            ("id", vec!["A".into()]),
            ("a", vec![1.0.into()]),
            ("b", vec![2.0.into()]),
            ("c", vec![3.0.into()]),
        ]);
        let d = decl(json!({"index": "id", "fields": ["a", "b"], "strict_columns": true}));
        let err = finalize(GroupKind::WriteData, frame, &d, &mut mapping).unwrap_err();
        assert!(matches!(err, EngineError::StrictColumn { ref message, .. } if message.contains('c')));
    }

    #[test]
    fn derived_index_and_fields() {
        let mut mapping = MappingRegistry::new();
        let d = decl(json!({
            "index": {"name": "key", "display": "{id}-{paperTitle}"},
            "fields": [
                {"name": "year", "regex": "(\\d{4})", "source": "Date"},
                {"name": "round", "constant": 1},
                {"name": "shout", "liquid": "{{ paperTitle | upcase }}"}
            ]
        }));
        let group = finalize(GroupKind::Data, papers(), &d, &mut mapping).unwrap();
        assert_eq!(group.index()[0], "P1-On Rust");
        assert!(group.has_column("id"));
        assert_eq!(group.get(0, "year"), Some(&Value::from("2021")));
        assert_eq!(group.get(1, "year"), Some(&Value::from("2019")));
        assert_eq!(group.get(1, "round"), Some(&Value::from(1.0)));
        assert_eq!(group.get(1, "shout"), Some(&Value::from("ON TYPES")));
    }

    #[test]
    fn duplicate_index_needs_series() {
        let mut mapping = MappingRegistry::new();
        let frame = RawFrame::from_columns(vec![
            ("id", vec!["A".into(), "A".into(), "B".into()]),
            ("Reviewer Name", vec!["X".into(), "Y".into(), "Z".into()]),
        ]);
        let err = finalize(GroupKind::Data, frame.clone(), &decl(json!({"index": "id"})), &mut mapping)
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let d = decl(json!({"index": "id", "series": true}));
        let group = finalize(GroupKind::Data, frame, &d, &mut mapping).unwrap();
        assert_eq!(group.len(), 2);
        let Some(Value::List(entries)) = group.get(0, ENTRIES_COLUMN) else {
            panic!("expected entries list");
        };
        assert_eq!(entries.len(), 2);
        let Value::Record(first) = &entries[0] else {
            panic!("expected record");
        };
        assert_eq!(first.get("reviewerName"), Some(&Value::from("X")));
    }

    #[test]
    fn series_groups_check_selector_pairs() {
        let mut mapping = MappingRegistry::new();
        let frame = RawFrame::from_columns(vec![
            ("id", vec!["A".into(), "A".into()]),
            ("date", vec!["d1".into(), "d1".into()]),
        ]);
        let d = decl(json!({"index": "id", "selector": "date"}));
        assert!(finalize(GroupKind::WriteSeries, frame, &d, &mut mapping).is_err());
    }

    #[test]
    fn empty_writable_group_and_globals_row() {
        let mut mapping = MappingRegistry::new();
        let d = decl(json!({"index": "id", "fields": ["score"]}));
        let group = finalize(GroupKind::WriteData, RawFrame::default(), &d, &mut mapping).unwrap();
        assert!(group.is_empty());
        assert!(group.has_column("score"));

        let globals = finalize(GroupKind::Globals, RawFrame::default(), &decl(json!({})), &mut mapping).unwrap();
        assert_eq!(globals.locate(None, None), Some(0));
        assert_eq!(globals.key(), Some(DEFAULT_GLOBALS_KEY));
    }
}
