//! FILENAME: core/engine/src/group.rs
//! PURPOSE: A named table of typed columns sharing one string index.
//! CONTEXT: This file defines `ColumnGroup`, the container behind every layer
//! of the store (`data`, `write_data`, `write_series`, ...). Storage is
//! column-major; a side table maps index values to their first row so that
//! per-entity lookups stay cheap. Only `write_series` groups may repeat an
//! index value; their rows are told apart by the selector column.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::frame::RawFrame;
use crate::value::{ColumnType, Value};

// ============================================================================
// GROUP KINDS
// ============================================================================

/// The layer a group occupies. Declaration order is the read priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupKind {
    GlobalConsts,
    Globals,
    WriteSeries,
    WriteData,
    Cache,
    Data,
}

impl GroupKind {
    /// Fixed read priority used by every value lookup.
    pub const READ_ORDER: [GroupKind; 6] = [
        GroupKind::GlobalConsts,
        GroupKind::Globals,
        GroupKind::WriteSeries,
        GroupKind::WriteData,
        GroupKind::Cache,
        GroupKind::Data,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::GlobalConsts => "global_consts",
            GroupKind::Globals => "globals",
            GroupKind::WriteSeries => "write_series",
            GroupKind::WriteData => "write_data",
            GroupKind::Cache => "cache",
            GroupKind::Data => "data",
        }
    }

    /// Entity-independent groups; they are never filtered or aligned.
    pub fn is_global(&self) -> bool {
        matches!(self, GroupKind::GlobalConsts | GroupKind::Globals)
    }

    pub fn is_series(&self) -> bool {
        matches!(self, GroupKind::WriteSeries)
    }

    /// Groups the user may write through `set_value`.
    pub fn is_user_writable(&self) -> bool {
        !matches!(self, GroupKind::Cache | GroupKind::Data)
    }

    /// Groups written back by `save_flows`.
    pub fn is_persisted(&self) -> bool {
        self.is_user_writable()
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// COLUMNS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub dtype: ColumnType,
    pub values: Vec<Value>,
}

impl Column {
    /// Builds a column and infers its type from the values.
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        let dtype = ColumnType::infer(values.iter());
        Column {
            name: name.into(),
            dtype,
            values,
        }
    }
}

/// Result of a cell write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellWrite {
    Stored,
    /// The column had to be widened; carries the previous type.
    Widened(ColumnType),
    /// Row or column does not exist.
    Missing,
}

// ============================================================================
// COLUMN GROUP
// ============================================================================

#[derive(Debug, Clone)]
pub struct ColumnGroup {
    kind: GroupKind,
    index_name: String,
    index: Vec<String>,
    columns: Vec<Column>,
    /// Column that tells apart the sub-rows of one entity (series only).
    selector: Option<String>,
    /// Row of a `globals` group holding the values in use.
    key: Option<String>,
    strict: bool,
    /// First row of every index value.
    lookup: HashMap<String, usize>,
}

impl ColumnGroup {
    /// Creates an empty group.
    pub fn new(kind: GroupKind, index_name: impl Into<String>) -> Self {
        ColumnGroup {
            kind,
            index_name: index_name.into(),
            index: Vec::new(),
            columns: Vec::new(),
            selector: None,
            key: None,
            strict: false,
            lookup: HashMap::new(),
        }
    }

    /// Creates a group from an index and its columns. Columns shorter than the
    /// index are padded with `Empty`.
    pub fn from_columns(
        kind: GroupKind,
        index_name: impl Into<String>,
        index: Vec<String>,
        columns: Vec<Column>,
    ) -> Self {
        let mut group = ColumnGroup::new(kind, index_name);
        let height = index.len();
        group.index = index;
        group.columns = columns
            .into_iter()
            .map(|mut c| {
                c.values.resize(height, Value::Empty);
                c
            })
            .collect();
        group.rebuild_lookup();
        group
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        let selector = selector.into();
        self.ensure_column(&selector, ColumnType::Object);
        self.selector = Some(selector);
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    /// Index values without repetition, in first-seen order.
    pub fn unique_index(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.index
            .iter()
            .filter(|i| seen.insert(i.as_str()))
            .cloned()
            .collect()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn dtype(&self, name: &str) -> Option<ColumnType> {
        self.column(name).map(|c| c.dtype)
    }

    /// Adds an empty column. Returns false when it already exists.
    pub fn ensure_column(&mut self, name: &str, dtype: ColumnType) -> bool {
        if self.has_column(name) {
            return false;
        }
        self.columns.push(Column {
            name: name.to_string(),
            dtype,
            values: vec![Value::Empty; self.index.len()],
        });
        true
    }

    // ========================================================================
    // ROW LOOKUP
    // ========================================================================

    pub fn contains_index(&self, index: &str) -> bool {
        self.lookup.contains_key(index)
    }

    /// First row for an index value.
    pub fn row_of(&self, index: &str) -> Option<usize> {
        self.lookup.get(index).copied()
    }

    /// Every row of an index value, in storage order.
    pub fn rows_of(&self, index: &str) -> Vec<usize> {
        self.index
            .iter()
            .enumerate()
            .filter(|(_, i)| *i == index)
            .map(|(row, _)| row)
            .collect()
    }

    /// Selector values of the sub-rows of `index`, in storage order.
    pub fn subindices(&self, index: &str) -> Vec<String> {
        let Some(selector) = self.selector.as_deref().and_then(|s| self.column(s)) else {
            return Vec::new();
        };
        self.rows_of(index)
            .into_iter()
            .map(|row| selector.values[row].display_value())
            .collect()
    }

    /// The row of `(index, subindex)` in a series group.
    pub fn series_row(&self, index: &str, subindex: &str) -> Option<usize> {
        let selector = self.column(self.selector.as_deref()?)?;
        self.rows_of(index)
            .into_iter()
            .find(|&row| selector.values[row].display_value() == subindex)
    }

    /// Resolves the row addressed by a cursor position, according to the
    /// group kind.
    pub fn locate(&self, index: Option<&str>, subindex: Option<&str>) -> Option<usize> {
        match self.kind {
            GroupKind::GlobalConsts => (!self.is_empty()).then_some(0),
            GroupKind::Globals => match self.key.as_deref() {
                Some(key) => self.row_of(key),
                None => (!self.is_empty()).then_some(0),
            },
            GroupKind::WriteSeries => self.series_row(index?, subindex?),
            _ => self.row_of(index?),
        }
    }

    // ========================================================================
    // CELLS
    // ========================================================================

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        self.column(column)?.values.get(row)
    }

    /// Writes one cell, widening the column type when the value does not fit.
    pub fn set(&mut self, row: usize, column: &str, value: Value) -> CellWrite {
        let Some(col) = self.column_mut(column) else {
            return CellWrite::Missing;
        };
        let Some(cell) = col.values.get_mut(row) else {
            return CellWrite::Missing;
        };
        *cell = value;
        if col.dtype.accepts(cell) {
            CellWrite::Stored
        } else {
            let previous = col.dtype;
            col.dtype = ColumnType::Object;
            CellWrite::Widened(previous)
        }
    }

    pub fn column_values(&self, column: &str) -> Option<Vec<Value>> {
        self.column(column).map(|c| c.values.clone())
    }

    /// Values of one column across the sub-rows of `index`.
    pub fn series_values(&self, index: &str, column: &str) -> Vec<Value> {
        let Some(col) = self.column(column) else {
            return Vec::new();
        };
        self.rows_of(index)
            .into_iter()
            .map(|row| col.values[row].clone())
            .collect()
    }

    /// The cells of one row keyed by column name.
    pub fn row_values(&self, row: usize) -> Vec<(String, Value)> {
        self.columns
            .iter()
            .map(|c| (c.name.clone(), c.values.get(row).cloned().unwrap_or_default()))
            .collect()
    }

    // ========================================================================
    // ROWS
    // ========================================================================

    /// Appends a row. Cells not given are `Empty`; unknown columns are added.
    pub fn append_row(
        &mut self,
        index: impl Into<String>,
        cells: impl IntoIterator<Item = (String, Value)>,
    ) -> usize {
        let index = index.into();
        let row = self.index.len();
        self.lookup.entry(index.clone()).or_insert(row);
        self.index.push(index);
        for column in self.columns.iter_mut() {
            column.values.push(Value::Empty);
        }
        for (name, value) in cells {
            if !self.has_column(&name) {
                self.ensure_column(&name, ColumnType::Object);
            }
            self.set(row, &name, value);
        }
        row
    }

    /// Keeps the rows whose index value satisfies `keep`.
    pub fn retain_index(&mut self, mut keep: impl FnMut(&str) -> bool) {
        let mask: Vec<bool> = self.index.iter().map(|i| keep(i)).collect();
        self.retain_mask(&mask);
    }

    /// Keeps the rows whose mask entry is true.
    pub fn retain_mask(&mut self, mask: &[bool]) {
        let keep = |row: usize| mask.get(row).copied().unwrap_or(false);
        let rows: Vec<usize> = (0..self.index.len()).filter(|&r| keep(r)).collect();
        self.take_rows(&rows);
    }

    /// Reorders rows to follow `order`. Rows of an index value keep their
    /// relative order; index values missing from the group get an empty row
    /// unless the group is a series; rows whose index is not in `order` are
    /// kept at the end. Returns the number of such leftover rows.
    pub fn align_to(&mut self, order: &[String]) -> usize {
        let mut rows = Vec::with_capacity(self.index.len());
        let mut placed = vec![false; self.index.len()];
        let mut missing = Vec::new();
        for index in order {
            let found = self.rows_of(index);
            if found.is_empty() && !self.kind.is_series() {
                missing.push(index.clone());
            }
            for row in found {
                if !placed[row] {
                    placed[row] = true;
                    rows.push(row);
                }
            }
        }
        let leftovers: Vec<usize> = (0..self.index.len()).filter(|&r| !placed[r]).collect();
        let leftover_count = leftovers.len();
        rows.extend(leftovers);
        self.take_rows(&rows);
        for index in missing {
            self.append_row(index, Vec::new());
        }
        // Empty rows belong next to their index in the requested order.
        if !self.kind.is_series() {
            let position: HashMap<&str, usize> =
                order.iter().enumerate().map(|(i, v)| (v.as_str(), i)).collect();
            let mut rows: Vec<usize> = (0..self.index.len()).collect();
            rows.sort_by_key(|&r| position.get(self.index[r].as_str()).copied().unwrap_or(usize::MAX));
            self.take_rows(&rows);
        }
        leftover_count
    }

    /// Adds the columns of `other` to matching rows by index. Columns already
    /// present here are left alone; rows without a match stay empty.
    pub fn left_join(&mut self, other: &ColumnGroup) -> Vec<String> {
        let mut joined = Vec::new();
        for column in other.columns() {
            if self.has_column(&column.name) {
                continue;
            }
            self.ensure_column(&column.name, column.dtype);
            for row in 0..self.index.len() {
                if let Some(source_row) = other.row_of(&self.index[row]) {
                    let value = column.values[source_row].clone();
                    self.set(row, &column.name, value);
                }
            }
            joined.push(column.name.clone());
        }
        joined
    }

    fn take_rows(&mut self, rows: &[usize]) {
        self.index = rows.iter().map(|&r| self.index[r].clone()).collect();
        for column in self.columns.iter_mut() {
            column.values = rows.iter().map(|&r| column.values[r].clone()).collect();
        }
        self.rebuild_lookup();
    }

    fn rebuild_lookup(&mut self) {
        self.lookup.clear();
        for (row, index) in self.index.iter().enumerate() {
            self.lookup.entry(index.clone()).or_insert(row);
        }
    }

    /// Exports the group with its index as the first column.
    pub fn to_frame(&self) -> RawFrame {
        let mut columns = vec![self.index_name.clone()];
        columns.extend(self.columns.iter().map(|c| c.name.clone()));
        let rows = (0..self.index.len())
            .map(|row| {
                let mut cells = vec![Value::Text(self.index[row].clone())];
                cells.extend(self.columns.iter().map(|c| c.values[row].clone()));
                cells
            })
            .collect();
        RawFrame { columns, rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ColumnGroup {
        ColumnGroup::from_columns(
            GroupKind::Data,
            "id",
            vec!["A".into(), "B".into(), "C".into()],
            vec![
                Column::new("score", vec![1.0.into(), 2.0.into(), Value::Empty]),
                Column::new("title", vec!["x".into(), "y".into(), "z".into()]),
            ],
        )
    }

    fn series() -> ColumnGroup {
        let mut group = ColumnGroup::new(GroupKind::WriteSeries, "id").with_selector("date");
        group.append_row("A", vec![("date".to_string(), Value::from("d1"))]);
        group.append_row("B", vec![("date".to_string(), Value::from("d2"))]);
        group.append_row("A", vec![("date".to_string(), Value::from("d3"))]);
        group
    }

    #[test]
    fn read_order_matches_declaration_order() {
        let mut kinds = GroupKind::READ_ORDER.to_vec();
        kinds.sort();
        assert_eq!(kinds, GroupKind::READ_ORDER.to_vec());
    }

    #[test]
    fn lookup_by_index() {
        let group = sample();
        assert_eq!(group.row_of("B"), Some(1));
        assert_eq!(group.get(1, "title"), Some(&Value::from("y")));
        assert_eq!(group.locate(Some("C"), None), Some(2));
        assert_eq!(group.locate(Some("Z"), None), None);
    }

    #[test]
    fn writing_text_into_number_column_widens() {
        let mut group = sample();
        assert_eq!(group.dtype("score"), Some(ColumnType::Number));
        let result = group.set(0, "score", Value::from("N/A"));
        assert_eq!(result, CellWrite::Widened(ColumnType::Number));
        assert_eq!(group.dtype("score"), Some(ColumnType::Object));
        assert_eq!(group.set(1, "score", Value::from(3.0)), CellWrite::Stored);
        assert_eq!(group.dtype("score"), Some(ColumnType::Object));
    }

    #[test]
    fn set_on_unknown_column_reports_missing() {
        let mut group = sample();
        assert_eq!(group.set(0, "nope", Value::from(1.0)), CellWrite::Missing);
        assert_eq!(group.set(10, "score", Value::from(1.0)), CellWrite::Missing);
    }

    #[test]
    fn series_rows_by_selector() {
        let group = series();
        assert_eq!(group.subindices("A"), vec!["d1", "d3"]);
        assert_eq!(group.series_row("A", "d3"), Some(2));
        assert_eq!(group.locate(Some("A"), Some("d1")), Some(0));
        assert_eq!(group.locate(Some("A"), None), None);
        assert_eq!(group.unique_index(), vec!["A", "B"]);
    }

    #[test]
    fn retain_keeps_matching_rows() {
        let mut group = sample();
        group.retain_index(|i| i != "B");
        assert_eq!(group.index(), &["A".to_string(), "C".to_string()]);
        assert_eq!(group.row_of("C"), Some(1));
        assert_eq!(group.get(1, "title"), Some(&Value::from("z")));
    }

    #[test]
    fn align_reorders_and_fills_gaps() {
        let mut group = sample();
        let leftovers = group.align_to(&["C".into(), "D".into(), "A".into()]);
        assert_eq!(leftovers, 1);
        assert_eq!(
            group.index(),
            &["C".to_string(), "D".to_string(), "A".to_string(), "B".to_string()]
        );
        assert_eq!(group.get(1, "title"), Some(&Value::Empty));
        assert_eq!(group.get(2, "title"), Some(&Value::from("x")));
    }

    #[test]
    fn align_series_groups_entity_rows() {
        let mut group = series();
        group.align_to(&["B".into(), "A".into()]);
        assert_eq!(group.subindices("A"), vec!["d1", "d3"]);
        assert_eq!(group.index()[0], "B");
        assert_eq!(group.len(), 3);
    }

    #[test]
    fn left_join_adds_new_columns_only() {
        let mut group = sample();
        let extra = ColumnGroup::from_columns(
            GroupKind::Data,
            "id",
            vec!["C".into(), "A".into()],
            vec![
                Column::new("venue", vec!["Nature".into(), "Cell".into()]),
                Column::new("title", vec!["other".into(), "other".into()]),
            ],
        );
        let joined = group.left_join(&extra);
        assert_eq!(joined, vec!["venue"]);
        assert_eq!(group.get(0, "venue"), Some(&Value::from("Cell")));
        assert_eq!(group.get(1, "venue"), Some(&Value::Empty));
        assert_eq!(group.get(0, "title"), Some(&Value::from("x")));
    }

    #[test]
    fn frame_export_puts_index_first() {
        let frame = sample().to_frame();
        assert_eq!(frame.columns, vec!["id", "score", "title"]);
        assert_eq!(frame.rows[2][0], Value::from("C"));
    }
}
