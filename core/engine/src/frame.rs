//! FILENAME: core/engine/src/frame.rs
//! PURPOSE: Row-major table exchanged with storage collaborators.
//! CONTEXT: `RawFrame` is what a `GroupSource` hands the finalizer at load
//! time and what `save_flows` hands back. It has no index and no column
//! types; the finalizer turns it into a `ColumnGroup`.

use std::collections::BTreeMap;

use crate::value::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RawFrame {
    pub fn new(columns: Vec<String>) -> Self {
        RawFrame {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a frame from records. Column order follows first appearance.
    pub fn from_records(records: Vec<BTreeMap<String, Value>>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for key in record.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .into_iter()
            .map(|mut record| {
                columns
                    .iter()
                    .map(|c| record.remove(c).unwrap_or_default())
                    .collect()
            })
            .collect();
        RawFrame { columns, rows }
    }

    /// Builds a frame from `(column, values)` pairs of equal length.
    pub fn from_columns(columns: Vec<(&str, Vec<Value>)>) -> Self {
        let height = columns.iter().map(|(_, v)| v.len()).max().unwrap_or(0);
        let names = columns.iter().map(|(n, _)| n.to_string()).collect();
        let mut rows = vec![Vec::with_capacity(columns.len()); height];
        for (_, values) in columns {
            let mut values = values.into_iter();
            for row in rows.iter_mut() {
                row.push(values.next().unwrap_or_default());
            }
        }
        RawFrame {
            columns: names,
            rows,
        }
    }

    pub fn records(&self) -> Vec<BTreeMap<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.position(column).is_some()
    }

    /// Adds a column filled with `Empty` if it does not exist yet.
    pub fn ensure_column(&mut self, column: &str) {
        if !self.has_column(column) {
            self.columns.push(column.to_string());
            for row in self.rows.iter_mut() {
                row.push(Value::Empty);
            }
        }
    }

    /// Replaces (or appends) a whole column.
    pub fn set_column(&mut self, column: &str, values: Vec<Value>) {
        self.ensure_column(column);
        let pos = self.columns.iter().position(|c| c == column).unwrap_or(0);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[pos] = value;
        }
    }

    /// Removes a column and returns its values.
    pub fn take_column(&mut self, column: &str) -> Option<Vec<Value>> {
        let pos = self.position(column)?;
        self.columns.remove(pos);
        Some(self.rows.iter_mut().map(|row| row.remove(pos)).collect())
    }

    pub fn column_values(&self, column: &str) -> Option<Vec<Value>> {
        let pos = self.position(column)?;
        Some(self.rows.iter().map(|row| row[pos].clone()).collect())
    }

    pub fn row_record(&self, row: usize) -> BTreeMap<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[row].iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_round_trip_keeps_missing_cells_empty() {
        let mut a = BTreeMap::new();
        a.insert("id".to_string(), Value::from("A"));
        let mut b = BTreeMap::new();
        b.insert("id".to_string(), Value::from("B"));
        b.insert("title".to_string(), Value::from("T"));
        let frame = RawFrame::from_records(vec![a, b]);
        assert_eq!(frame.columns, vec!["id", "title"]);
        assert_eq!(frame.rows[0][1], Value::Empty);
        assert_eq!(frame.records()[1]["title"], Value::from("T"));
    }

    #[test]
    fn take_column_removes_it() {
        let mut frame = RawFrame::from_columns(vec![
            ("id", vec!["A".into(), "B".into()]),
            ("x", vec![1.0.into(), 2.0.into()]),
        ]);
        let ids = frame.take_column("id").unwrap();
        assert_eq!(ids, vec![Value::from("A"), Value::from("B")]);
        assert_eq!(frame.columns, vec!["x"]);
        assert_eq!(frame.rows[1], vec![Value::from(2.0)]);
    }
}
