//! FILENAME: core/engine/src/store.rs
//! PURPOSE: Merges the column groups into one cursor-addressable row.
//! CONTEXT: `LayeredStore` owns at most one group of each kind. Reads walk the
//! groups in the fixed priority `global_consts -> globals -> write_series ->
//! write_data -> cache -> data` and the first group holding the column wins.
//! Writes go to the group owning the column and are refused for `data` and
//! `cache` unless they come from the compute engine.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::Local;

use crate::cursor::Cursor;
use crate::error::{EngineError, EngineResult};
use crate::group::{CellWrite, ColumnGroup, GroupKind};
use crate::value::{ColumnType, Value};
use crate::{log_debug, log_info, log_warn};

/// Timestamp layout used for generated selector values.
const SELECTOR_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, Default)]
pub struct LayeredStore {
    groups: BTreeMap<GroupKind, ColumnGroup>,
}

impl LayeredStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // GROUPS
    // ========================================================================

    /// Installs a group, replacing any group of the same kind.
    pub fn insert_group(&mut self, group: ColumnGroup) -> Option<ColumnGroup> {
        log_debug!(
            "STORE",
            "insert group {} ({} rows, {} columns)",
            group.kind(),
            group.len(),
            group.columns().len()
        );
        self.groups.insert(group.kind(), group)
    }

    pub fn group(&self, kind: GroupKind) -> Option<&ColumnGroup> {
        self.groups.get(&kind)
    }

    pub fn group_mut(&mut self, kind: GroupKind) -> Option<&mut ColumnGroup> {
        self.groups.get_mut(&kind)
    }

    pub fn has_group(&self, kind: GroupKind) -> bool {
        self.groups.contains_key(&kind)
    }

    /// Groups in read priority order.
    pub fn groups(&self) -> impl Iterator<Item = &ColumnGroup> {
        self.groups.values()
    }

    /// The group defining the entity list: `data`, else `write_data`, else `cache`.
    pub fn primary(&self) -> Option<&ColumnGroup> {
        [GroupKind::Data, GroupKind::WriteData, GroupKind::Cache]
            .iter()
            .find_map(|kind| self.groups.get(kind))
    }

    /// Name of the selector column of `write_series`, if any.
    pub fn selector(&self) -> Option<&str> {
        self.group(GroupKind::WriteSeries).and_then(|g| g.selector())
    }

    // ========================================================================
    // INDEX
    // ========================================================================

    /// Entity identifiers in primary-index order.
    pub fn get_indices(&self) -> Vec<String> {
        self.primary().map(|g| g.unique_index()).unwrap_or_default()
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.primary().is_some_and(|g| g.contains_index(index))
    }

    /// Selector values of the sub-rows of `index`, in insertion order.
    pub fn get_subindices(&self, index: &str) -> Vec<String> {
        self.group(GroupKind::WriteSeries)
            .map(|g| g.subindices(index))
            .unwrap_or_default()
    }

    /// Appends an empty row for `index` to every per-entity group that lacks it.
    /// Returns false when the entity already existed.
    pub fn add_row(&mut self, index: &str) -> bool {
        if self.has_index(index) {
            return false;
        }
        for kind in [GroupKind::WriteData, GroupKind::Cache, GroupKind::Data] {
            if let Some(group) = self.groups.get_mut(&kind) {
                if !group.contains_index(index) {
                    group.append_row(index, Vec::new());
                }
            }
        }
        log_info!("STORE", "added row {}", index);
        true
    }

    /// Appends a `write_series` row for `index` with a generated selector
    /// value and returns that value.
    pub fn add_series_row(&mut self, index: &str) -> EngineResult<String> {
        if !self.has_index(index) {
            return Err(EngineError::InvalidIndex(index.to_string()));
        }
        let group = self
            .groups
            .get_mut(&GroupKind::WriteSeries)
            .ok_or_else(|| EngineError::config("No 'write_series' group is configured"))?;
        let selector = group
            .selector()
            .map(str::to_string)
            .ok_or_else(|| EngineError::config("The 'write_series' group has no selector"))?;

        let existing: HashSet<String> = group.subindices(index).into_iter().collect();
        let stamp = Local::now().format(SELECTOR_FORMAT).to_string();
        let mut value = stamp.clone();
        let mut n = 1;
        while existing.contains(&value) {
            n += 1;
            value = format!("{}#{}", stamp, n);
        }

        group.append_row(index, vec![(selector, Value::Text(value.clone()))]);
        log_info!("STORE", "added series row {} / {}", index, value);
        Ok(value)
    }

    /// Returns the cursor with a valid subindex for its entity: the current
    /// one if still valid, else the first sub-row, else a newly created one.
    /// Without a `write_series` group the subindex is cleared.
    pub fn check_or_set_subseries(&mut self, cursor: &Cursor) -> EngineResult<Cursor> {
        let Some(selector) = self.selector().map(str::to_string) else {
            return Ok(cursor.clone().with_subindex(None).with_selector(None));
        };
        let index = cursor
            .index()
            .ok_or_else(|| EngineError::InvalidIndex(String::new()))?
            .to_string();
        let subindices = self.get_subindices(&index);
        let subindex = match cursor.subindex() {
            Some(current) if subindices.iter().any(|s| s == current) => current.to_string(),
            _ => match subindices.into_iter().next() {
                Some(first) => first,
                None => self.add_series_row(&index)?,
            },
        };
        Ok(cursor
            .clone()
            .with_selector(Some(selector))
            .with_subindex(Some(subindex)))
    }

    // ========================================================================
    // VALUES
    // ========================================================================

    /// The group a read of `column` resolves to at `cursor`, with its row.
    fn read_location(&self, cursor: &Cursor, column: &str) -> Option<(GroupKind, usize)> {
        for kind in GroupKind::READ_ORDER {
            let Some(group) = self.groups.get(&kind) else {
                continue;
            };
            if kind.is_series() && cursor.subindex().is_none() {
                continue;
            }
            if !group.has_column(column) {
                continue;
            }
            if let Some(row) = group.locate(cursor.index(), cursor.subindex()) {
                return Some((kind, row));
            }
        }
        None
    }

    /// The value of the cursor's column.
    pub fn get_value(&self, cursor: &Cursor) -> Value {
        match cursor.column() {
            Some(column) => self.get_value_column(cursor, column),
            None => Value::Empty,
        }
    }

    /// The value of `column` at the cursor position. The primary index name
    /// reads as the current entity; `Empty` if no group holds the column.
    pub fn get_value_column(&self, cursor: &Cursor, column: &str) -> Value {
        match self.read_location(cursor, column) {
            Some((kind, row)) => self.groups[&kind]
                .get(row, column)
                .cloned()
                .unwrap_or_default(),
            None if self.is_index_name(column) => cursor
                .index()
                .map(|i| Value::Text(i.to_string()))
                .unwrap_or_default(),
            None => {
                log_debug!("STORE", "no value for {} at {}", column, cursor);
                Value::Empty
            }
        }
    }

    /// Whether `column` names the primary index.
    pub fn is_index_name(&self, column: &str) -> bool {
        self.primary().is_some_and(|g| g.index_name() == column)
    }

    /// Whether any group has `column`.
    pub fn has_column(&self, column: &str) -> bool {
        self.owner(column).is_some()
    }

    /// The highest-priority group declaring `column`.
    pub fn owner(&self, column: &str) -> Option<GroupKind> {
        GroupKind::READ_ORDER
            .into_iter()
            .find(|kind| self.groups.get(kind).is_some_and(|g| g.has_column(column)))
    }

    /// Writes the cursor's column.
    pub fn set_value(&mut self, cursor: &Cursor, value: Value) -> EngineResult<()> {
        let column = cursor
            .column()
            .ok_or_else(|| EngineError::config("The cursor has no current column"))?
            .to_string();
        self.set_value_column(cursor, value, &column)
    }

    /// Writes `column` at the cursor position. The column must live in a
    /// user-writable group; an unknown column is added first.
    pub fn set_value_column(&mut self, cursor: &Cursor, value: Value, column: &str) -> EngineResult<()> {
        let kind = match self.owner(column) {
            Some(kind) if kind.is_user_writable() => kind,
            Some(kind) => {
                return Err(EngineError::ReadOnly {
                    group: kind.name().to_string(),
                    column: column.to_string(),
                })
            }
            None => self.add_column(column)?,
        };
        self.write_cell(kind, cursor, column, value)
    }

    /// Where a computed value for `column` lands: its owner unless that is
    /// `data`; an unknown column goes to `cache` when one exists, else to the
    /// group accepting new columns. `None` when the value cannot be stored.
    pub fn computed_target(&self, column: &str) -> Option<GroupKind> {
        match self.owner(column) {
            Some(GroupKind::Data) => None,
            Some(kind) => Some(kind),
            None if self.has_group(GroupKind::Cache) => Some(GroupKind::Cache),
            None => self.new_column_group().ok(),
        }
    }

    /// Write path of the compute engine; `cache` is writable here.
    pub fn write_computed(&mut self, cursor: &Cursor, column: &str, value: Value) -> EngineResult<()> {
        let kind = self.computed_target(column).ok_or_else(|| EngineError::ReadOnly {
            group: GroupKind::Data.name().to_string(),
            column: column.to_string(),
        })?;
        if let Some(group) = self.groups.get_mut(&kind) {
            if group.ensure_column(column, ColumnType::Object) {
                log_debug!("STORE", "added computed column {} to {}", column, kind);
            }
        }
        self.write_cell(kind, cursor, column, value)
    }

    fn write_cell(&mut self, kind: GroupKind, cursor: &Cursor, column: &str, value: Value) -> EngineResult<()> {
        let group = self
            .groups
            .get_mut(&kind)
            .ok_or_else(|| EngineError::config(format!("Group '{}' is not configured", kind)))?;
        let row = group
            .locate(cursor.index(), cursor.subindex())
            .ok_or_else(|| missing_row(kind, cursor))?;
        match group.set(row, column, value) {
            CellWrite::Stored => Ok(()),
            CellWrite::Widened(previous) => {
                log_warn!(
                    "STORE",
                    "column {}.{} widened from {} to object",
                    kind,
                    column,
                    previous.name()
                );
                Ok(())
            }
            CellWrite::Missing => Err(missing_row(kind, cursor)),
        }
    }

    fn new_column_group(&self) -> EngineResult<GroupKind> {
        let candidates = [GroupKind::WriteSeries, GroupKind::WriteData];
        if let Some(kind) = candidates
            .iter()
            .copied()
            .find(|kind| self.groups.get(kind).is_some_and(|g| !g.is_strict()))
        {
            return Ok(kind);
        }
        let writable: Vec<&str> = candidates
            .iter()
            .filter(|kind| self.has_group(**kind))
            .map(|kind| kind.name())
            .collect();
        Err(EngineError::StrictColumn {
            group: if writable.is_empty() {
                "none".to_string()
            } else {
                writable.join(", ")
            },
            message: "no writable group accepts new columns".to_string(),
        })
    }

    /// Adds an empty column to the writable group accepting new columns,
    /// `write_series` before `write_data`.
    pub fn add_column(&mut self, name: &str) -> EngineResult<GroupKind> {
        if let Some(kind) = self.owner(name) {
            return Ok(kind);
        }
        let kind = self.new_column_group()?;
        if let Some(group) = self.groups.get_mut(&kind) {
            group.ensure_column(name, ColumnType::Object);
        }
        log_info!("STORE", "added column {} to {}", name, kind);
        Ok(kind)
    }

    /// A whole column across all entities, in primary-index order.
    pub fn column_vector(&self, column: &str) -> Vec<Value> {
        self.get_indices()
            .into_iter()
            .map(|index| self.get_value_column(&Cursor::at(index), column))
            .collect()
    }

    /// A column across the sub-rows of `index`.
    pub fn series_vector(&self, index: &str, column: &str) -> Vec<Value> {
        match self.group(GroupKind::WriteSeries) {
            Some(group) if group.has_column(column) => group.series_values(index, column),
            _ => Vec::new(),
        }
    }

    // ========================================================================
    // ROW SETS
    // ========================================================================

    /// Restricts every entity group to the primary-index entries whose mask
    /// entry is true. Returns the number of entities kept.
    pub fn filter_rows(&mut self, mask: &[bool]) -> usize {
        let keep: HashSet<String> = self
            .get_indices()
            .into_iter()
            .zip(mask.iter().copied().chain(std::iter::repeat(false)))
            .filter(|(_, keep)| *keep)
            .map(|(index, _)| index)
            .collect();
        for group in self.groups.values_mut() {
            if !group.kind().is_global() {
                group.retain_index(|i| keep.contains(i));
            }
        }
        log_info!("STORE", "filter kept {} rows", keep.len());
        keep.len()
    }

    /// Reorders the entity groups by the values of `column`; missing values
    /// sort last whatever the direction.
    pub fn sort_by(&mut self, column: &str, ascending: bool) {
        let mut keyed: Vec<(String, Value)> = self
            .get_indices()
            .into_iter()
            .map(|index| {
                let value = self.get_value_column(&Cursor::at(index.clone()), column);
                (index, value)
            })
            .collect();
        keyed.sort_by(|(_, a), (_, b)| match (a.is_missing(), b.is_missing()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) if ascending => compare_values(a, b),
            (false, false) => compare_values(b, a),
        });
        let order: Vec<String> = keyed.into_iter().map(|(index, _)| index).collect();
        self.align_to(&order);
        log_info!("STORE", "sorted by {} ({})", column, if ascending { "asc" } else { "desc" });
    }

    /// Aligns every entity group to the primary index.
    pub fn align(&mut self) {
        let order = self.get_indices();
        self.align_to(&order);
    }

    fn align_to(&mut self, order: &[String]) {
        for group in self.groups.values_mut() {
            if group.kind().is_global() {
                continue;
            }
            let leftovers = group.align_to(order);
            if leftovers > 0 {
                log_warn!(
                    "STORE",
                    "{} rows of {} have no entity in the primary index",
                    leftovers,
                    group.kind()
                );
            }
        }
    }
}

fn missing_row(kind: GroupKind, cursor: &Cursor) -> EngineError {
    let index = cursor.index().unwrap_or_default().to_string();
    match (kind, cursor.subindex()) {
        (GroupKind::WriteSeries, Some(subindex)) => EngineError::InvalidSubindex {
            index,
            subindex: subindex.to_string(),
        },
        (GroupKind::WriteSeries, None) => EngineError::InvalidSubindex {
            index,
            subindex: String::new(),
        },
        _ => EngineError::InvalidIndex(index),
    }
}

/// Numbers compare numerically, everything else by display text.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        _ => a.display_value().cmp(&b.display_value()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Column;

    fn store() -> LayeredStore {
        let mut store = LayeredStore::new();
        store.insert_group(ColumnGroup::from_columns(
            GroupKind::Data,
            "id",
            vec!["A".into(), "B".into()],
            vec![
                Column::new("title", vec!["Alpha".into(), "Beta".into()]),
                Column::new("score", vec![1.0.into(), 2.0.into()]),
            ],
        ));
        store.insert_group(ColumnGroup::from_columns(
            GroupKind::WriteData,
            "id",
            vec!["A".into(), "B".into()],
            vec![Column::new("score", vec![10.0.into(), Value::Empty])],
        ));
        store.insert_group(ColumnGroup::new(GroupKind::WriteSeries, "id").with_selector("date"));
        store
    }

    #[test]
    fn write_data_shadows_data() {
        let store = store();
        let cursor = Cursor::at("A").with_column("score");
        assert_eq!(store.get_value(&cursor), Value::from(10.0));
        assert_eq!(store.get_value_column(&cursor, "title"), Value::from("Alpha"));
        assert_eq!(store.get_value_column(&cursor, "id"), Value::from("A"));
    }

    #[test]
    fn data_columns_are_read_only() {
        let mut store = store();
        let err = store
            .set_value_column(&Cursor::at("A"), Value::from("x"), "title")
            .unwrap_err();
        assert!(matches!(err, EngineError::ReadOnly { .. }));
    }

    #[test]
    fn unknown_column_goes_to_series_first() {
        let mut store = store();
        let kind = store.add_column("comment").unwrap();
        assert_eq!(kind, GroupKind::WriteSeries);
    }

    #[test]
    fn strict_groups_refuse_new_columns() {
        let mut store = LayeredStore::new();
        store.insert_group(ColumnGroup::new(GroupKind::WriteData, "id").with_strict(true));
        let err = store.add_column("extra").unwrap_err();
        assert!(matches!(err, EngineError::StrictColumn { .. }));
    }

    #[test]
    fn series_rows_get_unique_selectors() {
        let mut store = store();
        let first = store.add_series_row("A").unwrap();
        let second = store.add_series_row("A").unwrap();
        assert_ne!(first, second);
        assert_eq!(store.get_subindices("A"), vec![first, second]);
        assert!(store.get_subindices("B").is_empty());
    }

    #[test]
    fn series_row_for_absent_entity_is_invalid() {
        let mut store = store();
        assert!(matches!(
            store.add_series_row("Z"),
            Err(EngineError::InvalidIndex(_))
        ));
    }

    #[test]
    fn check_or_set_subseries_creates_one_row() {
        let mut store = store();
        let cursor = store.check_or_set_subseries(&Cursor::at("B")).unwrap();
        assert_eq!(store.get_subindices("B").len(), 1);
        assert_eq!(cursor.subindex, Some(store.get_subindices("B")[0].clone()));
        let again = store.check_or_set_subseries(&cursor).unwrap();
        assert_eq!(again, cursor);
        assert_eq!(store.get_subindices("B").len(), 1);
    }

    #[test]
    fn computed_values_may_land_in_cache() {
        let mut store = store();
        store.insert_group(ColumnGroup::from_columns(
            GroupKind::Cache,
            "id",
            vec!["A".into(), "B".into()],
            Vec::new(),
        ));
        let cursor = Cursor::at("B");
        store.write_computed(&cursor, "words", Value::from(3.0)).unwrap();
        assert_eq!(store.owner("words"), Some(GroupKind::Cache));
        assert_eq!(store.get_value_column(&cursor, "words"), Value::from(3.0));
        assert!(store.computed_target("title").is_none());
    }

    #[test]
    fn add_row_extends_every_entity_group() {
        let mut store = store();
        assert!(store.add_row("C"));
        assert!(!store.add_row("C"));
        assert_eq!(store.get_indices(), vec!["A", "B", "C"]);
        assert!(store.group(GroupKind::WriteData).unwrap().contains_index("C"));
    }

    #[test]
    fn filter_and_sort_keep_groups_aligned() {
        let mut store = store();
        store.add_row("C");
        store
            .set_value_column(&Cursor::at("C"), Value::from(5.0), "score")
            .unwrap();
        store.sort_by("score", false);
        assert_eq!(store.get_indices(), vec!["A", "C", "B"]);
        assert_eq!(
            store.group(GroupKind::WriteData).unwrap().index(),
            &["A".to_string(), "C".to_string(), "B".to_string()]
        );
        let kept = store.filter_rows(&[true, false, true]);
        assert_eq!(kept, 2);
        assert_eq!(store.get_indices(), vec!["A", "B"]);
        assert_eq!(store.group(GroupKind::WriteData).unwrap().len(), 2);
    }
}
