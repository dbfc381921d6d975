//! FILENAME: core/engine/src/flows.rs
//! PURPOSE: The engine facade used by the UI and plugin layers.
//! CONTEXT: `Flows` owns the configuration, the layered store, the mapping
//! registry, the function registry and the current cursor. Navigation runs
//! the compute specs on index change: `postcompute` for the row being left,
//! then `precompute` for the row being entered. View resolution, tally and
//! compute live in their own modules as further `impl Flows` blocks.

use std::collections::BTreeMap;

use crate::config::{ComputeSpec, FlowConfig, ViewSpec};
use crate::cursor::Cursor;
use crate::error::{EngineError, EngineResult};
use crate::finalize::finalize;
use crate::frame::RawFrame;
use crate::functions::{FunctionEntry, FunctionRegistry, Kwargs};
use crate::group::{ColumnGroup, GroupKind};
use crate::mapping::MappingRegistry;
use crate::source::GroupSource;
use crate::store::LayeredStore;
use crate::value::Value;
use crate::view::temp_name;
use crate::{log_debug, log_enter, log_exit, log_info, log_warn};

/// Name the `additional` group is read under.
pub const ADDITIONAL_GROUP: &str = "additional";

#[derive(Debug)]
pub struct Flows {
    pub(crate) config: FlowConfig,
    pub(crate) store: LayeredStore,
    pub(crate) mapping: MappingRegistry,
    pub(crate) functions: FunctionRegistry,
    pub(crate) cursor: Cursor,
}

impl Flows {
    /// Creates an empty engine for `config` with the builtin functions.
    pub fn new(config: FlowConfig) -> EngineResult<Self> {
        Self::with_functions(config, FunctionRegistry::with_builtins())
    }

    pub fn with_functions(config: FlowConfig, functions: FunctionRegistry) -> EngineResult<Self> {
        let mapping = config_mapping(&config)?;
        Ok(Flows {
            config,
            store: LayeredStore::new(),
            mapping,
            functions,
            cursor: Cursor::new(),
        })
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn store(&self) -> &LayeredStore {
        &self.store
    }

    pub fn mapping(&self) -> &MappingRegistry {
        &self.mapping
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    /// Registers (or replaces) a compute function.
    pub fn register_function<F>(&mut self, name: &str, docstring: &str, function: F) -> &mut Self
    where
        F: Fn(&Kwargs) -> Result<Value, crate::error::BoxError> + Send + Sync + 'static,
    {
        self.functions.register(name, docstring, function);
        self
    }

    pub fn register_function_entry(&mut self, entry: FunctionEntry) -> &mut Self {
        self.functions.register_entry(entry);
        self
    }

    /// Installs an already built group and gives its columns mapping names.
    pub fn insert_group(&mut self, group: ColumnGroup) -> EngineResult<()> {
        self.mapping.resolve(group.index_name())?;
        for name in group.column_names() {
            self.mapping.resolve(name)?;
        }
        self.store.insert_group(group);
        Ok(())
    }

    // ========================================================================
    // LOAD / SAVE
    // ========================================================================

    /// Reads and finalizes every declared group, then places the cursor on
    /// the first entity and runs `precompute` for it.
    pub fn load_flows(&mut self, source: &mut dyn GroupSource) -> EngineResult<()> {
        log_enter!("LOAD", "load_flows", "{} groups", self.config.groups().len());
        let mut mapping = config_mapping(&self.config)?;
        let mut store = LayeredStore::new();

        for (kind, decl) in self.config.groups() {
            let frame = if kind == GroupKind::Cache {
                RawFrame::default()
            } else {
                read_frame(source, kind.name(), &decl.descriptor())?
            };
            let group = finalize(kind, frame, decl, &mut mapping)?;
            store.insert_group(group);
        }

        if let Some(decl) = &self.config.additional {
            let frame = read_frame(source, ADDITIONAL_GROUP, &decl.descriptor())?;
            let extra = finalize(GroupKind::Data, frame, decl, &mut mapping)?;
            match store.group_mut(GroupKind::Data) {
                Some(data) => {
                    let added = data.left_join(&extra);
                    log_info!("LOAD", "additional: joined {} column(s) into data", added.len());
                }
                None => {
                    log_info!("LOAD", "additional: used as data");
                    store.insert_group(extra);
                }
            }
        }

        store.align();
        self.store = store;
        self.mapping = mapping;

        if let Some(sortby) = self.config.sortby.clone() {
            let column = self.column_name(&sortby.field);
            if self.store.has_column(&column) || self.store.is_index_name(&column) {
                self.store.sort_by(&column, sortby.ascending);
            } else {
                log_warn!("LOAD", "sortby field '{}' is not a column; order kept", sortby.field);
            }
        }

        self.cursor = Cursor::new();
        if let Some(first) = self.store.get_indices().into_iter().next() {
            let cursor = self.store.check_or_set_subseries(&Cursor::at(first))?;
            self.cursor = cursor;
            self.compute_pre()?;
        }
        log_exit!("LOAD", "load_flows", "{} entities", self.store.get_indices().len());
        Ok(())
    }

    /// Writes every persisted group through `source`. Returns how many
    /// groups were written.
    pub fn save_flows(&self, source: &mut dyn GroupSource) -> EngineResult<usize> {
        let mut written = 0;
        for group in self.store.groups() {
            let kind = group.kind();
            if !kind.is_persisted() {
                continue;
            }
            let descriptor = self
                .config
                .group(kind)
                .map(|decl| decl.descriptor())
                .unwrap_or_default();
            let frame = group.to_frame();
            source
                .write_group(kind.name(), &frame, &descriptor)
                .map_err(|source| EngineError::Source {
                    group: kind.name().to_string(),
                    source,
                })?;
            log_debug!("LOAD", "saved {} ({} rows)", kind, frame.len());
            written += 1;
        }
        log_info!("LOAD", "saved {} group(s)", written);
        Ok(written)
    }

    // ========================================================================
    // INDEX NAVIGATION
    // ========================================================================

    pub fn get_index(&self) -> Option<&str> {
        self.cursor.index()
    }

    pub fn get_indices(&self) -> Vec<String> {
        self.store.get_indices()
    }

    /// Moves the cursor to `index`, adding the entity when it is new.
    /// Leaving a row runs its `postcompute`; entering one runs `precompute`.
    pub fn set_index(&mut self, index: &str) -> EngineResult<()> {
        if self.cursor.index() == Some(index) {
            log_debug!("FLOWS", "set_index {}: already current", index);
            return Ok(());
        }
        if !self.store.has_index(index) {
            self.store.add_row(index);
        }
        if !self.store.has_index(index) {
            return Err(EngineError::InvalidIndex(index.to_string()));
        }

        let leaving = self.cursor.clone();
        if leaving.index().is_some_and(|old| self.store.has_index(old)) {
            self.run_all(&leaving, false, true)?;
        }

        let entering = Cursor {
            column: self.cursor.column.clone(),
            ..Cursor::at(index)
        };
        self.cursor = self.store.check_or_set_subseries(&entering)?;
        let cursor = self.cursor.clone();
        self.run_all(&cursor, true, false)?;
        log_info!("FLOWS", "index -> {}", self.cursor);
        Ok(())
    }

    /// Appends an entity and computes it without moving the cursor.
    /// Returns `false` when `index` already exists.
    pub fn add_row(&mut self, index: &str) -> EngineResult<bool> {
        if !self.store.add_row(index) {
            return Ok(false);
        }
        if !self.store.has_index(index) {
            return Err(EngineError::InvalidIndex(index.to_string()));
        }
        self.run_all(&Cursor::at(index), true, false)?;
        log_info!("FLOWS", "row {} added", index);
        Ok(true)
    }

    // ========================================================================
    // SUB-ROWS
    // ========================================================================

    pub fn get_subindex(&self) -> Option<&str> {
        self.cursor.subindex()
    }

    /// Sub-rows of the current entity.
    pub fn get_subindices(&self) -> Vec<String> {
        match self.cursor.index() {
            Some(index) => self.store.get_subindices(index),
            None => Vec::new(),
        }
    }

    pub fn set_subindex(&mut self, subindex: &str) -> EngineResult<()> {
        let index = self
            .cursor
            .index()
            .ok_or_else(|| EngineError::InvalidIndex(String::new()))?
            .to_string();
        if !self.store.get_subindices(&index).iter().any(|s| s == subindex) {
            return Err(EngineError::InvalidSubindex {
                index,
                subindex: subindex.to_string(),
            });
        }
        self.cursor.subindex = Some(subindex.to_string());
        log_debug!("FLOWS", "subindex -> {}", self.cursor);
        Ok(())
    }

    /// Adds a sub-row to `index` and computes it. The cursor stays where it
    /// is; returns the new selector value.
    pub fn add_series_row(&mut self, index: &str) -> EngineResult<String> {
        let subindex = self.store.add_series_row(index)?;
        let cursor = Cursor::at(index)
            .with_selector(self.store.selector().map(str::to_string))
            .with_subindex(Some(subindex.clone()));
        self.run_all(&cursor, true, false)?;
        Ok(subindex)
    }

    // ========================================================================
    // VALUES
    // ========================================================================

    pub fn set_column(&mut self, name: &str) {
        let column = self.column_name(name);
        self.cursor.column = Some(column);
    }

    /// The value of the cursor's column.
    pub fn get_value(&self) -> Value {
        self.store.get_value(&self.cursor)
    }

    /// The value of `name` (a column or a mapping name) at the cursor.
    pub fn get_value_column(&self, name: &str) -> Value {
        let column = self.column_name(name);
        self.store.get_value_column(&self.cursor, &column)
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> EngineResult<()> {
        self.store.set_value(&self.cursor, value.into())
    }

    pub fn set_value_column(&mut self, value: impl Into<Value>, name: &str) -> EngineResult<()> {
        let column = self.column_name(name);
        self.store.set_value_column(&self.cursor, value.into(), &column)
    }

    // ========================================================================
    // VIEWS & COMPUTE
    // ========================================================================

    /// Resolves a view at the cursor.
    pub fn view_to_value(&mut self, spec: &ViewSpec) -> EngineResult<Value> {
        let cursor = self.cursor.clone();
        self.resolve_view(spec, &cursor, None)
    }

    /// Resolves a view at the cursor with extra template variables.
    pub fn view_to_value_with(
        &mut self,
        spec: &ViewSpec,
        overrides: &BTreeMap<String, Value>,
    ) -> EngineResult<Value> {
        let cursor = self.cursor.clone();
        self.resolve_view(spec, &cursor, Some(overrides))
    }

    /// The configured `viewer` views at the cursor, labelled.
    pub fn viewer_values(&mut self) -> EngineResult<Vec<(String, Value)>> {
        let specs = self.config.viewer.clone();
        self.labelled_values(&specs)
    }

    /// The configured `combinator` views at the cursor, labelled.
    pub fn combinator_values(&mut self) -> EngineResult<Vec<(String, Value)>> {
        let specs = self.config.combinator.clone();
        self.labelled_values(&specs)
    }

    fn labelled_values(&mut self, specs: &[ViewSpec]) -> EngineResult<Vec<(String, Value)>> {
        let mut values = Vec::with_capacity(specs.len());
        for spec in specs {
            let label = spec.label.clone().unwrap_or_else(|| temp_name(spec));
            values.push((label, self.view_to_value(spec)?));
        }
        Ok(values)
    }

    /// Runs one compute spec at the cursor.
    pub fn run_compute(&mut self, spec: &ComputeSpec, refresh: bool) -> EngineResult<Option<Value>> {
        let cursor = self.cursor.clone();
        self.run(spec, &cursor, refresh)
    }

    /// `precompute` then `compute` at the cursor.
    pub fn compute_pre(&mut self) -> EngineResult<usize> {
        let cursor = self.cursor.clone();
        self.run_all(&cursor, true, false)
    }

    /// `compute` then `postcompute` at the cursor.
    pub fn compute_post(&mut self) -> EngineResult<usize> {
        let cursor = self.cursor.clone();
        self.run_all(&cursor, false, true)
    }

    // ========================================================================
    // ROW SETS
    // ========================================================================

    /// Keeps the entities for which `keep` holds. The cursor moves to the
    /// first remaining entity when its own was removed.
    pub fn filter_rows<F>(&mut self, mut keep: F) -> EngineResult<usize>
    where
        F: FnMut(&LayeredStore, &Cursor) -> bool,
    {
        let mask: Vec<bool> = self
            .store
            .get_indices()
            .into_iter()
            .map(|index| {
                let cursor = Cursor::at(index);
                let cursor = match self.store.selector() {
                    Some(selector) => {
                        let sub = self.store.get_subindices(cursor.index().unwrap_or_default());
                        cursor
                            .with_selector(Some(selector.to_string()))
                            .with_subindex(sub.into_iter().next())
                    }
                    None => cursor,
                };
                keep(&self.store, &cursor)
            })
            .collect();
        let kept = self.store.filter_rows(&mask);

        let current = self.cursor.index().map(str::to_string);
        if current.as_deref().is_some_and(|i| self.store.has_index(i)) {
            return Ok(kept);
        }
        match self.store.get_indices().into_iter().next() {
            Some(first) => {
                let entering = Cursor {
                    column: self.cursor.column.clone(),
                    ..Cursor::at(first)
                };
                self.cursor = self.store.check_or_set_subseries(&entering)?;
                self.compute_pre()?;
            }
            None => {
                log_warn!("FLOWS", "filter removed every row");
                self.cursor = Cursor::new();
            }
        }
        Ok(kept)
    }
}

fn config_mapping(config: &FlowConfig) -> EngineResult<MappingRegistry> {
    let mut mapping = MappingRegistry::new();
    for (name, column) in &config.mapping {
        mapping.update_name_column_map(name, column)?;
    }
    Ok(mapping)
}

fn read_frame(
    source: &mut dyn GroupSource,
    name: &str,
    descriptor: &serde_json::Value,
) -> EngineResult<RawFrame> {
    let (frame, details) = source
        .read_group(name, descriptor)
        .map_err(|source| EngineError::Source {
            group: name.to_string(),
            source,
        })?;
    log_debug!("LOAD", "read {}: {}", name, details);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use serde_json::json;

    fn flows() -> Flows {
        let config = FlowConfig::from_value(json!({
            "data": { "index": "id" },
            "write_data": { "index": "id", "fields": ["score"] },
        }))
        .unwrap();
        let mut source = MemorySource::new().with_frame(
            "data",
            RawFrame::from_columns(vec![
                ("id", vec![Value::from("A"), Value::from("B")]),
                ("title", vec![Value::from("Alpha"), Value::from("Beta")]),
            ]),
        );
        let mut flows = Flows::new(config).unwrap();
        flows.load_flows(&mut source).unwrap();
        flows
    }

    #[test]
    fn load_places_cursor_on_first_entity() {
        let flows = flows();
        assert_eq!(flows.get_index(), Some("A"));
        assert_eq!(flows.get_value_column("title"), Value::from("Alpha"));
        assert_eq!(flows.get_value_column("id"), Value::from("A"));
    }

    #[test]
    fn set_index_keeps_column() {
        let mut flows = flows();
        flows.set_column("title");
        flows.set_index("B").unwrap();
        assert_eq!(flows.get_value(), Value::from("Beta"));
    }

    #[test]
    fn set_index_adds_unknown_entities() {
        let mut flows = flows();
        flows.set_index("C").unwrap();
        assert_eq!(flows.get_indices(), vec!["A", "B", "C"]);
        assert!(flows.get_value_column("title").is_missing());
    }

    #[test]
    fn filter_moves_cursor_off_removed_rows() {
        let mut flows = flows();
        let kept = flows
            .filter_rows(|store, cursor| store.get_value_column(cursor, "title") == Value::from("Beta"))
            .unwrap();
        assert_eq!(kept, 1);
        assert_eq!(flows.get_index(), Some("B"));
    }

    #[test]
    fn set_subindex_without_series_is_invalid() {
        let mut flows = flows();
        let err = flows.set_subindex("x").unwrap_err();
        assert!(matches!(err, EngineError::InvalidSubindex { .. }));
    }
}
