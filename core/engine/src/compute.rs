//! FILENAME: core/engine/src/compute.rs
//! PURPOSE: Runs compute specs against the current row.
//! CONTEXT: A compute spec names a registered function, where its keyword
//! arguments come from and which column(s) receive the result. `run`
//! decides whether the call is needed at all: with `refresh` off, a spec
//! whose targets already hold values is a no-op. `run_all` walks the
//! configured `precompute`, `compute` and `postcompute` lists.
//!
//! ARGUMENT LAYERING (later sources win, collisions warn):
//!   default_args -> args -> function_args -> column_args / subseries_args
//!   -> view_args -> row_args

use std::collections::BTreeSet;

use crate::config::{ComputeSpec, ComputeTarget};
use crate::cursor::Cursor;
use crate::error::{EngineError, EngineResult};
use crate::flows::Flows;
use crate::functions::{ComputeFn, Kwargs};
use crate::value::Value;
use crate::{log_debug, log_enter, log_exit, log_warn};

/// Target name whose output is dropped.
pub const DISCARD: &str = "_";

/// A function resolved for one spec, with the spec's argument sources.
pub struct PreparedCall<'s> {
    pub name: String,
    pub function: ComputeFn,
    pub default_args: Kwargs,
    pub spec: &'s ComputeSpec,
}

/// Collects kwargs and warns when a spec-level source overrides another.
struct ArgLayers {
    kwargs: Kwargs,
    defaults: BTreeSet<String>,
    function: String,
}

impl ArgLayers {
    fn new(function: &str, defaults: Kwargs) -> Self {
        ArgLayers {
            defaults: defaults.keys().cloned().collect(),
            kwargs: defaults,
            function: function.to_string(),
        }
    }

    fn insert(&mut self, source: &str, name: &str, value: Value) {
        let overrides_default = self.defaults.remove(name);
        if self.kwargs.contains_key(name) && !overrides_default {
            log_warn!(
                "COMPUTE",
                "{}: argument '{}' from {} overrides an earlier source",
                self.function,
                name,
                source
            );
        }
        self.kwargs.insert(name.to_string(), value);
    }
}

impl Flows {
    /// Resolves the spec's function.
    pub fn prep<'s>(&self, spec: &'s ComputeSpec) -> EngineResult<PreparedCall<'s>> {
        let entry = self.functions.get(&spec.function)?;
        Ok(PreparedCall {
            name: entry.name.clone(),
            function: entry.function.clone(),
            default_args: entry.default_args.clone(),
            spec,
        })
    }

    /// Builds the kwargs of `spec` at `cursor` and calls its function.
    pub fn invoke(&mut self, spec: &ComputeSpec, cursor: &Cursor) -> EngineResult<Value> {
        let prepared = self.prep(spec)?;
        let spec = prepared.spec;
        let mut layers = ArgLayers::new(&prepared.name, prepared.default_args.clone());

        for (name, value) in &spec.args {
            layers.insert("args", name, value.clone());
        }
        for (name, nested) in &spec.function_args {
            let value = self.invoke(nested, cursor)?;
            layers.insert("function_args", name, value);
        }
        for (name, column) in &spec.column_args {
            let column = self.column_name(column);
            layers.insert("column_args", name, Value::List(self.store.column_vector(&column)));
        }
        for (name, column) in &spec.subseries_args {
            let column = self.column_name(column);
            let values = match cursor.index() {
                Some(index) => self.store.series_vector(index, &column),
                None => Vec::new(),
            };
            layers.insert("subseries_args", name, Value::List(values));
        }
        for (name, view) in &spec.view_args {
            let value = self.resolve_view(view, cursor, None)?;
            layers.insert("view_args", name, value);
        }
        for (name, column) in &spec.row_args {
            let column = self.column_name(column);
            let value = self.store.get_value_column(cursor, &column);
            layers.insert("row_args", name, value);
        }

        log_debug!(
            "COMPUTE",
            "call {} at {} with {:?}",
            prepared.name,
            cursor,
            layers.kwargs.keys().collect::<Vec<_>>()
        );
        (prepared.function)(&layers.kwargs).map_err(|source| EngineError::Function {
            function: prepared.name.clone(),
            source,
        })
    }

    /// Target fields of `spec` that still need a value at `cursor`.
    fn missing_targets(&self, spec: &ComputeSpec, cursor: &Cursor) -> Vec<String> {
        spec.field
            .names()
            .into_iter()
            .filter(|name| *name != DISCARD)
            .map(|name| self.column_name(name))
            .filter(|column| {
                !self.store.has_column(column) || self.store.get_value_column(cursor, column).is_missing()
            })
            .collect()
    }

    /// Runs `spec` at `cursor` when `refresh` is set, a target is missing or
    /// there is no target. Returns the function result, or `None` when the
    /// call was not needed.
    pub fn run(&mut self, spec: &ComputeSpec, cursor: &Cursor, refresh: bool) -> EngineResult<Option<Value>> {
        let targets: Vec<&str> = spec.field.names();
        let stored: Vec<&str> = targets.iter().copied().filter(|t| *t != DISCARD).collect();
        let missing = self.missing_targets(spec, cursor);

        if !refresh && !stored.is_empty() && missing.is_empty() {
            log_debug!("COMPUTE", "skip {} at {}: targets present", spec.function, cursor);
            return Ok(None);
        }

        log_enter!("COMPUTE", "run", "{} at {}", spec.function, cursor);
        let result = self.invoke(spec, cursor)?;

        let outputs: Vec<(&str, Value)> = if matches!(spec.field, ComputeTarget::Many(_)) {
            let items = match &result {
                Value::List(items) => items.clone(),
                _ => {
                    return Err(EngineError::ComputeArity {
                        function: spec.function.clone(),
                        expected: targets.len(),
                        actual: 1,
                    })
                }
            };
            if items.len() != targets.len() {
                return Err(EngineError::ComputeArity {
                    function: spec.function.clone(),
                    expected: targets.len(),
                    actual: items.len(),
                });
            }
            targets.iter().copied().zip(items).collect()
        } else {
            targets.iter().map(|t| (*t, result.clone())).collect()
        };

        for (target, value) in outputs {
            if target == DISCARD {
                continue;
            }
            let column = self.column_name(target);
            if self.store.computed_target(&column).is_none() {
                log_warn!("COMPUTE", "{}: target '{}' is not writable; result dropped", spec.function, column);
                continue;
            }
            self.store.write_computed(cursor, &column, value)?;
        }
        log_exit!("COMPUTE", "run", "{}", spec.function);
        Ok(Some(result))
    }

    /// Runs the configured specs for `cursor`: `precompute` when `pre`,
    /// `compute` always, `postcompute` when `post`. Returns how many
    /// functions were called.
    pub fn run_all(&mut self, cursor: &Cursor, pre: bool, post: bool) -> EngineResult<usize> {
        let mut specs: Vec<ComputeSpec> = Vec::new();
        if pre {
            specs.extend(self.config.precompute.iter().cloned());
        }
        specs.extend(self.config.compute.iter().cloned());
        if post {
            specs.extend(self.config.postcompute.iter().cloned());
        }

        let mut called = 0;
        for spec in &specs {
            let unwritable: Vec<String> = spec
                .field
                .names()
                .into_iter()
                .filter(|t| *t != DISCARD)
                .map(|t| self.column_name(t))
                .filter(|c| self.store.computed_target(c).is_none())
                .collect();
            if !unwritable.is_empty() {
                log_warn!(
                    "COMPUTE",
                    "skip {}: target(s) {} not writable",
                    spec.function,
                    unwritable.join(", ")
                );
                continue;
            }
            if self.run(spec, cursor, spec.refresh)?.is_some() {
                called += 1;
            }
        }
        Ok(called)
    }

    /// Resolves a name used in a spec to a stored column: an existing column
    /// as is, else the column a mapping name refers to.
    pub(crate) fn column_name(&self, name: &str) -> String {
        if self.store.has_column(name) {
            return name.to_string();
        }
        self.mapping
            .column_for(name)
            .unwrap_or(name)
            .to_string()
    }
}
