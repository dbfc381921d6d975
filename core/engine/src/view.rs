//! FILENAME: core/engine/src/view.rs
//! PURPOSE: Resolves view specs into values.
//! CONTEXT: A view is a small tree of nodes (`field`, `display`, `liquid`,
//! `join`, `list`, `tally`, `compute`) evaluated at a cursor. Templates see
//! a scope made of the caller's overrides first, then every mapping name
//! bound to its column's value at the cursor.

use std::collections::BTreeMap;

use template::{Dialect, Layered, Scope, TemplateValue};

use crate::config::{ComputeTarget, Condition, ViewNode, ViewSpec};
use crate::cursor::Cursor;
use crate::error::EngineResult;
use crate::flows::Flows;
use crate::mapping::{to_camel_case, MappingRegistry};
use crate::store::LayeredStore;
use crate::value::Value;
use crate::log_debug;

/// Parses and renders a template in one step.
pub fn render_template(dialect: Dialect, source: &str, scope: &dyn Scope) -> EngineResult<String> {
    let template = template::parse(dialect, source)?;
    Ok(template::render(&template, scope)?)
}

/// Template scope over the row at a cursor.
pub struct RowScope<'a> {
    pub store: &'a LayeredStore,
    pub mapping: &'a MappingRegistry,
    pub cursor: &'a Cursor,
}

impl Scope for RowScope<'_> {
    fn lookup(&self, name: &str) -> Option<TemplateValue> {
        let column = self.mapping.column_for(name).unwrap_or(name);
        if !self.store.has_column(column) && !self.store.is_index_name(column) {
            return None;
        }
        Some(self.store.get_value_column(self.cursor, column).to_template())
    }
}

impl Flows {
    /// Resolves `spec` at `cursor`. A failed condition yields `Empty`.
    pub fn resolve_view(
        &mut self,
        spec: &ViewSpec,
        cursor: &Cursor,
        overrides: Option<&BTreeMap<String, Value>>,
    ) -> EngineResult<Value> {
        if !self.conditions_hold(&spec.conditions, cursor) {
            log_debug!("VIEW", "{} view skipped by its conditions at {}", spec.node.tag(), cursor);
            return Ok(Value::Empty);
        }

        match &spec.node {
            ViewNode::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.resolve_view(item, cursor, overrides)?);
                }
                Ok(Value::List(values))
            }
            ViewNode::Field(name) => {
                let column = self.column_name(name);
                Ok(self.store.get_value_column(cursor, &column))
            }
            ViewNode::Join { items, separator } => {
                let mut parts = Vec::new();
                for item in items {
                    let value = self.resolve_view(item, cursor, overrides)?;
                    parts.extend(
                        value
                            .flatten()
                            .iter()
                            .map(Value::display_value)
                            .filter(|s| !s.trim().is_empty()),
                    );
                }
                Ok(Value::Text(parts.join(separator)))
            }
            ViewNode::Compute(compute) => match self.run(compute, cursor, compute.refresh)? {
                Some(result) => Ok(result),
                None => Ok(self.stored_result(&compute.field, cursor)),
            },
            ViewNode::Liquid(source) => self
                .render_text(Dialect::Liquid, source, cursor, overrides)
                .map(Value::Text),
            ViewNode::Tally(tally) => self.tally_values(tally, cursor, overrides),
            ViewNode::Display(source) => self
                .render_text(Dialect::Display, source, cursor, overrides)
                .map(Value::Text),
        }
    }

    /// Renders a template against the row at `cursor`, overrides first.
    pub fn render_text(
        &self,
        dialect: Dialect,
        source: &str,
        cursor: &Cursor,
        overrides: Option<&BTreeMap<String, Value>>,
    ) -> EngineResult<String> {
        let row = RowScope {
            store: &self.store,
            mapping: &self.mapping,
            cursor,
        };
        let locals: BTreeMap<String, TemplateValue> = overrides
            .map(|o| o.iter().map(|(k, v)| (k.clone(), v.to_template())).collect())
            .unwrap_or_default();
        let scope = Layered {
            first: &locals,
            second: &row,
        };
        render_template(dialect, source, &scope)
    }

    fn conditions_hold(&self, conditions: &[Condition], cursor: &Cursor) -> bool {
        conditions.iter().all(|condition| match condition {
            Condition::Present(field) => {
                let column = self.column_name(field);
                self.store.get_value_column(cursor, &column).is_present()
            }
            Condition::Equal { field, value } => {
                let column = self.column_name(field);
                self.store.get_value_column(cursor, &column).loosely_equals(value)
            }
        })
    }

    /// The stored values of a compute target when the call was skipped.
    fn stored_result(&self, target: &ComputeTarget, cursor: &Cursor) -> Value {
        match target {
            ComputeTarget::None => Value::Empty,
            ComputeTarget::One(name) => self.store.get_value_column(cursor, &self.column_name(name)),
            ComputeTarget::Many(names) => Value::List(
                names
                    .iter()
                    .map(|name| self.store.get_value_column(cursor, &self.column_name(name)))
                    .collect(),
            ),
        }
    }
}

/// A stable identifier for a view, built from its tags and leaf values.
/// Used to name cache columns and file stubs.
pub fn temp_name(spec: &ViewSpec) -> String {
    let mut words = Vec::new();
    collect_words(spec, &mut words);
    let name = to_camel_case(&words.join(" "));
    if name.is_empty() {
        "view".to_string()
    } else {
        name
    }
}

fn collect_words(spec: &ViewSpec, words: &mut Vec<String>) {
    words.push(spec.node.tag().to_string());
    match &spec.node {
        ViewNode::Field(text) | ViewNode::Display(text) | ViewNode::Liquid(text) => {
            words.push(text.clone())
        }
        ViewNode::List(items) | ViewNode::Join { items, .. } => {
            for item in items {
                collect_words(item, words);
            }
        }
        ViewNode::Tally(tally) => {
            words.push(tally.which.keyword().to_string());
            collect_words(&tally.view, words);
        }
        ViewNode::Compute(compute) => {
            words.push(compute.function.clone());
            words.extend(compute.field.names().into_iter().map(str::to_string));
        }
    }
}
