//! FILENAME: core/engine/src/mapping.rs
//! PURPOSE: Bidirectional registry between template identifiers and raw column names.
//! CONTEXT: Views refer to columns through identifiers (`paperTitle`) while
//! source frames carry arbitrary headers (`Paper Title`). Every entry records
//! whether it was derived automatically (identity or camelCase, `default`) or
//! declared explicitly in the configuration. Default entries give way to
//! explicit ones; explicit entries never change once set.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::log_debug;
use crate::value::Value;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{L}_][\p{L}\p{N}_]*$").expect("identifier regex"));

static WORD_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}]+").expect("word break regex"));

/// Words the template language reserves; they cannot name a column.
const RESERVED: &[&str] = &[
    "true", "false", "nil", "null", "empty", "blank", "and", "or", "contains",
];

/// Validate that the name is usable inside templates.
/// Names must start with a letter or underscore and contain only letters,
/// digits and underscores, and cannot be a reserved word.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name) && !RESERVED.contains(&name)
}

/// Builds the camelCase form of a raw column name:
/// `"Unit of Assessment"` becomes `"unitOfAssessment"`.
pub fn to_camel_case(column: &str) -> String {
    let mut out = String::new();
    for (i, word) in WORD_BREAK
        .split(column)
        .filter(|w| !w.is_empty())
        .enumerate()
    {
        let lower = word.to_lowercase();
        if i == 0 {
            out.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
    }
    if out.chars().next().is_some_and(|c| c.is_numeric()) {
        out.insert(0, '_');
    }
    out
}

/// One `name <-> column` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingEntry {
    pub name: String,
    pub column: String,
    /// True when derived automatically rather than declared.
    pub default: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MappingRegistry {
    by_column: BTreeMap<String, MappingEntry>,
    by_name: BTreeMap<String, String>,
}

impl MappingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an explicit `name -> column` mapping.
    ///
    /// Re-registering the same pair is a no-op. A default entry on either
    /// side is replaced; an explicit entry on either side that disagrees is
    /// a `MappingConflict`.
    pub fn update_name_column_map(&mut self, name: &str, column: &str) -> EngineResult<()> {
        if !is_valid_identifier(name) {
            return Err(EngineError::config(format!(
                "Mapping name '{}' for column '{}' is not a valid identifier",
                name, column
            )));
        }

        if let Some(existing) = self.by_column.get(column) {
            if existing.name == name {
                if existing.default {
                    log_debug!("MAP", "promote default mapping {} -> {}", name, column);
                    self.insert(name, column, false);
                }
                return Ok(());
            }
            if !existing.default {
                return Err(EngineError::MappingConflict {
                    name: name.to_string(),
                    column: column.to_string(),
                    reason: format!("column is already explicitly mapped to '{}'", existing.name),
                });
            }
        }

        if let Some(other_column) = self.by_name.get(name) {
            if other_column != column {
                let other = &self.by_column[other_column];
                if !other.default {
                    return Err(EngineError::MappingConflict {
                        name: name.to_string(),
                        column: column.to_string(),
                        reason: format!("name is already explicitly bound to column '{}'", other_column),
                    });
                }
                let other_column = other_column.clone();
                log_debug!("MAP", "drop default mapping {} -> {}", name, other_column);
                self.by_column.remove(&other_column);
            }
        }

        self.insert(name, column, false);
        Ok(())
    }

    fn insert(&mut self, name: &str, column: &str, default: bool) {
        if let Some(previous) = self.by_column.get(column) {
            if previous.name != name {
                self.by_name.remove(&previous.name);
            }
        }
        self.by_name.insert(name.to_string(), column.to_string());
        self.by_column.insert(
            column.to_string(),
            MappingEntry {
                name: name.to_string(),
                column: column.to_string(),
                default,
            },
        );
    }

    /// The identifier for `column`: the registered one, else identity, else
    /// camelCase. New identifiers are recorded as default entries.
    pub fn resolve(&mut self, column: &str) -> EngineResult<String> {
        if let Some(entry) = self.by_column.get(column) {
            return Ok(entry.name.clone());
        }

        let camel = to_camel_case(column);
        for candidate in [column.to_string(), camel] {
            if is_valid_identifier(&candidate) && !self.by_name.contains_key(&candidate) {
                self.insert(&candidate, column, true);
                return Ok(candidate);
            }
        }

        Err(EngineError::config(format!(
            "Column '{}' has no usable identifier; add an explicit entry for it under 'mapping'",
            column
        )))
    }

    /// The identifier for `column` if one is registered.
    pub fn name_for(&self, column: &str) -> Option<&str> {
        self.by_column.get(column).map(|e| e.name.as_str())
    }

    /// The column an identifier refers to.
    pub fn column_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    pub fn entry(&self, column: &str) -> Option<&MappingEntry> {
        self.by_column.get(column)
    }

    /// All entries, sorted by name.
    pub fn entries(&self) -> Vec<&MappingEntry> {
        self.by_name
            .values()
            .filter_map(|column| self.by_column.get(column))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_column.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_column.is_empty()
    }

    /// Translates record keys into identifiers.
    pub fn translate_record(
        &mut self,
        record: BTreeMap<String, Value>,
    ) -> EngineResult<BTreeMap<String, Value>> {
        record
            .into_iter()
            .map(|(k, v)| Ok((self.resolve(&k)?, v)))
            .collect()
    }
}
