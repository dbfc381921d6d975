//! FILENAME: core/template/src/value.rs
//! PURPOSE: The value type templates render and the scope they render against.
//! CONTEXT: Callers convert their own data into `TemplateValue` and expose
//! it through the `Scope` trait. A scope answering `None` means the name is
//! undefined, which the renderer reports as a missing key.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    Nil,
    Boolean(bool),
    Number(f64),
    Text(String),
    List(Vec<TemplateValue>),
    Object(BTreeMap<String, TemplateValue>),
}

impl TemplateValue {
    /// Liquid truthiness: only nil and false are falsy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, TemplateValue::Nil | TemplateValue::Boolean(false))
    }

    /// Converts the value to the text it renders as.
    pub fn to_output(&self) -> String {
        match self {
            TemplateValue::Nil => String::new(),
            TemplateValue::Boolean(b) => b.to_string(),
            TemplateValue::Number(n) => format_number(*n),
            TemplateValue::Text(s) => s.clone(),
            TemplateValue::List(items) => items.iter().map(|v| v.to_output()).collect(),
            TemplateValue::Object(map) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.to_output()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Attempts to coerce the value to a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            TemplateValue::Number(n) => Some(*n),
            TemplateValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Length for `size`; zero for scalars other than text.
    pub fn size(&self) -> usize {
        match self {
            TemplateValue::Text(s) => s.chars().count(),
            TemplateValue::List(items) => items.len(),
            TemplateValue::Object(map) => map.len(),
            _ => 0,
        }
    }

    /// Empty strings, empty lists and nil count as blank for `default`.
    pub fn is_blank(&self) -> bool {
        match self {
            TemplateValue::Nil | TemplateValue::Boolean(false) => true,
            TemplateValue::Text(s) => s.is_empty(),
            TemplateValue::List(items) => items.is_empty(),
            TemplateValue::Object(map) => map.is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(s: &str) -> Self {
        TemplateValue::Text(s.to_string())
    }
}

impl From<String> for TemplateValue {
    fn from(s: String) -> Self {
        TemplateValue::Text(s)
    }
}

impl From<f64> for TemplateValue {
    fn from(n: f64) -> Self {
        TemplateValue::Number(n)
    }
}

impl From<bool> for TemplateValue {
    fn from(b: bool) -> Self {
        TemplateValue::Boolean(b)
    }
}

/// Formats without unnecessary decimal places.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        String::new()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Variable lookup used while rendering.
pub trait Scope {
    /// Returns the value bound to `name`, or None when the name is undefined.
    fn lookup(&self, name: &str) -> Option<TemplateValue>;
}

impl Scope for HashMap<String, TemplateValue> {
    fn lookup(&self, name: &str) -> Option<TemplateValue> {
        self.get(name).cloned()
    }
}

impl Scope for BTreeMap<String, TemplateValue> {
    fn lookup(&self, name: &str) -> Option<TemplateValue> {
        self.get(name).cloned()
    }
}

/// Looks names up in `first`, then in `second`.
pub struct Layered<'a> {
    pub first: &'a dyn Scope,
    pub second: &'a dyn Scope,
}

impl Scope for Layered<'_> {
    fn lookup(&self, name: &str) -> Option<TemplateValue> {
        self.first.lookup(name).or_else(|| self.second.lookup(name))
    }
}
