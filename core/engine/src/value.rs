//! FILENAME: core/engine/src/value.rs
//! PURPOSE: Defines the value held by one cell of a column group.
//! CONTEXT: This file contains the `Value` enum and the `ColumnType` a column
//! declares. Values arrive from collaborator frames (JSON-like data), from
//! user edits and from compute functions; column types only ever widen.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use template::TemplateValue;

/// The content of a single cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value (None / NaN in the source data).
    #[default]
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
}

impl Value {
    /// Missing means "needs computing": Empty or a NaN number.
    /// A list is never missing, even when it has no items.
    pub fn is_missing(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Present means "worth showing": not missing and not an empty string/list.
    pub fn is_present(&self) -> bool {
        match self {
            Value::Text(s) => !s.trim().is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Record(map) => !map.is_empty(),
            other => !other.is_missing(),
        }
    }

    /// Returns the display value of the cell as a String.
    pub fn display_value(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Number(n) => template::value::format_number(*n),
            Value::Text(s) => s.clone(),
            Value::Boolean(b) => b.to_string(),
            Value::List(items) => items
                .iter()
                .map(|v| v.display_value())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
            Value::Record(map) => map
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v.display_value()))
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    /// Attempts to coerce the value to a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Equality used by `equal` view conditions: structural first, then by
    /// display text so `"3"` matches `3`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) if !matches!(self, Value::Boolean(_)) => a == b,
            _ => self.display_value() == other.display_value(),
        }
    }

    /// Flattens nested lists into their leaves.
    pub fn flatten(&self) -> Vec<Value> {
        match self {
            Value::List(items) => items.iter().flat_map(|v| v.flatten()).collect(),
            other => vec![other.clone()],
        }
    }

    pub fn to_template(&self) -> TemplateValue {
        match self {
            Value::Empty => TemplateValue::Nil,
            Value::Number(n) if n.is_nan() => TemplateValue::Nil,
            Value::Number(n) => TemplateValue::Number(*n),
            Value::Text(s) => TemplateValue::Text(s.clone()),
            Value::Boolean(b) => TemplateValue::Boolean(*b),
            Value::List(items) => TemplateValue::List(items.iter().map(|v| v.to_template()).collect()),
            Value::Record(map) => TemplateValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_template())).collect(),
            ),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Empty => serde_json::Value::Null,
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::List(items) => serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect()),
            Value::Record(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Empty,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Empty),
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Record(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Value::from)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// The representation a column declares for its cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Number,
    Boolean,
    /// Generic column: accepts anything.
    Object,
}

impl ColumnType {
    /// Infers a type from existing cells. Empty cells do not vote; a column
    /// with no non-empty cells is Number (the NaN-filled default).
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> ColumnType {
        let mut inferred: Option<ColumnType> = None;
        for value in values {
            let this = match value {
                Value::Empty => continue,
                Value::Number(_) => ColumnType::Number,
                Value::Boolean(_) => ColumnType::Boolean,
                _ => return ColumnType::Object,
            };
            match inferred {
                None => inferred = Some(this),
                Some(t) if t == this => {}
                Some(_) => return ColumnType::Object,
            }
        }
        inferred.unwrap_or(ColumnType::Number)
    }

    /// Whether a cell of this type can hold `value` without widening.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (ColumnType::Object, _) => true,
            (_, Value::Empty) => true,
            (ColumnType::Number, Value::Number(_)) => true,
            (ColumnType::Boolean, Value::Boolean(_)) => true,
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Object => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_and_empty_are_missing_lists_are_not() {
        assert!(Value::Empty.is_missing());
        assert!(Value::Number(f64::NAN).is_missing());
        assert!(!Value::List(Vec::new()).is_missing());
        assert!(!Value::Text(String::new()).is_missing());
    }

    #[test]
    fn display_value_formats_integers_plainly() {
        assert_eq!(Value::Number(42.0).display_value(), "42");
        assert_eq!(Value::Number(2.5).display_value(), "2.5");
        assert_eq!(Value::Boolean(true).display_value(), "true");
    }

    #[test]
    fn infer_widens_mixed_columns() {
        let nums = [Value::Number(1.0), Value::Empty, Value::Number(2.0)];
        assert_eq!(ColumnType::infer(nums.iter()), ColumnType::Number);
        let mixed = [Value::Number(1.0), Value::Boolean(true)];
        assert_eq!(ColumnType::infer(mixed.iter()), ColumnType::Object);
        let text = [Value::Text("a".into())];
        assert_eq!(ColumnType::infer(text.iter()), ColumnType::Object);
        assert_eq!(ColumnType::infer([].iter()), ColumnType::Number);
    }

    #[test]
    fn number_column_rejects_text_and_booleans() {
        assert!(ColumnType::Number.accepts(&Value::Number(1.0)));
        assert!(ColumnType::Number.accepts(&Value::Empty));
        assert!(!ColumnType::Number.accepts(&Value::Text("N/A".into())));
        assert!(!ColumnType::Number.accepts(&Value::Boolean(true)));
    }

    #[test]
    fn loose_equality_crosses_text_and_numbers() {
        assert!(Value::Text("3".into()).loosely_equals(&Value::Number(3.0)));
        assert!(!Value::Text("yes".into()).loosely_equals(&Value::Boolean(true)));
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let json = serde_json::json!({"a": [1, null, "x"], "b": true});
        let value = Value::from(json.clone());
        assert_eq!(value.to_json(), serde_json::json!({"a": [1.0, null, "x"], "b": true}));
    }
}
