//! FILENAME: core/engine/src/functions.rs
//! PURPOSE: Registry of named compute functions.
//! CONTEXT: Configuration selects compute behaviour by function name. The
//! registry maps each name to a boxed closure taking keyword arguments,
//! plus the default arguments layered under every call and a docstring.
//! Lookup of an unregistered name is an `UnknownFunction` error.
//!
//! BUILTINS:
//! - Text: concat, join, upper, lower, trim, len, word_count, splitname
//! - Aggregates: count, sum, mean, min, max, first_nonempty
//! - Other: constant, today

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::Local;

use crate::error::{BoxError, EngineError, EngineResult};
use crate::value::Value;

/// Keyword arguments of one call.
pub type Kwargs = BTreeMap<String, Value>;

pub type ComputeFn = Arc<dyn Fn(&Kwargs) -> Result<Value, BoxError> + Send + Sync>;

#[derive(Clone)]
pub struct FunctionEntry {
    pub name: String,
    pub function: ComputeFn,
    pub default_args: Kwargs,
    pub docstring: String,
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name)
            .field("default_args", &self.default_args)
            .field("docstring", &self.docstring)
            .finish()
    }
}

impl FunctionEntry {
    pub fn new<F>(name: impl Into<String>, docstring: impl Into<String>, function: F) -> Self
    where
        F: Fn(&Kwargs) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        FunctionEntry {
            name: name.into(),
            function: Arc::new(function),
            default_args: Kwargs::new(),
            docstring: docstring.into(),
        }
    }

    pub fn with_default(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.default_args.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: BTreeMap<String, FunctionEntry>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the builtin functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for entry in builtins() {
            registry.register_entry(entry);
        }
        registry
    }

    /// Registers (or replaces) a function.
    pub fn register<F>(&mut self, name: &str, docstring: &str, function: F) -> &mut Self
    where
        F: Fn(&Kwargs) -> Result<Value, BoxError> + Send + Sync + 'static,
    {
        self.register_entry(FunctionEntry::new(name, docstring, function))
    }

    pub fn register_entry(&mut self, entry: FunctionEntry) -> &mut Self {
        self.entries.insert(entry.name.clone(), entry);
        self
    }

    pub fn get(&self, name: &str) -> EngineResult<&FunctionEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| EngineError::UnknownFunction(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// ARGUMENT HELPERS
// ============================================================================

/// The argument `key`, or the only argument when exactly one is given.
fn single<'a>(kwargs: &'a Kwargs, key: &str) -> Result<&'a Value, BoxError> {
    if let Some(value) = kwargs.get(key) {
        return Ok(value);
    }
    let mut values = kwargs.values();
    match (values.next(), values.next()) {
        (Some(only), None) => Ok(only),
        _ => Err(format!("expected argument '{}'", key).into()),
    }
}

/// The flattened `values` argument, or every argument except `separator`
/// in name order.
fn many(kwargs: &Kwargs) -> Vec<Value> {
    match kwargs.get("values") {
        Some(values) => values.flatten(),
        None => kwargs
            .iter()
            .filter(|(k, _)| k.as_str() != "separator")
            .flat_map(|(_, v)| v.flatten())
            .collect(),
    }
}

fn separator(kwargs: &Kwargs, default: &str) -> String {
    kwargs
        .get("separator")
        .map(|v| v.display_value())
        .unwrap_or_else(|| default.to_string())
}

fn numbers(kwargs: &Kwargs) -> Vec<f64> {
    many(kwargs).iter().filter_map(Value::as_number).collect()
}

fn text(kwargs: &Kwargs) -> Result<String, BoxError> {
    single(kwargs, "text").map(Value::display_value)
}

// ============================================================================
// BUILTINS
// ============================================================================

fn builtins() -> Vec<FunctionEntry> {
    vec![
        FunctionEntry::new("concat", "Concatenates the values without a separator.", |kw| {
            Ok(Value::Text(
                many(kw).iter().map(Value::display_value).collect::<String>(),
            ))
        }),
        FunctionEntry::new(
            "join",
            "Joins the non-empty values with 'separator' (default ', ').",
            |kw| {
                let sep = separator(kw, ", ");
                let parts: Vec<String> = many(kw)
                    .iter()
                    .filter(|v| v.is_present())
                    .map(Value::display_value)
                    .collect();
                Ok(Value::Text(parts.join(&sep)))
            },
        ),
        FunctionEntry::new("upper", "Upper-cases 'text'.", |kw| {
            Ok(Value::Text(text(kw)?.to_uppercase()))
        }),
        FunctionEntry::new("lower", "Lower-cases 'text'.", |kw| {
            Ok(Value::Text(text(kw)?.to_lowercase()))
        }),
        FunctionEntry::new("trim", "Strips surrounding whitespace from 'text'.", |kw| {
            Ok(Value::Text(text(kw)?.trim().to_string()))
        }),
        FunctionEntry::new("len", "Number of characters in 'text'.", |kw| {
            Ok(Value::Number(text(kw)?.chars().count() as f64))
        }),
        FunctionEntry::new("word_count", "Number of whitespace-separated words in 'text'.", |kw| {
            Ok(Value::Number(text(kw)?.split_whitespace().count() as f64))
        }),
        FunctionEntry::new("count", "Number of present values.", |kw| {
            Ok(Value::Number(many(kw).iter().filter(|v| v.is_present()).count() as f64))
        }),
        FunctionEntry::new("sum", "Sum of the numeric values.", |kw| {
            Ok(Value::Number(numbers(kw).iter().sum()))
        }),
        FunctionEntry::new("mean", "Mean of the numeric values; empty without any.", |kw| {
            let numbers = numbers(kw);
            if numbers.is_empty() {
                return Ok(Value::Empty);
            }
            Ok(Value::Number(numbers.iter().sum::<f64>() / numbers.len() as f64))
        }),
        FunctionEntry::new("min", "Smallest numeric value; empty without any.", |kw| {
            Ok(numbers(kw)
                .into_iter()
                .reduce(f64::min)
                .map(Value::Number)
                .unwrap_or_default())
        }),
        FunctionEntry::new("max", "Largest numeric value; empty without any.", |kw| {
            Ok(numbers(kw)
                .into_iter()
                .reduce(f64::max)
                .map(Value::Number)
                .unwrap_or_default())
        }),
        FunctionEntry::new("first_nonempty", "The first present value.", |kw| {
            Ok(many(kw).into_iter().find(Value::is_present).unwrap_or_default())
        }),
        FunctionEntry::new(
            "splitname",
            "Splits 'name' into (first, last). Accepts 'Jane Doe' and 'Doe, Jane'.",
            |kw| {
                let (first, last) = split_name(&single(kw, "name")?.display_value());
                Ok(Value::List(vec![Value::Text(first), Value::Text(last)]))
            },
        ),
        FunctionEntry::new("constant", "Returns 'value' unchanged.", |kw| {
            Ok(single(kw, "value")?.clone())
        }),
        FunctionEntry::new("today", "Today's local date as YYYY-MM-DD.", |_| {
            Ok(Value::Text(Local::now().format("%Y-%m-%d").to_string()))
        }),
    ]
}

/// `"Jane Q Doe"` gives `("Jane Q", "Doe")`; `"Doe, Jane"` gives `("Jane", "Doe")`.
pub fn split_name(name: &str) -> (String, String) {
    let name = name.trim();
    if let Some((last, first)) = name.split_once(',') {
        return (first.trim().to_string(), last.trim().to_string());
    }
    let words: Vec<&str> = name.split_whitespace().collect();
    match words.split_last() {
        None => (String::new(), String::new()),
        Some((only, [])) => (only.to_string(), String::new()),
        Some((last, rest)) => (rest.join(" "), last.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(registry: &FunctionRegistry, name: &str, args: &[(&str, Value)]) -> Value {
        let entry = registry.get(name).unwrap();
        let kwargs: Kwargs = args.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        (entry.function)(&kwargs).unwrap()
    }

    #[test]
    fn unknown_function_is_an_error() {
        let registry = FunctionRegistry::with_builtins();
        assert!(matches!(
            registry.get("nope"),
            Err(EngineError::UnknownFunction(ref name)) if name == "nope"
        ));
    }

    #[test]
    fn splitname_handles_both_orders() {
        assert_eq!(split_name("Jane Doe"), ("Jane".into(), "Doe".into()));
        assert_eq!(split_name("Doe, Jane"), ("Jane".into(), "Doe".into()));
        assert_eq!(split_name("Jane Q Doe"), ("Jane Q".into(), "Doe".into()));
        assert_eq!(split_name("Plato"), ("Plato".into(), String::new()));
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            call(&registry, "splitname", &[("name", "Jane Doe".into())]),
            Value::List(vec!["Jane".into(), "Doe".into()])
        );
    }

    #[test]
    fn aggregates_skip_non_numbers() {
        let registry = FunctionRegistry::with_builtins();
        let values = Value::List(vec![1.0.into(), "x".into(), Value::Empty, 5.0.into()]);
        assert_eq!(call(&registry, "sum", &[("values", values.clone())]), Value::from(6.0));
        assert_eq!(call(&registry, "mean", &[("values", values.clone())]), Value::from(3.0));
        assert_eq!(call(&registry, "max", &[("values", values.clone())]), Value::from(5.0));
        assert_eq!(call(&registry, "count", &[("values", values)]), Value::from(3.0));
        assert_eq!(call(&registry, "mean", &[]), Value::Empty);
    }

    #[test]
    fn text_helpers() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(call(&registry, "upper", &[("text", "abc".into())]), Value::from("ABC"));
        assert_eq!(call(&registry, "word_count", &[("body", "one two  three".into())]), Value::from(3.0));
        assert_eq!(
            call(
                &registry,
                "join",
                &[("a", "x".into()), ("b", "".into()), ("c", "y".into()), ("separator", "/".into())]
            ),
            Value::from("x/y")
        );
    }

    #[test]
    fn missing_argument_is_a_function_error() {
        let registry = FunctionRegistry::with_builtins();
        let entry = registry.get("upper").unwrap();
        assert!((entry.function)(&Kwargs::new()).is_err());
    }

    #[test]
    fn custom_functions_replace_builtins() {
        let mut registry = FunctionRegistry::with_builtins();
        let before = registry.len();
        registry.register("upper", "shout", |_| Ok(Value::from("!")));
        assert_eq!(registry.len(), before);
        assert_eq!(call(&registry, "upper", &[]), Value::from("!"));
    }
}
