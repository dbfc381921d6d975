//! FILENAME: core/template/src/render.rs
//! PURPOSE: Renders a parsed Template against a Scope.
//! CONTEXT: Final stage of the template pipeline. Root names are resolved
//! through local bindings (for/assign/capture) first, then the caller's scope.
//! An undefined root name is an error; a defined name holding nil renders as
//! the empty string.
//!
//! FILTERS: upcase, downcase, capitalize, strip, lstrip, rstrip, size,
//!          default, join, split, first, last, append, prepend, replace,
//!          remove, truncate, newline_to_br, escape, plus, minus, times,
//!          divided_by, round, sort, reverse, uniq, map, compact

use std::collections::{BTreeMap, HashMap};

use crate::ast::{Accessor, CompareOperator, Condition, Expr, FilteredExpr, Literal, Node, Template};
use crate::value::{format_number, Scope, TemplateValue};

/// Largest number of items a `(start..end)` range may produce.
pub const MAX_RANGE_LEN: i64 = 10_000;

/// Errors raised while rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A root variable is not defined in any scope.
    MissingKey(String),
    UnknownFilter(String),
    InvalidFilterArgs { filter: String, message: String },
    UnsupportedFormat { name: String, spec: String },
    RangeTooLarge { start: i64, end: i64 },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::MissingKey(name) => write!(f, "Undefined variable '{}'", name),
            RenderError::UnknownFilter(name) => write!(f, "Unknown filter '{}'", name),
            RenderError::InvalidFilterArgs { filter, message } => {
                write!(f, "Invalid arguments for filter '{}': {}", filter, message)
            }
            RenderError::UnsupportedFormat { name, spec } => {
                write!(f, "Unsupported format spec '{}' for '{}'", spec, name)
            }
            RenderError::RangeTooLarge { start, end } => write!(
                f,
                "Range ({}..{}) exceeds {} items",
                start, end, MAX_RANGE_LEN
            ),
        }
    }
}

impl std::error::Error for RenderError {}

pub type RenderResult<T> = Result<T, RenderError>;

/// Renders `template` with variables taken from `scope`.
pub fn render(template: &Template, scope: &dyn Scope) -> RenderResult<String> {
    let mut renderer = Renderer {
        scope,
        locals: vec![HashMap::new()],
    };
    let mut out = String::new();
    renderer.render_nodes(&template.nodes, &mut out)?;
    Ok(out)
}

struct Renderer<'a> {
    scope: &'a dyn Scope,
    /// Innermost frame last.
    locals: Vec<HashMap<String, TemplateValue>>,
}

impl Renderer<'_> {
    fn lookup(&self, name: &str) -> RenderResult<TemplateValue> {
        for frame in self.locals.iter().rev() {
            if let Some(v) = frame.get(name) {
                return Ok(v.clone());
            }
        }
        self.scope
            .lookup(name)
            .ok_or_else(|| RenderError::MissingKey(name.to_string()))
    }

    fn bind(&mut self, name: &str, value: TemplateValue) {
        if let Some(frame) = self.locals.last_mut() {
            frame.insert(name.to_string(), value);
        }
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> RenderResult<()> {
        for node in nodes {
            self.render_node(node, out)?;
        }
        Ok(())
    }

    fn render_node(&mut self, node: &Node, out: &mut String) -> RenderResult<()> {
        match node {
            Node::Text(t) => out.push_str(t),

            Node::Placeholder { name, spec } => {
                let value = self.lookup(name)?;
                match spec {
                    Some(spec) => out.push_str(&apply_format_spec(name, &value, spec)?),
                    None => out.push_str(&value.to_output()),
                }
            }

            Node::Output(fe) => {
                let value = self.eval_filtered(fe)?;
                out.push_str(&value.to_output());
            }

            Node::If {
                branches,
                otherwise,
            } => {
                for (cond, body) in branches {
                    if self.eval_condition(cond)? {
                        return self.render_nodes(body, out);
                    }
                }
                if let Some(body) = otherwise {
                    self.render_nodes(body, out)?;
                }
            }

            Node::For {
                variable,
                iterable,
                reversed,
                limit,
                offset,
                body,
                otherwise,
            } => {
                let mut items = match self.eval_expr(iterable)? {
                    TemplateValue::List(items) => items,
                    TemplateValue::Nil => Vec::new(),
                    TemplateValue::Object(map) => map
                        .into_iter()
                        .map(|(k, v)| TemplateValue::List(vec![TemplateValue::Text(k), v]))
                        .collect(),
                    other => vec![other],
                };
                items = items.into_iter().skip(*offset).collect();
                if let Some(limit) = limit {
                    items.truncate(*limit);
                }
                if *reversed {
                    items.reverse();
                }

                if items.is_empty() {
                    if let Some(body) = otherwise {
                        self.render_nodes(body, out)?;
                    }
                    return Ok(());
                }

                let length = items.len();
                self.locals.push(HashMap::new());
                let mut result = Ok(());
                for (i, item) in items.into_iter().enumerate() {
                    self.bind(variable, item);
                    self.bind("forloop", forloop_object(i, length));
                    if let Err(e) = self.render_nodes(body, out) {
                        result = Err(e);
                        break;
                    }
                }
                self.locals.pop();
                result?;
            }

            Node::Assign { name, value } => {
                let v = self.eval_filtered(value)?;
                self.bind(name, v);
            }

            Node::Capture { name, body } => {
                let mut captured = String::new();
                self.render_nodes(body, &mut captured)?;
                self.bind(name, TemplateValue::Text(captured));
            }
        }
        Ok(())
    }

    fn eval_condition(&self, cond: &Condition) -> RenderResult<bool> {
        Ok(match cond {
            Condition::Truthy(e) => self.eval_expr(e)?.is_truthy(),
            Condition::Compare { left, op, right } => {
                compare(&self.eval_expr(left)?, *op, &self.eval_expr(right)?)
            }
            Condition::And(a, b) => self.eval_condition(a)? && self.eval_condition(b)?,
            Condition::Or(a, b) => self.eval_condition(a)? || self.eval_condition(b)?,
            Condition::Not(c) => !self.eval_condition(c)?,
        })
    }

    fn eval_filtered(&self, fe: &FilteredExpr) -> RenderResult<TemplateValue> {
        let mut value = self.eval_expr(&fe.expr)?;
        for filter in &fe.filters {
            let args = filter
                .args
                .iter()
                .map(|a| self.eval_expr(a))
                .collect::<RenderResult<Vec<_>>>()?;
            value = apply_filter(&filter.name, value, &args)?;
        }
        Ok(value)
    }

    fn eval_expr(&self, expr: &Expr) -> RenderResult<TemplateValue> {
        match expr {
            Expr::Literal(lit) => Ok(match lit {
                Literal::Nil => TemplateValue::Nil,
                Literal::Boolean(b) => TemplateValue::Boolean(*b),
                Literal::Number(n) => TemplateValue::Number(*n),
                Literal::String(s) => TemplateValue::Text(s.clone()),
            }),
            Expr::Path { root, accessors } => {
                let mut value = self.lookup(root)?;
                for acc in accessors {
                    value = match acc {
                        Accessor::Key(key) => access_key(&value, key),
                        Accessor::Index(index) => access_index(&value, &self.eval_expr(index)?),
                    };
                }
                Ok(value)
            }
            Expr::Range { start, end } => {
                let start = self.eval_expr(start)?.as_number().unwrap_or(0.0) as i64;
                let end = self.eval_expr(end)?.as_number().unwrap_or(0.0) as i64;
                if end.saturating_sub(start) >= MAX_RANGE_LEN {
                    return Err(RenderError::RangeTooLarge { start, end });
                }
                Ok(TemplateValue::List(
                    (start..=end).map(|i| TemplateValue::Number(i as f64)).collect(),
                ))
            }
        }
    }
}

fn forloop_object(i: usize, length: usize) -> TemplateValue {
    let mut map = BTreeMap::new();
    map.insert("index".to_string(), TemplateValue::Number((i + 1) as f64));
    map.insert("index0".to_string(), TemplateValue::Number(i as f64));
    map.insert("first".to_string(), TemplateValue::Boolean(i == 0));
    map.insert("last".to_string(), TemplateValue::Boolean(i + 1 == length));
    map.insert("length".to_string(), TemplateValue::Number(length as f64));
    TemplateValue::Object(map)
}

fn access_key(value: &TemplateValue, key: &str) -> TemplateValue {
    match (value, key) {
        (TemplateValue::Object(map), _) if map.contains_key(key) => map[key].clone(),
        (TemplateValue::List(_) | TemplateValue::Text(_) | TemplateValue::Object(_), "size") => {
            TemplateValue::Number(value.size() as f64)
        }
        (TemplateValue::List(items), "first") => items.first().cloned().unwrap_or(TemplateValue::Nil),
        (TemplateValue::List(items), "last") => items.last().cloned().unwrap_or(TemplateValue::Nil),
        _ => TemplateValue::Nil,
    }
}

fn access_index(value: &TemplateValue, index: &TemplateValue) -> TemplateValue {
    match (value, index) {
        (TemplateValue::List(items), TemplateValue::Number(n)) => {
            let len = items.len() as i64;
            let mut i = *n as i64;
            if i < 0 {
                i += len;
            }
            if i >= 0 && i < len {
                items[i as usize].clone()
            } else {
                TemplateValue::Nil
            }
        }
        (TemplateValue::Object(map), TemplateValue::Text(key)) => {
            map.get(key).cloned().unwrap_or(TemplateValue::Nil)
        }
        _ => TemplateValue::Nil,
    }
}

fn compare(left: &TemplateValue, op: CompareOperator, right: &TemplateValue) -> bool {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (TemplateValue::Number(a), TemplateValue::Number(b)) => a.partial_cmp(b),
        (TemplateValue::Text(a), TemplateValue::Text(b)) => Some(a.cmp(b)),
        _ => None,
    };

    match op {
        CompareOperator::Equal => values_equal(left, right),
        CompareOperator::NotEqual => !values_equal(left, right),
        CompareOperator::LessThan => ordering == Some(Ordering::Less),
        CompareOperator::GreaterThan => ordering == Some(Ordering::Greater),
        CompareOperator::LessEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        CompareOperator::GreaterEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        CompareOperator::Contains => match left {
            TemplateValue::Text(s) => s.contains(&right.to_output()),
            TemplateValue::List(items) => items.iter().any(|i| values_equal(i, right)),
            TemplateValue::Object(map) => map.contains_key(&right.to_output()),
            _ => false,
        },
    }
}

fn values_equal(a: &TemplateValue, b: &TemplateValue) -> bool {
    match (a, b) {
        (TemplateValue::Number(x), TemplateValue::Number(y)) => x == y,
        _ => a == b,
    }
}

// ============================================================================
// FILTERS
// ============================================================================

fn text_arg(filter: &str, args: &[TemplateValue], i: usize) -> RenderResult<String> {
    args.get(i)
        .map(|v| v.to_output())
        .ok_or_else(|| RenderError::InvalidFilterArgs {
            filter: filter.to_string(),
            message: format!("expected at least {} argument(s)", i + 1),
        })
}

fn number_arg(filter: &str, args: &[TemplateValue], i: usize) -> RenderResult<f64> {
    args.get(i)
        .and_then(|v| v.as_number())
        .ok_or_else(|| RenderError::InvalidFilterArgs {
            filter: filter.to_string(),
            message: format!("argument {} must be a number", i + 1),
        })
}

fn number_input(filter: &str, value: &TemplateValue) -> RenderResult<f64> {
    match value {
        TemplateValue::Nil => Ok(0.0),
        other => other.as_number().ok_or_else(|| RenderError::InvalidFilterArgs {
            filter: filter.to_string(),
            message: format!("input '{}' is not a number", other.to_output()),
        }),
    }
}

fn apply_filter(name: &str, value: TemplateValue, args: &[TemplateValue]) -> RenderResult<TemplateValue> {
    use TemplateValue as V;

    Ok(match name {
        "upcase" => V::Text(value.to_output().to_uppercase()),
        "downcase" => V::Text(value.to_output().to_lowercase()),
        "capitalize" => {
            let s = value.to_output();
            let mut chars = s.chars();
            V::Text(match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            })
        }
        "strip" => V::Text(value.to_output().trim().to_string()),
        "lstrip" => V::Text(value.to_output().trim_start().to_string()),
        "rstrip" => V::Text(value.to_output().trim_end().to_string()),
        "size" => V::Number(value.size() as f64),
        "default" => {
            if value.is_blank() {
                args.first().cloned().unwrap_or(V::Nil)
            } else {
                value
            }
        }
        "join" => {
            let sep = if args.is_empty() {
                " ".to_string()
            } else {
                text_arg(name, args, 0)?
            };
            match value {
                V::List(items) => V::Text(
                    items
                        .iter()
                        .map(|v| v.to_output())
                        .collect::<Vec<_>>()
                        .join(&sep),
                ),
                other => other,
            }
        }
        "split" => {
            let sep = text_arg(name, args, 0)?;
            let s = value.to_output();
            if s.is_empty() {
                V::List(Vec::new())
            } else {
                V::List(s.split(sep.as_str()).map(|p| V::Text(p.to_string())).collect())
            }
        }
        "first" => match value {
            V::List(items) => items.into_iter().next().unwrap_or(V::Nil),
            V::Text(s) => s.chars().next().map(|c| V::Text(c.to_string())).unwrap_or(V::Nil),
            _ => V::Nil,
        },
        "last" => match value {
            V::List(items) => items.into_iter().last().unwrap_or(V::Nil),
            V::Text(s) => s.chars().last().map(|c| V::Text(c.to_string())).unwrap_or(V::Nil),
            _ => V::Nil,
        },
        "append" => V::Text(format!("{}{}", value.to_output(), text_arg(name, args, 0)?)),
        "prepend" => V::Text(format!("{}{}", text_arg(name, args, 0)?, value.to_output())),
        "replace" => {
            let from = text_arg(name, args, 0)?;
            let to = if args.len() > 1 { text_arg(name, args, 1)? } else { String::new() };
            V::Text(value.to_output().replace(&from, &to))
        }
        "remove" => V::Text(value.to_output().replace(&text_arg(name, args, 0)?, "")),
        "truncate" => {
            let limit = number_arg(name, args, 0)? as usize;
            let ellipsis = if args.len() > 1 { text_arg(name, args, 1)? } else { "...".to_string() };
            let s = value.to_output();
            if s.chars().count() <= limit {
                V::Text(s)
            } else {
                let keep = limit.saturating_sub(ellipsis.chars().count());
                V::Text(s.chars().take(keep).collect::<String>() + &ellipsis)
            }
        }
        "newline_to_br" => V::Text(value.to_output().replace('\n', "<br />\n")),
        "escape" => V::Text(
            value
                .to_output()
                .replace('&', "&amp;")
                .replace('<', "&lt;")
                .replace('>', "&gt;")
                .replace('"', "&quot;")
                .replace('\'', "&#39;"),
        ),
        "plus" => V::Number(number_input(name, &value)? + number_arg(name, args, 0)?),
        "minus" => V::Number(number_input(name, &value)? - number_arg(name, args, 0)?),
        "times" => V::Number(number_input(name, &value)? * number_arg(name, args, 0)?),
        "divided_by" => {
            let divisor = number_arg(name, args, 0)?;
            if divisor == 0.0 {
                return Err(RenderError::InvalidFilterArgs {
                    filter: name.to_string(),
                    message: "division by zero".to_string(),
                });
            }
            V::Number(number_input(name, &value)? / divisor)
        }
        "round" => {
            let digits = if args.is_empty() { 0.0 } else { number_arg(name, args, 0)? };
            let factor = 10f64.powi(digits as i32);
            V::Number((number_input(name, &value)? * factor).round() / factor)
        }
        "sort" => match value {
            V::List(mut items) => {
                items.sort_by(|a, b| match (a, b) {
                    (V::Number(x), V::Number(y)) => x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal),
                    _ => a.to_output().cmp(&b.to_output()),
                });
                V::List(items)
            }
            other => other,
        },
        "reverse" => match value {
            V::List(mut items) => {
                items.reverse();
                V::List(items)
            }
            other => other,
        },
        "uniq" => match value {
            V::List(items) => {
                let mut seen: Vec<V> = Vec::new();
                for item in items {
                    if !seen.iter().any(|s| values_equal(s, &item)) {
                        seen.push(item);
                    }
                }
                V::List(seen)
            }
            other => other,
        },
        "map" => {
            let key = text_arg(name, args, 0)?;
            match value {
                V::List(items) => V::List(items.iter().map(|i| access_key(i, &key)).collect()),
                other => access_key(&other, &key),
            }
        }
        "compact" => match value {
            V::List(items) => V::List(items.into_iter().filter(|i| *i != V::Nil).collect()),
            other => other,
        },
        other => return Err(RenderError::UnknownFilter(other.to_string())),
    })
}

// ============================================================================
// DISPLAY FORMAT SPECS
// ============================================================================

/// Supports `.Nf` (fixed precision), `d` (integer) and `s` (text).
fn apply_format_spec(name: &str, value: &TemplateValue, spec: &str) -> RenderResult<String> {
    let unsupported = || RenderError::UnsupportedFormat {
        name: name.to_string(),
        spec: spec.to_string(),
    };

    if spec.is_empty() || spec == "s" {
        return Ok(value.to_output());
    }

    if *value == TemplateValue::Nil {
        return Ok(String::new());
    }

    if spec == "d" {
        let n = value.as_number().ok_or_else(unsupported)?;
        return Ok(format_number(n.trunc()));
    }

    if let Some(precision) = spec.strip_prefix('.').and_then(|p| p.strip_suffix('f')) {
        let precision: usize = precision.parse().map_err(|_| unsupported())?;
        let n = value.as_number().ok_or_else(unsupported)?;
        return Ok(format!("{:.*}", precision, n));
    }

    Err(unsupported())
}
