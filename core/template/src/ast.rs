//! FILENAME: core/template/src/ast.rs
//! PURPOSE: Defines the syntax tree for both template dialects.
//! CONTEXT: The parser turns segments and tokens into a `Template`, a flat
//! list of `Node`s whose control-flow nodes own their bodies. The renderer
//! walks this tree against a variable scope.
//!
//! SUPPORTED CONSTRUCTS:
//! - Text runs
//! - Display placeholders: {name}, {score:.2f}
//! - Liquid output: {{ name }}, {{ entry.title | upcase | default: "n/a" }}
//! - Liquid tags: if / elsif / else, unless, for ... in (with reversed,
//!   limit:, offset:), assign, capture, comment

/// Which surface syntax produced a template.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Dialect {
    Display,
    Liquid,
}

/// A parsed template, ready to render.
#[derive(Debug, PartialEq, Clone)]
pub struct Template {
    pub dialect: Dialect,
    pub nodes: Vec<Node>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Node {
    Text(String),

    /// Display placeholder with an optional format spec.
    Placeholder { name: String, spec: Option<String> },

    /// `{{ expr | filter ... }}`
    Output(FilteredExpr),

    /// `{% if %}` / `{% unless %}` chains. Each branch holds its condition
    /// and body; `otherwise` is the `{% else %}` body.
    If {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },

    /// `{% for item in expr %}`
    For {
        variable: String,
        iterable: Expr,
        reversed: bool,
        limit: Option<usize>,
        offset: usize,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },

    /// `{% assign name = expr | filter %}`
    Assign { name: String, value: FilteredExpr },

    /// `{% capture name %}...{% endcapture %}`
    Capture { name: String, body: Vec<Node> },
}

/// An expression followed by a filter chain.
#[derive(Debug, PartialEq, Clone)]
pub struct FilteredExpr {
    pub expr: Expr,
    pub filters: Vec<Filter>,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Filter {
    pub name: String,
    pub args: Vec<Expr>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Literal(Literal),
    /// A variable lookup followed by zero or more accessors.
    Path { root: String, accessors: Vec<Accessor> },
    /// `(start..end)`, inclusive on both ends.
    Range { start: Box<Expr>, end: Box<Expr> },
}

#[derive(Debug, PartialEq, Clone)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Accessor {
    /// `.name`
    Key(String),
    /// `[expr]`
    Index(Expr),
}

#[derive(Debug, PartialEq, Clone)]
pub enum Condition {
    /// A bare expression, tested for truthiness.
    Truthy(Expr),
    Compare {
        left: Expr,
        op: CompareOperator,
        right: Expr,
    },
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompareOperator {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessEqual,
    GreaterEqual,
    Contains,
}

impl Template {
    /// Root variable names referenced anywhere in the template, in first-use
    /// order, excluding names bound by `for`, `assign` and `capture`.
    pub fn variables(&self) -> Vec<String> {
        let mut found = Vec::new();
        let mut bound = Vec::new();
        collect_nodes(&self.nodes, &mut found, &mut bound);
        found
    }
}

fn collect_nodes(nodes: &[Node], found: &mut Vec<String>, bound: &mut Vec<String>) {
    for node in nodes {
        match node {
            Node::Text(_) => {}
            Node::Placeholder { name, .. } => note(name, found, bound),
            Node::Output(fe) => collect_filtered(fe, found, bound),
            Node::If { branches, otherwise } => {
                for (cond, body) in branches {
                    collect_condition(cond, found, bound);
                    collect_nodes(body, found, bound);
                }
                if let Some(body) = otherwise {
                    collect_nodes(body, found, bound);
                }
            }
            Node::For {
                variable,
                iterable,
                body,
                otherwise,
                ..
            } => {
                collect_expr(iterable, found, bound);
                bound.push(variable.clone());
                bound.push("forloop".to_string());
                collect_nodes(body, found, bound);
                bound.pop();
                bound.pop();
                if let Some(body) = otherwise {
                    collect_nodes(body, found, bound);
                }
            }
            Node::Assign { name, value } => {
                collect_filtered(value, found, bound);
                bound.push(name.clone());
            }
            Node::Capture { name, body } => {
                collect_nodes(body, found, bound);
                bound.push(name.clone());
            }
        }
    }
}

fn collect_filtered(fe: &FilteredExpr, found: &mut Vec<String>, bound: &mut Vec<String>) {
    collect_expr(&fe.expr, found, bound);
    for filter in &fe.filters {
        for arg in &filter.args {
            collect_expr(arg, found, bound);
        }
    }
}

fn collect_condition(cond: &Condition, found: &mut Vec<String>, bound: &mut Vec<String>) {
    match cond {
        Condition::Truthy(e) => collect_expr(e, found, bound),
        Condition::Compare { left, right, .. } => {
            collect_expr(left, found, bound);
            collect_expr(right, found, bound);
        }
        Condition::And(a, b) | Condition::Or(a, b) => {
            collect_condition(a, found, bound);
            collect_condition(b, found, bound);
        }
        Condition::Not(c) => collect_condition(c, found, bound),
    }
}

fn collect_expr(expr: &Expr, found: &mut Vec<String>, bound: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Path { root, accessors } => {
            note(root, found, bound);
            for acc in accessors {
                if let Accessor::Index(e) = acc {
                    collect_expr(e, found, bound);
                }
            }
        }
        Expr::Range { start, end } => {
            collect_expr(start, found, bound);
            collect_expr(end, found, bound);
        }
    }
}

fn note(name: &str, found: &mut Vec<String>, bound: &[String]) {
    if !bound.iter().any(|b| b == name) && !found.iter().any(|f| f == name) {
        found.push(name.to_string());
    }
}
