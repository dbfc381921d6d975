//! FILENAME: core/engine/src/config.rs
//! PURPOSE: The declarative flow configuration.
//! CONTEXT: Configuration arrives as already-parsed JSON-like data. Plain
//! records (groups, sorting) deserialize with serde derives; the recursive
//! view and compute specs parse through `TryFrom<serde_json::Value>` so that
//! every node ends up as exactly one variant of a closed type, and malformed
//! nodes are reported with the offending fragment.
//!
//! VIEW DSL RULES:
//! - A bare string is a `display` node; a bare list is a `list` node.
//! - An object node carries exactly one of the tags
//!   `list`, `field`, `join`, `compute`, `liquid`, `tally`, `display`.
//!   Several tags on one node are rejected.
//! - `conditions` guard any node: `{"present": "col"}`,
//!   `{"equal": ["col", value]}` or `{"equal": {"field": "col", "value": v}}`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value as Json};

use crate::error::{EngineError, EngineResult};
use crate::group::GroupKind;
use crate::tally::TallyWhich;
use crate::value::Value;

const VIEW_TAGS: [&str; 7] = ["list", "field", "join", "compute", "liquid", "tally", "display"];
const FIELD_TAGS: [&str; 5] = ["display", "liquid", "regex", "constant", "field"];

/// Default separator of `join` nodes.
pub const DEFAULT_JOIN_SEPARATOR: &str = " ";

// ============================================================================
// FLOW CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlowConfig {
    #[serde(default, alias = "allocation")]
    pub data: Option<GroupDecl>,

    /// Extra read-only input left-joined into `data` by index.
    #[serde(default)]
    pub additional: Option<GroupDecl>,

    #[serde(default, alias = "scores")]
    pub write_data: Option<GroupDecl>,

    #[serde(default, alias = "series")]
    pub write_series: Option<GroupDecl>,

    #[serde(default)]
    pub cache: Option<GroupDecl>,

    #[serde(default)]
    pub globals: Option<GroupDecl>,

    #[serde(default)]
    pub global_consts: Option<GroupDecl>,

    /// Explicit `name -> column` entries.
    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    #[serde(default)]
    pub viewer: Vec<ViewSpec>,

    #[serde(default)]
    pub combinator: Vec<ViewSpec>,

    #[serde(default)]
    pub precompute: Vec<ComputeSpec>,

    #[serde(default)]
    pub compute: Vec<ComputeSpec>,

    #[serde(default)]
    pub postcompute: Vec<ComputeSpec>,

    #[serde(default)]
    pub sortby: Option<SortBy>,
}

impl FlowConfig {
    pub fn from_value(value: Json) -> EngineResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| EngineError::config(format!("invalid flow configuration: {}", e)))
    }

    pub fn from_json_str(text: &str) -> EngineResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| EngineError::config(format!("invalid flow configuration: {}", e)))
    }

    pub fn group(&self, kind: GroupKind) -> Option<&GroupDecl> {
        match kind {
            GroupKind::GlobalConsts => self.global_consts.as_ref(),
            GroupKind::Globals => self.globals.as_ref(),
            GroupKind::WriteSeries => self.write_series.as_ref(),
            GroupKind::WriteData => self.write_data.as_ref(),
            GroupKind::Cache => self.cache.as_ref(),
            GroupKind::Data => self.data.as_ref(),
        }
    }

    /// Declared groups in read priority order.
    pub fn groups(&self) -> Vec<(GroupKind, &GroupDecl)> {
        GroupKind::READ_ORDER
            .into_iter()
            .filter_map(|kind| self.group(kind).map(|decl| (kind, decl)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SortBy {
    pub field: String,

    #[serde(default = "default_true")]
    pub ascending: bool,
}

fn default_true() -> bool {
    true
}

// ============================================================================
// GROUP DECLARATIONS
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GroupDecl {
    /// Index column, or a derivation producing it.
    #[serde(default)]
    pub index: Option<IndexSpec>,

    /// Selector column telling apart sub-rows (`write_series`).
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDecl>,

    #[serde(default)]
    pub strict_columns: bool,

    /// Flatten duplicate index rows into an `entries` list.
    #[serde(default)]
    pub series: bool,

    #[serde(default)]
    pub mapping: BTreeMap<String, String>,

    /// Row of a `globals` group holding the values in use.
    #[serde(default)]
    pub key: Option<String>,

    /// Everything else: the storage descriptor handed to the collaborator.
    #[serde(flatten)]
    pub source: BTreeMap<String, Json>,
}

impl GroupDecl {
    /// Name of the index column once finalized.
    pub fn index_name(&self) -> &str {
        match &self.index {
            Some(IndexSpec::Column(name)) => name,
            Some(IndexSpec::Derived(field)) => &field.name,
            None => "index",
        }
    }

    /// Declared column names, in declaration order.
    pub fn declared_columns(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn descriptor(&self) -> Json {
        Json::Object(self.source.clone().into_iter().collect())
    }
}

/// How the index column is obtained.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Json")]
pub enum IndexSpec {
    Column(String),
    Derived(FieldDecl),
}

impl TryFrom<Json> for IndexSpec {
    type Error = String;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        match json {
            Json::String(name) => Ok(IndexSpec::Column(name)),
            Json::Object(mut map) => {
                if !map.contains_key("name") {
                    map.insert("name".to_string(), Json::String("index".to_string()));
                }
                let field = FieldDecl::try_from(Json::Object(map))?;
                Ok(match field.derivation {
                    None => IndexSpec::Column(field.name),
                    Some(_) => IndexSpec::Derived(field),
                })
            }
            other => Err(format!("index must be a column name or a derivation, got {}", other)),
        }
    }
}

/// A declared column, optionally derived from other columns of its row.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Json")]
pub struct FieldDecl {
    pub name: String,
    pub derivation: Option<Derivation>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    Display(String),
    Liquid(String),
    /// A regex match on `source`; `group` selects the capture (0 is the whole match).
    Regex {
        source: String,
        pattern: String,
        group: usize,
    },
    Constant(Value),
    /// Copy of another column.
    Field(String),
}

impl FieldDecl {
    pub fn plain(name: impl Into<String>) -> Self {
        FieldDecl {
            name: name.into(),
            derivation: None,
        }
    }

    pub fn derived(name: impl Into<String>, derivation: Derivation) -> Self {
        FieldDecl {
            name: name.into(),
            derivation: Some(derivation),
        }
    }
}

impl TryFrom<Json> for FieldDecl {
    type Error = String;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        let mut map = match json {
            Json::String(name) => return Ok(FieldDecl::plain(name)),
            Json::Object(map) => map,
            other => return Err(format!("a field must be a name or an object, got {}", other)),
        };
        let name = match map.remove("name") {
            Some(Json::String(name)) => name,
            _ => return Err(format!("field declaration needs a 'name': {}", Json::Object(map))),
        };
        let tag = single_tag(&map, &FIELD_TAGS, &format!("field '{}'", name))?;
        let Some(tag) = tag else {
            if let Some(extra) = map.keys().next() {
                return Err(format!("field '{}': unexpected key '{}'", name, extra));
            }
            return Ok(FieldDecl::plain(name));
        };
        let body = map.remove(tag).unwrap_or(Json::Null);
        let derivation = match tag {
            "display" => Derivation::Display(expect_string(tag, body)?),
            "liquid" => Derivation::Liquid(expect_string(tag, body)?),
            "constant" => Derivation::Constant(Value::from(body)),
            "field" => Derivation::Field(expect_string(tag, body)?),
            _ => {
                let pattern = expect_string(tag, body)?;
                let compiled = regex::Regex::new(&pattern)
                    .map_err(|e| format!("field '{}': invalid regex: {}", name, e))?;
                let source = match map.remove("source") {
                    Some(Json::String(source)) => source,
                    _ => return Err(format!("field '{}': regex needs a 'source' column", name)),
                };
                let group = match map.remove("group") {
                    Some(Json::Number(n)) => n
                        .as_u64()
                        .map(|g| g as usize)
                        .ok_or_else(|| format!("field '{}': 'group' must be a capture number", name))?,
                    Some(other) => return Err(format!("field '{}': 'group' must be a number, got {}", name, other)),
                    None if compiled.captures_len() > 1 => 1,
                    None => 0,
                };
                if group >= compiled.captures_len() {
                    return Err(format!("field '{}': regex has no capture group {}", name, group));
                }
                Derivation::Regex {
                    source,
                    pattern,
                    group,
                }
            }
        };
        if let Some(extra) = map.keys().next() {
            return Err(format!("unexpected key '{}' on '{}' field '{}'", extra, tag, name));
        }
        Ok(FieldDecl::derived(name, derivation))
    }
}

// ============================================================================
// VIEW SPECS
// ============================================================================

/// A guard on a view node.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// The column holds a non-empty value.
    Present(String),
    /// The column equals the value (numbers and text compare loosely).
    Equal { field: String, value: Value },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Json")]
pub struct ViewSpec {
    pub node: ViewNode,
    pub conditions: Vec<Condition>,
    /// Caption shown next to the value by viewers.
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewNode {
    Field(String),
    Display(String),
    Liquid(String),
    Join {
        items: Vec<ViewSpec>,
        separator: String,
    },
    List(Vec<ViewSpec>),
    Tally(Box<TallySpec>),
    Compute(Box<ComputeSpec>),
}

impl ViewNode {
    pub fn tag(&self) -> &'static str {
        match self {
            ViewNode::Field(_) => "field",
            ViewNode::Display(_) => "display",
            ViewNode::Liquid(_) => "liquid",
            ViewNode::Join { .. } => "join",
            ViewNode::List(_) => "list",
            ViewNode::Tally(_) => "tally",
            ViewNode::Compute(_) => "compute",
        }
    }
}

impl ViewSpec {
    pub fn new(node: ViewNode) -> Self {
        ViewSpec {
            node,
            conditions: Vec::new(),
            label: None,
        }
    }

    pub fn field(column: impl Into<String>) -> Self {
        Self::new(ViewNode::Field(column.into()))
    }

    pub fn display(template: impl Into<String>) -> Self {
        Self::new(ViewNode::Display(template.into()))
    }

    pub fn liquid(template: impl Into<String>) -> Self {
        Self::new(ViewNode::Liquid(template.into()))
    }

    pub fn list(items: Vec<ViewSpec>) -> Self {
        Self::new(ViewNode::List(items))
    }

    pub fn join(items: Vec<ViewSpec>, separator: impl Into<String>) -> Self {
        Self::new(ViewNode::Join {
            items,
            separator: separator.into(),
        })
    }

    pub fn tally(spec: TallySpec) -> Self {
        Self::new(ViewNode::Tally(Box::new(spec)))
    }

    pub fn compute(spec: ComputeSpec) -> Self {
        Self::new(ViewNode::Compute(Box::new(spec)))
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn labelled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parses a view node, reporting problems as `Config` errors.
    pub fn from_json(json: Json) -> EngineResult<Self> {
        ViewSpec::try_from(json).map_err(EngineError::Config)
    }
}

impl TryFrom<Json> for ViewSpec {
    type Error = String;

    fn try_from(json: Json) -> Result<Self, Self::Error> {
        let mut map = match json {
            Json::String(template) => return Ok(ViewSpec::display(template)),
            Json::Array(items) => return Ok(ViewSpec::list(parse_views(items)?)),
            Json::Object(map) => map,
            other => return Err(format!("a view must be a string, list or object, got {}", other)),
        };

        let conditions = match map.remove("conditions") {
            Some(json) => parse_conditions(json)?,
            None => Vec::new(),
        };
        let label = match map.remove("label").or_else(|| map.remove("name")) {
            Some(Json::String(label)) => Some(label),
            Some(other) => return Err(format!("view 'label' must be a string, got {}", other)),
            None => None,
        };

        let Some(tag) = single_tag(&map, &VIEW_TAGS, "view")? else {
            return Err(format!(
                "view has none of the tags {}: {}",
                VIEW_TAGS.join(", "),
                Json::Object(map)
            ));
        };
        let body = map.remove(tag).unwrap_or(Json::Null);
        let node = match tag {
            "list" => match body {
                Json::Array(items) => ViewNode::List(parse_views(items)?),
                other => return Err(format!("'list' must be a list of views, got {}", other)),
            },
            "field" => ViewNode::Field(expect_string(tag, body)?),
            "join" => parse_join(body, map.remove("separator"))?,
            "compute" => ViewNode::Compute(Box::new(ComputeSpec::try_from(body)?)),
            "liquid" => ViewNode::Liquid(expect_string(tag, body)?),
            "tally" => ViewNode::Tally(Box::new(TallySpec::try_from(body)?)),
            _ => ViewNode::Display(expect_string(tag, body)?),
        };

        if let Some(extra) = map.keys().next() {
            return Err(format!("unexpected key '{}' on a '{}' view", extra, tag));
        }

        Ok(ViewSpec {
            node,
            conditions,
            label,
        })
    }
}

fn parse_views(items: Vec<Json>) -> Result<Vec<ViewSpec>, String> {
    items.into_iter().map(ViewSpec::try_from).collect()
}

fn parse_join(body: Json, separator: Option<Json>) -> Result<ViewNode, String> {
    let (items, inner_separator) = match body {
        Json::Array(items) => (items, None),
        Json::Object(mut map) => {
            let items = match map.remove("list") {
                Some(Json::Array(items)) => items,
                _ => return Err("'join' needs a 'list' of views".to_string()),
            };
            (items, map.remove("separator"))
        }
        other => return Err(format!("'join' must be a list or an object, got {}", other)),
    };
    let separator = match separator.or(inner_separator) {
        Some(Json::String(s)) => s,
        Some(other) => return Err(format!("'separator' must be a string, got {}", other)),
        None => DEFAULT_JOIN_SEPARATOR.to_string(),
    };
    Ok(ViewNode::Join {
        items: parse_views(items)?,
        separator,
    })
}

fn parse_conditions(json: Json) -> Result<Vec<Condition>, String> {
    let items = match json {
        Json::Array(items) => items,
        single @ Json::Object(_) => vec![single],
        other => return Err(format!("'conditions' must be a list, got {}", other)),
    };
    let mut conditions = Vec::new();
    for item in items {
        let Json::Object(map) = item else {
            return Err(format!("a condition must be an object, got {}", item));
        };
        for (kind, body) in map {
            conditions.push(parse_condition(&kind, body)?);
        }
    }
    Ok(conditions)
}

fn parse_condition(kind: &str, body: Json) -> Result<Condition, String> {
    match kind {
        "present" => Ok(Condition::Present(expect_string(kind, body)?)),
        "equal" => match body {
            Json::Array(pair) if pair.len() == 2 => {
                let mut pair = pair.into_iter();
                let field = expect_string(kind, pair.next().unwrap_or(Json::Null))?;
                let value = Value::from(pair.next().unwrap_or(Json::Null));
                Ok(Condition::Equal { field, value })
            }
            Json::Object(mut map) => {
                let field = expect_string(kind, map.remove("field").unwrap_or(Json::Null))?;
                let value = Value::from(map.remove("value").unwrap_or(Json::Null));
                Ok(Condition::Equal { field, value })
            }
            other => Err(format!("'equal' needs [field, value], got {}", other)),
        },
        other => Err(format!("unknown condition '{}'; expected 'present' or 'equal'", other)),
    }
}

// ============================================================================
// TALLY SPECS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TallySpec {
    pub which: TallyWhich,
    pub reverse: bool,
    pub begin: Option<String>,
    pub end: Option<String>,
    /// Resolved once per selected sub-row.
    pub view: ViewSpec,
}

impl TallySpec {
    pub fn new(which: TallyWhich, view: ViewSpec) -> Self {
        TallySpec {
            which,
            reverse: false,
            begin: None,
            end: None,
            view,
        }
    }
}

impl TryFrom<Json> for TallySpec {
    type Error = String;

    /// `{"which": "earlier", "view": ...}`; the view may also be given inline
    /// through the remaining keys: `{"which": "all", "display": "{note}"}`.
    fn try_from(json: Json) -> Result<Self, Self::Error> {
        let Json::Object(mut map) = json else {
            return Err(format!("'tally' must be an object, got {}", json));
        };
        let which = match map.remove("which") {
            Some(Json::String(keyword)) => keyword.parse::<TallyWhich>().map_err(|e| match e {
                EngineError::Config(message) => message,
                other => other.to_string(),
            })?,
            Some(other) => return Err(format!("tally 'which' must be a keyword, got {}", other)),
            None => TallyWhich::All,
        };
        let reverse = match map.remove("reverse") {
            Some(Json::Bool(b)) => b,
            Some(other) => return Err(format!("tally 'reverse' must be a boolean, got {}", other)),
            None => false,
        };
        let begin = optional_string(&mut map, "begin")?;
        let end = optional_string(&mut map, "end")?;
        let view = match map.remove("view") {
            Some(view) => ViewSpec::try_from(view)?,
            None if !map.is_empty() => ViewSpec::try_from(Json::Object(map))?,
            None => return Err("tally needs a 'view' to render per sub-row".to_string()),
        };
        Ok(TallySpec {
            which,
            reverse,
            begin,
            end,
            view,
        })
    }
}

// ============================================================================
// COMPUTE SPECS
// ============================================================================

/// What a compute spec writes.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ComputeTarget {
    /// Side-effecting call, nothing stored.
    #[default]
    None,
    One(String),
    /// Multi-output; `"_"` entries discard their output.
    Many(Vec<String>),
}

impl ComputeTarget {
    pub fn names(&self) -> Vec<&str> {
        match self {
            ComputeTarget::None => Vec::new(),
            ComputeTarget::One(name) => vec![name.as_str()],
            ComputeTarget::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "Json")]
pub struct ComputeSpec {
    pub function: String,
    pub field: ComputeTarget,
    /// Literal arguments.
    pub args: BTreeMap<String, Value>,
    /// Arguments produced by calling another function.
    pub function_args: BTreeMap<String, ComputeSpec>,
    /// `kwarg -> column`: one cell of the current row.
    pub row_args: BTreeMap<String, String>,
    /// `kwarg -> column`: the whole column across entities.
    pub column_args: BTreeMap<String, String>,
    /// `kwarg -> column`: the column across the entity's sub-rows.
    pub subseries_args: BTreeMap<String, String>,
    pub view_args: BTreeMap<String, ViewSpec>,
    pub refresh: bool,
}

impl ComputeSpec {
    pub fn new(function: impl Into<String>) -> Self {
        ComputeSpec {
            function: function.into(),
            field: ComputeTarget::None,
            args: BTreeMap::new(),
            function_args: BTreeMap::new(),
            row_args: BTreeMap::new(),
            column_args: BTreeMap::new(),
            subseries_args: BTreeMap::new(),
            view_args: BTreeMap::new(),
            refresh: false,
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.field = ComputeTarget::One(name.into());
        self
    }

    pub fn fields<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.field = ComputeTarget::Many(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn function_arg(mut self, name: impl Into<String>, spec: ComputeSpec) -> Self {
        self.function_args.insert(name.into(), spec);
        self
    }

    pub fn row_arg(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.row_args.insert(name.into(), column.into());
        self
    }

    pub fn column_arg(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.column_args.insert(name.into(), column.into());
        self
    }

    pub fn subseries_arg(mut self, name: impl Into<String>, column: impl Into<String>) -> Self {
        self.subseries_args.insert(name.into(), column.into());
        self
    }

    pub fn view_arg(mut self, name: impl Into<String>, view: ViewSpec) -> Self {
        self.view_args.insert(name.into(), view);
        self
    }

    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn from_json(json: Json) -> EngineResult<Self> {
        ComputeSpec::try_from(json).map_err(EngineError::Config)
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawComputeSpec {
    function: String,
    #[serde(default)]
    field: Option<OneOrMany>,
    #[serde(default)]
    args: BTreeMap<String, Value>,
    #[serde(default)]
    function_args: BTreeMap<String, ComputeSpec>,
    #[serde(default)]
    row_args: ArgColumns,
    #[serde(default)]
    column_args: ArgColumns,
    #[serde(default)]
    subseries_args: ArgColumns,
    #[serde(default)]
    view_args: BTreeMap<String, ViewSpec>,
    #[serde(default)]
    refresh: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Argument columns given either as `{kwarg: column}` or as a list of
/// columns passed under their own names.
#[derive(Deserialize)]
#[serde(untagged)]
enum ArgColumns {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
}

impl Default for ArgColumns {
    fn default() -> Self {
        ArgColumns::Map(BTreeMap::new())
    }
}

impl From<ArgColumns> for BTreeMap<String, String> {
    fn from(args: ArgColumns) -> Self {
        match args {
            ArgColumns::Map(map) => map,
            ArgColumns::List(columns) => columns.into_iter().map(|c| (c.clone(), c)).collect(),
        }
    }
}

impl TryFrom<Json> for ComputeSpec {
    type Error = String;

    /// A bare string names a function called without arguments or target.
    fn try_from(json: Json) -> Result<Self, Self::Error> {
        if let Json::String(function) = json {
            return Ok(ComputeSpec::new(function));
        }
        let raw: RawComputeSpec =
            serde_json::from_value(json).map_err(|e| format!("invalid compute spec: {}", e))?;
        let field = match raw.field {
            None => ComputeTarget::None,
            Some(OneOrMany::One(name)) => ComputeTarget::One(name),
            Some(OneOrMany::Many(names)) => ComputeTarget::Many(names),
        };
        Ok(ComputeSpec {
            function: raw.function,
            field,
            args: raw.args,
            function_args: raw.function_args,
            row_args: raw.row_args.into(),
            column_args: raw.column_args.into(),
            subseries_args: raw.subseries_args.into(),
            view_args: raw.view_args,
            refresh: raw.refresh,
        })
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// The one tag of `tags` present in `map`; several are an error.
fn single_tag(
    map: &Map<String, Json>,
    tags: &[&'static str],
    what: &str,
) -> Result<Option<&'static str>, String> {
    let present: Vec<&'static str> = tags.iter().copied().filter(|t| map.contains_key(*t)).collect();
    match present.as_slice() {
        [] => Ok(None),
        [tag] => Ok(Some(*tag)),
        many => Err(format!(
            "{} carries several tags ({}); use exactly one",
            what,
            many.join(", ")
        )),
    }
}

fn expect_string(key: &str, json: Json) -> Result<String, String> {
    match json {
        Json::String(s) => Ok(s),
        other => Err(format!("'{}' must be a string, got {}", key, other)),
    }
}

fn optional_string(map: &mut Map<String, Json>, key: &str) -> Result<Option<String>, String> {
    match map.remove(key) {
        None | Some(Json::Null) => Ok(None),
        Some(json) => expect_string(key, json).map(Some),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn group_aliases_and_descriptor() {
        let config = FlowConfig::from_value(json!({
            "allocation": {"index": "id", "path": "alloc.json"},
            "scores": {"index": "id", "fields": ["score", "comment"], "strict_columns": true},
            "series": {"index": "id", "selector": "date"},
            "sortby": {"field": "score"}
        }))
        .unwrap();
        let data = config.data.as_ref().unwrap();
        assert_eq!(data.index_name(), "id");
        assert_eq!(data.source.get("path"), Some(&json!("alloc.json")));
        let scores = config.write_data.as_ref().unwrap();
        assert!(scores.strict_columns);
        assert_eq!(scores.declared_columns(), vec!["score", "comment"]);
        assert_eq!(config.write_series.as_ref().unwrap().selector.as_deref(), Some("date"));
        assert_eq!(config.groups().len(), 3);
        assert!(config.sortby.unwrap().ascending);
    }

    #[test]
    fn bare_string_is_display() {
        let spec = ViewSpec::from_json(json!("{title}")).unwrap();
        assert_eq!(spec.node, ViewNode::Display("{title}".into()));
    }

    #[test]
    fn several_tags_are_rejected() {
        let err = ViewSpec::from_json(json!({"field": "a", "display": "{a}"})).unwrap_err();
        assert!(matches!(err, EngineError::Config(ref m) if m.contains("several tags")));
    }

    #[test]
    fn join_with_conditions() {
        let spec = ViewSpec::from_json(json!({
            "join": [{"field": "first"}, {"field": "last"}],
            "separator": ", ",
            "conditions": [{"present": "first"}, {"equal": ["status", "done"]}]
        }))
        .unwrap();
        match &spec.node {
            ViewNode::Join { items, separator } => {
                assert_eq!(items.len(), 2);
                assert_eq!(separator, ", ");
            }
            other => panic!("unexpected node {:?}", other),
        }
        assert_eq!(spec.conditions.len(), 2);
        assert_eq!(
            spec.conditions[1],
            Condition::Equal {
                field: "status".into(),
                value: Value::from("done")
            }
        );
    }

    #[test]
    fn tally_with_inline_view() {
        let spec = ViewSpec::from_json(json!({
            "tally": {"which": "earlier", "reverse": true, "display": "{note}"}
        }))
        .unwrap();
        let ViewNode::Tally(tally) = spec.node else {
            panic!("expected tally");
        };
        assert_eq!(tally.which, TallyWhich::Earlier);
        assert!(tally.reverse);
        assert_eq!(tally.view, ViewSpec::display("{note}"));
    }

    #[test]
    fn unknown_tally_keyword_is_config_error() {
        let err = ViewSpec::from_json(json!({"tally": {"which": "sideways", "field": "x"}})).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn compute_spec_forms() {
        let spec = ComputeSpec::from_json(json!({
            "function": "splitname",
            "field": ["first", "last"],
            "row_args": ["name"],
            "column_args": {"values": "score"},
            "function_args": {"today": "today"},
            "refresh": true
        }))
        .unwrap();
        assert_eq!(spec.field.names(), vec!["first", "last"]);
        assert_eq!(spec.row_args.get("name").map(String::as_str), Some("name"));
        assert_eq!(spec.column_args.get("values").map(String::as_str), Some("score"));
        assert_eq!(spec.function_args["today"], ComputeSpec::new("today"));
        assert!(spec.refresh);
    }

    #[test]
    fn compute_spec_rejects_unknown_keys() {
        assert!(ComputeSpec::from_json(json!({"function": "f", "feild": "x"})).is_err());
    }

    #[test]
    fn field_derivations() {
        let year = FieldDecl::try_from(json!({
            "name": "year", "regex": "(\\d{4})", "source": "Date"
        }))
        .unwrap();
        assert_eq!(
            year.derivation,
            Some(Derivation::Regex {
                source: "Date".into(),
                pattern: "(\\d{4})".into(),
                group: 1
            })
        );
        let index = IndexSpec::try_from(json!({"display": "{a}-{b}"})).unwrap();
        assert!(matches!(index, IndexSpec::Derived(ref f) if f.name == "index"));
        assert!(FieldDecl::try_from(json!({"name": "x", "display": "a", "liquid": "b"})).is_err());
    }

    #[test]
    fn field_decl_rejects_unknown_keys() {
        let err = FieldDecl::try_from(json!({"name": "year", "display": "{a}", "soruce": "Date"})).unwrap_err();
        assert!(err.contains("soruce"));
        assert!(FieldDecl::try_from(json!({"name": "plain", "typo": 1})).is_err());
        assert!(FieldDecl::try_from(json!({"name": "year", "regex": "(\\d{4})", "source": "Date", "group": 1})).is_ok());
    }
}
