//! Domain types used by the normalizer, drivers and the router.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A flat document row: field name to dynamically typed value.
pub type Row = BTreeMap<String, Value>;

/// Attribute schema of an index. Opaque to the core; only the
/// [`AttributeMapper`](crate::traits::AttributeMapper) interprets it.
pub type Attributes = BTreeMap<String, Value>;

pub const DEFAULT_PRIMARY: &str = "id";
pub const DEFAULT_LIMIT: usize = 20;

/// Dynamically typed field value.
///
/// The set of kinds is closed: scalars, ordered sequences and string-keyed
/// maps. Every consumer (predicates, sorting, signatures) matches on it
/// exhaustively.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(Row),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Row> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Numeric view: integers, floats and strings that parse as `f64`.
    /// NaN is not a number here.
    pub fn as_f64(&self) -> Option<f64> {
        let n = match self {
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Str(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };
        (!n.is_nan()).then_some(n)
    }

    /// Integer view used for offsets, limits and weights. Floats truncate.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Default textual representation, used for string equality, sort
    /// fallback, facet keys and highlighting.
    pub fn text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Str(s) => s.clone(),
            Value::Time(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Value::List(_) | Value::Map(_) => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => n.as_f64().map_or(Value::Null, Value::Float),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Time(t)
    }
}

impl From<Row> for Value {
    fn from(m: Row) -> Self {
        Value::Map(m)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

/// Converts a JSON object into a [`Row`]; any other JSON shape yields `None`.
pub fn row_from_json(v: serde_json::Value) -> Option<Row> {
    match Value::from(v) {
        Value::Map(m) => Some(m),
        _ => None,
    }
}

/// Static description of a named collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Index {
    pub name: String,
    pub desc: String,
    /// Primary-key field; blank means `"id"`.
    pub primary: String,
    pub attributes: Attributes,
    pub strict_write: bool,
    pub strict_read: bool,
    pub fields: Row,
    pub language: String,
    pub analyzer: String,
    pub setting: Row,
}

impl Index {
    pub fn primary_key(&self) -> &str {
        if self.primary.trim().is_empty() {
            DEFAULT_PRIMARY
        } else {
            &self.primary
        }
    }
}

/// Filter operator. Parsing is lenient; see [`FilterOp::parse`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Ne,
    In,
    Nin,
    Gt,
    Gte,
    Lt,
    Lte,
    Range,
}

impl FilterOp {
    pub const ALL: [FilterOp; 9] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::In,
        FilterOp::Nin,
        FilterOp::Gt,
        FilterOp::Gte,
        FilterOp::Lt,
        FilterOp::Lte,
        FilterOp::Range,
    ];

    /// Accepts `eq`, `$EQ`, `=`, `!=`, `>=`, `not_in` and friends.
    pub fn parse(token: &str) -> Option<FilterOp> {
        let lowered = token.trim().to_lowercase();
        let s = lowered.strip_prefix('$').unwrap_or(&lowered);
        match s {
            "eq" | "=" => Some(FilterOp::Eq),
            "ne" | "!=" => Some(FilterOp::Ne),
            "in" => Some(FilterOp::In),
            "nin" | "not_in" => Some(FilterOp::Nin),
            "gt" | ">" => Some(FilterOp::Gt),
            "gte" | ">=" => Some(FilterOp::Gte),
            "lt" | "<" => Some(FilterOp::Lt),
            "lte" | "<=" => Some(FilterOp::Lte),
            "range" => Some(FilterOp::Range),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::In => "in",
            FilterOp::Nin => "nin",
            FilterOp::Gt => "gt",
            FilterOp::Gte => "gte",
            FilterOp::Lt => "lt",
            FilterOp::Lte => "lte",
            FilterOp::Range => "range",
        }
    }
}

/// A single predicate. Filters in a query are AND-ed.
///
/// - `value`: operand of `eq`/`ne`/`gt`/`gte`/`lt`/`lte`
/// - `values`: candidates of `in`/`nin`
/// - `min`/`max`: inclusive bounds of `range`; `None` is unbounded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
    pub values: Vec<Value>,
    pub min: Option<Value>,
    pub max: Option<Value>,
}

impl Filter {
    pub fn compare(field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
            values: Vec::new(),
            min: None,
            max: None,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(field, FilterOp::Eq, value)
    }

    pub fn within(field: impl Into<String>, op: FilterOp, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: Value::Null,
            values,
            min: None,
            max: None,
        }
    }

    pub fn range(field: impl Into<String>, min: Option<Value>, max: Option<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Range,
            value: Value::Null,
            values: Vec::new(),
            min,
            max,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub desc: bool,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), desc: false }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), desc: true }
    }
}

/// Canonical, backend-agnostic search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub keyword: String,
    pub prefix: bool,
    pub filters: Vec<Filter>,
    pub sorts: Vec<Sort>,
    pub offset: usize,
    pub limit: usize,
    pub fields: Vec<String>,
    pub facets: Vec<String>,
    pub highlight: Vec<String>,
    pub raw: Row,
    pub setting: Row,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            prefix: false,
            filters: Vec::new(),
            sorts: Vec::new(),
            offset: 0,
            limit: DEFAULT_LIMIT,
            fields: Vec::new(),
            facets: Vec::new(),
            highlight: Vec::new(),
            raw: Row::new(),
            setting: Row::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    pub field: String,
    pub value: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub score: f64,
    pub payload: Row,
    #[serde(default, skip_serializing_if = "Row::is_empty")]
    pub highlight: Row,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matches before pagination.
    pub total: u64,
    /// Elapsed milliseconds.
    pub took: u64,
    pub hits: Vec<Hit>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub facets: BTreeMap<String, Vec<Facet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
}

/// Feature flags a backend declares up front.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub sync_index: bool,
    pub clear: bool,
    pub upsert: bool,
    pub delete: bool,
    pub search: bool,
    pub count: bool,
    pub suggest: bool,
    pub sort: bool,
    pub facets: bool,
    pub highlight: bool,
    pub filter_ops: Vec<FilterOp>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_view_accepts_numeric_strings() {
        assert_eq!(Value::from(" 12.5 ").as_f64(), Some(12.5));
        assert_eq!(Value::from(3).as_f64(), Some(3.0));
        assert_eq!(Value::from("abc").as_f64(), None);
        assert_eq!(Value::Bool(true).as_f64(), None);
    }

    #[test]
    fn text_of_whole_float_drops_fraction() {
        assert_eq!(Value::Float(10.0).text(), "10");
        assert_eq!(Value::Float(0.5).text(), "0.5");
        assert_eq!(Value::Null.text(), "null");
    }

    #[test]
    fn json_numbers_keep_integer_kind() {
        let row = row_from_json(json!({"a": 1, "b": 1.5, "c": [1, "x"]})).expect("object");
        assert_eq!(row["a"], Value::Int(1));
        assert_eq!(row["b"], Value::Float(1.5));
        assert_eq!(row["c"], Value::List(vec![Value::Int(1), Value::from("x")]));
    }

    #[test]
    fn filter_op_parse_is_lenient() {
        assert_eq!(FilterOp::parse("$GTE"), Some(FilterOp::Gte));
        assert_eq!(FilterOp::parse(" != "), Some(FilterOp::Ne));
        assert_eq!(FilterOp::parse("not_in"), Some(FilterOp::Nin));
        assert_eq!(FilterOp::parse("like"), None);
    }

    #[test]
    fn primary_key_defaults_to_id() {
        assert_eq!(Index::default().primary_key(), "id");
        let index = Index { primary: "sku".into(), ..Index::default() };
        assert_eq!(index.primary_key(), "sku");
    }
}
