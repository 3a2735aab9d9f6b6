//! Query normalization.
//!
//! Callers describe a search with any mix of canonical [`Query`] values and
//! dynamic key/value maps. [`build_query`] folds them left to right through
//! [`merge`] into one canonical query. Parsing never fails: shapes that are
//! not understood are dropped.
//!
//! Dynamic maps recognise these keys (each with or without a `$`):
//! `keyword`/`q`, `offset`, `limit`, `fields`/`select`, `facets`,
//! `highlight`, `setting`, `raw`, `sort`/`sorts`, `filters`/`filter`.
//! `$prefix` toggles prefix matching. Every other key that does not start
//! with `$` is a filter on that field.

use crate::types::{Filter, FilterOp, Query, Row, Sort, Value, DEFAULT_LIMIT};

/// One override applied on top of the query built so far.
#[derive(Debug, Clone)]
pub enum QuerySource {
    /// Full merge: non-empty scalars overwrite, lists replace (filters
    /// append), maps merge key by key.
    Canonical(Query),
    /// Key/value description using pseudo-keys and implicit field filters.
    Dynamic(Row),
}

impl From<Query> for QuerySource {
    fn from(q: Query) -> Self {
        QuerySource::Canonical(q)
    }
}

impl From<Row> for QuerySource {
    fn from(m: Row) -> Self {
        QuerySource::Dynamic(m)
    }
}

const RESERVED: &[&str] = &[
    "keyword", "q", "offset", "limit", "fields", "select", "facets", "highlight", "setting", "raw", "sort",
    "sorts", "filters", "filter",
];

/// Normalizes `keyword` plus the ordered overrides into a canonical query.
pub fn build_query<I>(keyword: &str, sources: I) -> Query
where
    I: IntoIterator<Item = QuerySource>,
{
    let start = Query { keyword: keyword.trim().to_string(), ..Query::default() };
    let mut query = sources.into_iter().fold(start, merge);
    if query.limit == 0 {
        query.limit = DEFAULT_LIMIT;
    }
    query
}

/// Applies one override. The result may carry `limit == 0`; [`build_query`]
/// restores the default afterwards.
pub fn merge(dst: Query, source: QuerySource) -> Query {
    match source {
        QuerySource::Canonical(src) => merge_canonical(dst, src),
        QuerySource::Dynamic(map) => merge_dynamic(dst, &map),
    }
}

fn merge_canonical(mut dst: Query, src: Query) -> Query {
    let keyword = src.keyword.trim();
    if !keyword.is_empty() {
        dst.keyword = keyword.to_string();
    }
    if src.prefix {
        dst.prefix = true;
    }
    dst.offset = src.offset;
    if src.limit > 0 {
        dst.limit = src.limit;
    }
    dst.filters.extend(src.filters);
    if !src.sorts.is_empty() {
        dst.sorts = src.sorts;
    }
    if !src.fields.is_empty() {
        dst.fields = src.fields;
    }
    if !src.facets.is_empty() {
        dst.facets = src.facets;
    }
    if !src.highlight.is_empty() {
        dst.highlight = src.highlight;
    }
    dst.raw.extend(src.raw);
    dst.setting.extend(src.setting);
    dst
}

fn merge_dynamic(mut dst: Query, cfg: &Row) -> Query {
    if let Some(keyword) = pick(cfg, &["$keyword", "$q", "keyword", "q"]).and_then(Value::as_str) {
        if !keyword.trim().is_empty() {
            dst.keyword = keyword.trim().to_string();
        }
    }
    if let Some(flag) = cfg.get("$prefix") {
        dst.prefix = matches!(flag, Value::Bool(true)) || flag.as_i64().is_some_and(|n| n != 0);
    }
    if let Some(n) = pick(cfg, &["$offset", "offset"]).and_then(Value::as_i64) {
        dst.offset = usize::try_from(n).unwrap_or(0);
    }
    if let Some(n) = pick(cfg, &["$limit", "limit"]).and_then(Value::as_i64) {
        dst.limit = usize::try_from(n).unwrap_or(0);
    }
    if let Some(v) = pick(cfg, &["$fields", "$select", "fields", "select"]) {
        dst.fields = to_strings(v);
    }
    if let Some(v) = pick(cfg, &["$facets", "facets"]) {
        dst.facets = to_strings(v);
    }
    if let Some(v) = pick(cfg, &["$highlight", "highlight"]) {
        dst.highlight = to_strings(v);
    }
    if let Some(m) = pick_map(cfg, &["$setting", "setting"]) {
        dst.setting.extend(m.clone());
    }
    if let Some(m) = pick_map(cfg, &["$raw", "raw"]) {
        dst.raw.extend(m.clone());
    }
    if let Some(v) = pick(cfg, &["$sort", "sort", "sorts", "$sorts"]) {
        dst.sorts = parse_sorts(v);
    }
    if let Some(v) = pick(cfg, &["$filters", "$filter", "filters", "filter"]) {
        dst.filters.extend(parse_filters(v));
    }
    dst.filters.extend(parse_top_level_filters(cfg));
    dst
}

fn pick<'a>(m: &'a Row, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| m.get(*k))
}

fn pick_map<'a>(m: &'a Row, keys: &[&str]) -> Option<&'a Row> {
    keys.iter().find_map(|k| m.get(*k).and_then(Value::as_map))
}

/// Splits strings on `,` `;` and whitespace; lists are stringified item by
/// item. Any other shape yields an empty list.
pub fn to_strings(v: &Value) -> Vec<String> {
    match v {
        Value::Str(s) => s
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect(),
        Value::List(items) => items.iter().map(Value::text).collect(),
        _ => Vec::new(),
    }
}

/// Accepts `{field: dir}`, `"a,-b"`, `["a", "-b"]` and `[{a: dir}, ...]`.
pub fn parse_sorts(v: &Value) -> Vec<Sort> {
    match v {
        Value::Map(m) => m
            .iter()
            .filter(|(field, _)| !field.trim().is_empty())
            .map(|(field, dir)| Sort {
                field: field.clone(),
                desc: parse_sort_direction(dir).unwrap_or(false),
            })
            .collect(),
        Value::Str(_) => to_strings(v)
            .into_iter()
            .map(|one| match one.strip_prefix('-') {
                Some(field) => Sort::desc(field),
                None => Sort::asc(one.as_str()),
            })
            .filter(|s| !s.field.is_empty())
            .collect(),
        Value::List(items) => items.iter().flat_map(parse_sorts).collect(),
        _ => Vec::new(),
    }
}

/// `Some(true)` for descending. Booleans mean "descending?"; negative
/// numbers and `desc`/`descending`/`-1` are descending.
pub fn parse_sort_direction(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Int(n) => Some(*n < 0),
        Value::Float(f) => Some(*f < 0.0),
        Value::Str(s) => match s.trim().to_lowercase().as_str() {
            "desc" | "descending" | "-1" => Some(true),
            "asc" | "ascending" | "1" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Accepts `{field: operand}` maps and lists of them.
pub fn parse_filters(v: &Value) -> Vec<Filter> {
    match v {
        Value::Map(m) => m.iter().flat_map(|(field, val)| parse_field_filters(field, val)).collect(),
        Value::List(items) => items.iter().flat_map(parse_filters).collect(),
        _ => Vec::new(),
    }
}

/// Filters for one field. A scalar is an equality operand; a map is read
/// as operator keys (`$gt`, `in`, `$range: {min, max}`, ...). A map with no
/// operator key at all is itself the equality operand.
pub fn parse_field_filters(field: &str, val: &Value) -> Vec<Filter> {
    let field = field.trim();
    if field.is_empty() {
        return Vec::new();
    }
    let Value::Map(ops) = val else {
        return vec![Filter::eq(field, val.clone())];
    };

    let mut out = Vec::new();
    for (key, operand) in ops {
        let Some(op) = FilterOp::parse(key) else {
            continue;
        };
        let filter = match op {
            FilterOp::In | FilterOp::Nin => Filter::within(field, op, to_values(operand)),
            FilterOp::Range => {
                let bounds = operand.as_map().unwrap_or(ops);
                Filter::range(field, bounds.get("min").cloned(), bounds.get("max").cloned())
            }
            _ => Filter::compare(field, op, operand.clone()),
        };
        out.push(filter);
    }
    if out.is_empty() {
        out.push(Filter::eq(field, val.clone()));
    }
    out
}

fn to_values(v: &Value) -> Vec<Value> {
    match v {
        Value::List(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn parse_top_level_filters(cfg: &Row) -> Vec<Filter> {
    cfg.iter()
        .filter(|(key, _)| !key.starts_with('$') && !RESERVED.contains(&key.as_str()))
        .flat_map(|(key, val)| parse_field_filters(key, val))
        .collect()
}
