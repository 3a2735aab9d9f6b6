//! Deterministic query signatures for cache and dedup keys.
//!
//! Two queries that differ only in filter order or map key order produce
//! the same string. Scalars carry a type tag (`s:`, `i:`, `f:`, `b:`,
//! `t:`) so that `1` and `"1"` never collide.

use chrono::SecondsFormat;

use crate::types::{Filter, Query, Sort, Value};

pub fn query_signature(index: &str, query: &Query) -> String {
    [
        format!("index={}", index.trim()),
        format!("keyword={}", query.keyword.trim()),
        format!("prefix={}", query.prefix),
        format!("filters={}", filter_signature(&query.filters)),
        format!("sorts={}", sort_signature(&query.sorts)),
        format!("fields={}", query.fields.join(",")),
        format!("facets={}", query.facets.join(",")),
        format!("highlight={}", query.highlight.join(",")),
        format!("offset={}", query.offset),
        format!("limit={}", query.limit),
        format!("raw={}", map_signature(query.raw.iter())),
        format!("setting={}", map_signature(query.setting.iter())),
    ]
    .join("|")
}

fn filter_signature(filters: &[Filter]) -> String {
    let mut parts: Vec<String> = filters
        .iter()
        .map(|f| {
            [
                f.field.trim().to_string(),
                f.op.as_str().to_string(),
                value_signature(&f.value),
                list_signature(&f.values),
                optional_signature(f.min.as_ref()),
                optional_signature(f.max.as_ref()),
            ]
            .join(":")
        })
        .collect();
    parts.sort();
    parts.join(",")
}

fn sort_signature(sorts: &[Sort]) -> String {
    sorts
        .iter()
        .map(|s| format!("{}:{}", s.field.trim(), if s.desc { "desc" } else { "asc" }))
        .collect::<Vec<_>>()
        .join(",")
}

fn optional_signature(v: Option<&Value>) -> String {
    v.map_or_else(|| "null".to_string(), value_signature)
}

fn list_signature(items: &[Value]) -> String {
    let parts: Vec<String> = items.iter().map(value_signature).collect();
    format!("[{}]", parts.join(","))
}

/// Keys arrive sorted from the `BTreeMap`, which is what keeps this stable.
fn map_signature<'a>(entries: impl Iterator<Item = (&'a String, &'a Value)>) -> String {
    let parts: Vec<String> = entries.map(|(k, v)| format!("{k}:{}", value_signature(v))).collect();
    format!("{{{}}}", parts.join(","))
}

pub fn value_signature(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Str(s) => format!("s:{s}"),
        Value::Bool(b) => format!("b:{}", u8::from(*b)),
        Value::Int(i) => format!("i:{i}"),
        Value::Float(f) => format!("f:{f}"),
        Value::Time(t) => format!("t:{}", t.to_rfc3339_opts(SecondsFormat::Nanos, true)),
        Value::List(items) => list_signature(items),
        Value::Map(m) => map_signature(m.iter()),
    }
}
