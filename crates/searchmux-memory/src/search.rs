//! The in-memory search pipeline:
//! match → filter → sort → facet → paginate → project → highlight.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use searchmux_core::predicate::{all_match, compare_for_sort};
use searchmux_core::types::{Facet, Hit, Query, Row, SearchResult, Sort, Value, DEFAULT_LIMIT};

use crate::text_utils::{contains_word_prefix, highlight_first};

/// Every match scores the same; there is no relevance model.
pub const CONSTANT_SCORE: f64 = 1.0;
pub const DEFAULT_SUGGEST_LIMIT: usize = 10;

/// Runs `query` over `docs` (keyed by document id). `took` is left at zero
/// for the caller to fill in.
pub fn execute(docs: &BTreeMap<String, Row>, query: &Query) -> SearchResult {
    let keyword = query.keyword.trim().to_lowercase();

    let mut matched: Vec<Hit> = docs
        .iter()
        .filter(|(_, payload)| keyword_match(&keyword, query.prefix, payload))
        .filter(|(_, payload)| all_match(&query.filters, payload))
        .map(|(id, payload)| Hit {
            id: id.clone(),
            score: CONSTANT_SCORE,
            payload: payload.clone(),
            highlight: Row::new(),
        })
        .collect();

    sort_hits(&mut matched, &query.sorts);
    let facets = count_facets(&matched, &query.facets);

    let total = matched.len();
    let offset = query.offset.min(total);
    let limit = if query.limit == 0 { DEFAULT_LIMIT } else { query.limit };
    let end = offset.saturating_add(limit).min(total);
    let mut hits: Vec<Hit> = matched.drain(offset..end).collect();

    if !query.fields.is_empty() {
        for hit in &mut hits {
            hit.payload = pick_fields(&hit.payload, &query.fields);
        }
    }

    if !keyword.is_empty() && !query.highlight.is_empty() {
        for hit in &mut hits {
            hit.highlight = highlight_fields(&hit.payload, &query.highlight, &keyword);
        }
    }

    SearchResult { total: total as u64, took: 0, hits, facets, raw: None }
}

/// Substring match on the row's serialized JSON text, or a word-start match
/// in prefix mode. `keyword` must be lower-cased; empty matches everything.
pub fn keyword_match(keyword: &str, prefix: bool, payload: &Row) -> bool {
    if keyword.is_empty() {
        return true;
    }
    let text = serde_json::to_string(payload).unwrap_or_default().to_lowercase();
    if prefix {
        contains_word_prefix(&text, keyword)
    } else {
        text.contains(keyword)
    }
}

/// Stable multi-key sort; ties after all keys break on ascending id.
pub fn sort_hits(hits: &mut [Hit], sorts: &[Sort]) {
    hits.sort_by(|a, b| {
        for sort in sorts {
            let ord = compare_for_sort(a.payload.get(&sort.field), b.payload.get(&sort.field));
            if ord != Ordering::Equal {
                return if sort.desc { ord.reverse() } else { ord };
            }
        }
        a.id.cmp(&b.id)
    });
}

/// Distinct textual values per requested field over all matched hits,
/// keys in sorted order. A missing field counts under `"null"`.
pub fn count_facets(hits: &[Hit], fields: &[String]) -> BTreeMap<String, Vec<Facet>> {
    let mut facets = BTreeMap::new();
    for field in fields {
        let mut counter: BTreeMap<String, u64> = BTreeMap::new();
        for hit in hits {
            let key = hit.payload.get(field).map_or_else(|| Value::Null.text(), Value::text);
            *counter.entry(key).or_default() += 1;
        }
        let values = counter
            .into_iter()
            .map(|(value, count)| Facet { field: field.clone(), value, count })
            .collect();
        facets.insert(field.clone(), values);
    }
    facets
}

/// Projects `payload` onto `fields`; keeps the whole row when none exist.
pub fn pick_fields(payload: &Row, fields: &[String]) -> Row {
    let picked: Row = fields
        .iter()
        .filter_map(|f| payload.get(f).map(|v| (f.clone(), v.clone())))
        .collect();
    if picked.is_empty() {
        payload.clone()
    } else {
        picked
    }
}

fn highlight_fields(payload: &Row, fields: &[String], keyword: &str) -> Row {
    fields
        .iter()
        .filter_map(|field| {
            let text = payload.get(field)?.text();
            highlight_first(&text, keyword).map(|marked| (field.clone(), Value::Str(marked)))
        })
        .collect()
}

/// Distinct non-empty field values containing `text`, sorted, at most
/// `limit` (10 when zero).
pub fn suggest(docs: &BTreeMap<String, Row>, text: &str, limit: usize) -> Vec<String> {
    let limit = if limit == 0 { DEFAULT_SUGGEST_LIMIT } else { limit };
    let needle = text.trim().to_lowercase();
    let candidates: BTreeSet<String> = docs
        .values()
        .flat_map(|payload| payload.values())
        .map(|v| v.text().trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| needle.is_empty() || s.to_lowercase().contains(&needle))
        .collect();
    candidates.into_iter().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchmux_core::types::{row_from_json, Filter};
    use serde_json::json;

    fn store(rows: serde_json::Value) -> BTreeMap<String, Row> {
        let serde_json::Value::Array(items) = rows else {
            panic!("array expected");
        };
        items
            .into_iter()
            .map(|v| {
                let row = row_from_json(v).expect("object");
                (row["id"].text(), row)
            })
            .collect()
    }

    fn ids(result: &SearchResult) -> Vec<&str> {
        result.hits.iter().map(|h| h.id.as_str()).collect()
    }

    #[test]
    fn missing_sort_field_sorts_as_null_text() {
        let docs = store(json!([{"id": "a", "n": "x"}, {"id": "b"}]));
        let query = Query { sorts: vec![Sort::asc("n")], ..Query::default() };
        // a missing value compares as "null", which sorts before "x"
        assert_eq!(ids(&execute(&docs, &query)), vec!["b", "a"]);
    }

    #[test]
    fn keyword_searches_serialized_row() {
        let docs = store(json!([{"id": "1", "title": "Green TEA"}, {"id": "2", "title": "Coffee"}]));
        let query = Query { keyword: "tea".into(), ..Query::default() };
        assert_eq!(ids(&execute(&docs, &query)), vec!["1"]);
    }

    #[test]
    fn prefix_mode_needs_word_start() {
        let docs = store(json!([{"id": "1", "title": "steam"}, {"id": "2", "title": "teapot"}]));
        let query = Query { keyword: "tea".into(), prefix: true, ..Query::default() };
        assert_eq!(ids(&execute(&docs, &query)), vec!["2"]);
    }

    #[test]
    fn projection_falls_back_to_full_row() {
        let docs = store(json!([{"id": "1", "a": 1, "b": 2}]));
        let query = Query { fields: vec!["zzz".into()], ..Query::default() };
        assert_eq!(execute(&docs, &query).hits[0].payload.len(), 3);
        let query = Query { fields: vec!["a".into()], ..Query::default() };
        assert_eq!(execute(&docs, &query).hits[0].payload.len(), 1);
    }

    #[test]
    fn highlight_requires_keyword() {
        let docs = store(json!([{"id": "1", "title": "Green Tea tea"}]));
        let query = Query { highlight: vec!["title".into()], ..Query::default() };
        assert!(execute(&docs, &query).hits[0].highlight.is_empty());

        let query = Query { keyword: "TEA".into(), ..query };
        let result = execute(&docs, &query);
        assert_eq!(result.hits[0].highlight["title"], Value::from("Green <em>Tea</em> tea"));
        assert_eq!(result.hits[0].payload["title"], Value::from("Green Tea tea"));
    }

    #[test]
    fn filters_are_and_ed() {
        let docs = store(json!([{"id": "1", "a": 1, "b": 2}, {"id": "2", "a": 1, "b": 3}]));
        let query = Query { filters: vec![Filter::eq("a", 1), Filter::eq("b", 3)], ..Query::default() };
        assert_eq!(ids(&execute(&docs, &query)), vec!["2"]);
    }

    #[test]
    fn suggest_is_sorted_distinct_and_limited() {
        let docs = store(json!([
            {"id": "1", "title": "Tea"},
            {"id": "2", "title": "Teapot"},
            {"id": "3", "title": "tea"}
        ]));
        assert_eq!(suggest(&docs, "TEA", 2), vec!["Tea", "Teapot"]);
        assert_eq!(suggest(&docs, "pot", 0), vec!["Teapot"]);
    }
}
