//! Storage side of the in-memory backend.
//!
//! A connection owns one map of indexes behind a reader/writer lock; each
//! index guards its documents with its own lock so writers on one index
//! never block readers of another.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use searchmux_core::traits::{Connection, Driver, Instance};
use searchmux_core::types::{Capabilities, FilterOp, Index, Query, Row, SearchResult, DEFAULT_PRIMARY};
use searchmux_core::Result;

use crate::search;

/// Registered under the default driver key.
#[derive(Debug, Default)]
pub struct MemoryDriver;

impl Driver for MemoryDriver {
    fn connect(&self, instance: &Instance) -> Result<Arc<dyn Connection>> {
        tracing::debug!(instance = %instance.name, "memory connection created");
        Ok(Arc::new(MemoryConnection::new()))
    }
}

struct MemoryIndex {
    primary: RwLock<String>,
    docs: RwLock<BTreeMap<String, Row>>,
}

impl MemoryIndex {
    fn new(primary: &str) -> Self {
        Self {
            primary: RwLock::new(primary.to_string()),
            docs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Id under the primary key, else under `"id"`. Blank ids are rejected.
    fn document_id(&self, row: &Row) -> Option<String> {
        let primary = self.primary.read();
        let raw = row.get(primary.as_str()).or_else(|| row.get(DEFAULT_PRIMARY))?;
        if raw.is_null() {
            return None;
        }
        let id = raw.text().trim().to_string();
        (!id.is_empty()).then_some(id)
    }
}

#[derive(Default)]
pub struct MemoryConnection {
    indexes: RwLock<HashMap<String, Arc<MemoryIndex>>>,
}

impl MemoryConnection {
    pub fn new() -> Self {
        Self::default()
    }

    fn find(&self, name: &str) -> Option<Arc<MemoryIndex>> {
        self.indexes.read().get(name).cloned()
    }

    fn ensure(&self, name: &str) -> Arc<MemoryIndex> {
        if let Some(idx) = self.find(name) {
            return idx;
        }
        self.indexes
            .write()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryIndex::new(DEFAULT_PRIMARY)))
            .clone()
    }

    /// Number of stored documents; zero for unknown indexes.
    pub fn len(&self, index: &str) -> usize {
        self.find(index).map_or(0, |idx| idx.docs.read().len())
    }
}

impl Connection for MemoryConnection {
    fn open(&self) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            sync_index: true,
            clear: true,
            upsert: true,
            delete: true,
            search: true,
            count: true,
            suggest: true,
            sort: true,
            facets: true,
            highlight: true,
            filter_ops: FilterOp::ALL.to_vec(),
        }
    }

    fn sync_index(&self, name: &str, index: &Index) -> Result<()> {
        let idx = self.ensure(name);
        *idx.primary.write() = index.primary_key().to_string();
        Ok(())
    }

    fn clear(&self, index: &str) -> Result<()> {
        if let Some(idx) = self.find(index) {
            idx.docs.write().clear();
        }
        Ok(())
    }

    fn drop_index(&self, index: &str) -> Result<()> {
        self.indexes.write().remove(index);
        Ok(())
    }

    fn upsert(&self, index: &str, rows: Vec<Row>) -> Result<()> {
        let idx = self.ensure(index);
        let keyed: Vec<(String, Row)> = rows
            .into_iter()
            .filter_map(|row| idx.document_id(&row).map(|id| (id, row)))
            .collect();
        let mut docs = idx.docs.write();
        for (id, row) in keyed {
            docs.insert(id, row);
        }
        Ok(())
    }

    fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        if let Some(idx) = self.find(index) {
            let mut docs = idx.docs.write();
            for id in ids {
                docs.remove(id);
            }
        }
        Ok(())
    }

    fn search(&self, index: &str, query: &Query) -> Result<SearchResult> {
        let start = Instant::now();
        let Some(idx) = self.find(index) else {
            return Ok(SearchResult::default());
        };
        let mut result = search::execute(&idx.docs.read(), query);
        result.took = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        Ok(result)
    }

    fn suggest(&self, index: &str, text: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self
            .find(index)
            .map(|idx| search::suggest(&idx.docs.read(), text, limit))
            .unwrap_or_default())
    }
}

impl std::fmt::Debug for MemoryConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let indexes = self.indexes.read();
        let mut names: Vec<&String> = indexes.keys().collect();
        names.sort();
        f.debug_struct("MemoryConnection").field("indexes", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use searchmux_core::types::Value;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn upsert_uses_primary_key_and_skips_rows_without_id() {
        let conn = MemoryConnection::new();
        let index = Index { primary: "sku".into(), ..Index::default() };
        conn.sync_index("products", &index).expect("sync");
        conn.upsert(
            "products",
            vec![
                row(&[("sku", Value::from("p1"))]),
                row(&[("id", Value::from("p2"))]),
                row(&[("name", Value::from("nameless"))]),
                row(&[("sku", Value::from("  "))]),
            ],
        )
        .expect("upsert");
        assert_eq!(conn.len("products"), 2);
    }

    #[test]
    fn last_write_wins_and_delete_is_idempotent() {
        let conn = MemoryConnection::new();
        conn.upsert("i", vec![row(&[("id", Value::from(1)), ("v", Value::from("old"))])]).expect("upsert");
        conn.upsert("i", vec![row(&[("id", Value::from(1)), ("v", Value::from("new"))])]).expect("upsert");
        let result = conn.search("i", &Query::default()).expect("search");
        assert_eq!(result.total, 1);
        assert_eq!(result.hits[0].payload["v"], Value::from("new"));

        conn.delete("i", &["1".to_string()]).expect("delete");
        conn.delete("i", &["1".to_string()]).expect("delete again");
        conn.delete("missing", &["1".to_string()]).expect("delete on unknown index");
        assert_eq!(conn.len("i"), 0);
    }

    #[test]
    fn unknown_index_is_empty_not_an_error() {
        let conn = MemoryConnection::new();
        let result = conn.search("nothing", &Query::default()).expect("search");
        assert_eq!(result.total, 0);
        assert!(result.hits.is_empty());
        assert_eq!(conn.count("nothing", &Query::default()).expect("count"), 0);
        assert!(conn.suggest("nothing", "x", 5).expect("suggest").is_empty());
    }

    #[test]
    fn clear_keeps_index_drop_removes_it() {
        let conn = MemoryConnection::new();
        conn.upsert("i", vec![row(&[("id", Value::from("a"))])]).expect("upsert");
        conn.clear("i").expect("clear");
        assert_eq!(conn.len("i"), 0);
        assert!(conn.find("i").is_some());
        conn.drop_index("i").expect("drop");
        assert!(conn.find("i").is_none());
    }
}
