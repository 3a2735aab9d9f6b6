//! Seams between the router and concrete backends.

use std::sync::Arc;

use crate::config::InstanceConfig;
use crate::error::Result;
use crate::types::{Attributes, Capabilities, Index, Query, Row, SearchResult};

/// One configured backend connection as seen by a [`Driver`].
#[derive(Debug, Clone)]
pub struct Instance {
    pub name: String,
    pub config: InstanceConfig,
}

/// Factory for backend connections, registered under a driver key.
pub trait Driver: Send + Sync {
    fn connect(&self, instance: &Instance) -> Result<Arc<dyn Connection>>;
}

/// A live backend. All methods are synchronous and may be called
/// concurrently; implementations guard their own state.
pub trait Connection: Send + Sync {
    fn open(&self) -> Result<()>;
    fn close(&self) -> Result<()>;

    fn capabilities(&self) -> Capabilities;

    /// Creates the index if needed, or refreshes its definition.
    fn sync_index(&self, name: &str, index: &Index) -> Result<()>;
    fn clear(&self, index: &str) -> Result<()>;
    fn drop_index(&self, index: &str) -> Result<()>;

    /// Last write wins per document id.
    fn upsert(&self, index: &str, rows: Vec<Row>) -> Result<()>;
    /// Unknown ids are ignored.
    fn delete(&self, index: &str, ids: &[String]) -> Result<()>;

    fn search(&self, index: &str, query: &Query) -> Result<SearchResult>;

    /// Total matches for `query`, ignoring its pagination.
    fn count(&self, index: &str, query: &Query) -> Result<u64> {
        let probe = Query { offset: 0, limit: 1, ..query.clone() };
        Ok(self.search(index, &probe)?.total)
    }

    fn suggest(&self, _index: &str, _text: &str, _limit: usize) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// External schema service. Given an index's attribute schema and a row,
/// returns the remapped row or a failure reason.
pub trait AttributeMapper: Send + Sync {
    fn map(&self, attributes: &Attributes, row: &Row, strict: bool) -> std::result::Result<Row, String>;
}
