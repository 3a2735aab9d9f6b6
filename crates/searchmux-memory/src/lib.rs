//! searchmux-memory
//!
//! The default backend: every index lives in process memory and searches
//! run the generic match, sort, facet, paginate, project and highlight
//! pipeline over all stored rows. See `index` for storage and `search` for
//! the pipeline.
pub mod index;
pub mod search;
pub mod text_utils;

pub use index::{MemoryConnection, MemoryDriver};
