//! searchmux-core
//!
//! Shared building blocks for every searchmux crate:
//! - `types`: dynamic values, rows, queries, results and capabilities
//! - `query`: normalization of mixed query descriptions into one `Query`
//! - `predicate`: filter matching and sort ordering
//! - `signature`: deterministic query cache keys
//! - `traits`: the `Driver`, `Connection` and `AttributeMapper` seams
//! - `config`: figment loading and the `[search]` section
//! - `loader`: JSON and JSONL document files
//! - `error`: the shared `Error` and `Result`
#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod loader;
pub mod predicate;
pub mod query;
pub mod signature;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use query::{build_query, QuerySource};
pub use signature::query_signature;
