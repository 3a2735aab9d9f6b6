//! Error type shared by every searchmux crate.
//!
//! Startup problems (`MissingDriver`, `Connect`, `InvalidConfig`) abort
//! `SearchModule::open`; the rest are per-call and recoverable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A configured instance names a driver nobody registered.
    #[error("missing search driver: {0}")]
    MissingDriver(String),

    /// A backend refused to connect or open during module startup.
    #[error("connect search instance {instance} failed: {reason}")]
    Connect { instance: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The module is closed or no instance resolves for the index.
    #[error("search is not ready")]
    NotReady,

    /// The schema mapper rejected a row while strict mode was on.
    #[error("search index {index} mapping failed: {reason}")]
    Mapping { index: String, reason: String },

    #[error("operation failed: {0}")]
    Operation(String),
}

pub type Result<T> = std::result::Result<T, Error>;
