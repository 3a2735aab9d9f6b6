//! searchmux-router
//!
//! Routes every index name to one configured backend instance through a
//! weighted consistent-hash ring, and wraps reads and writes with id
//! back-fill and optional schema mapping.
pub mod module;
pub mod ring;

pub use module::SearchModule;
pub use ring::HashRing;
