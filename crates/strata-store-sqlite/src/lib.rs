//! SQLite backend for the Strata ontology store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! pool without blocking the async runtime. The recursive graph queries
//! (materialized inheritance rebuild, neighborhood traversal, ancestor
//! closure) are path-tracked `WITH RECURSIVE` CTEs, so they terminate on
//! cyclic data instead of hanging.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
