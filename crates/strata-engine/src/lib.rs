//! The Strata engines: overlay, graph query, inheritance, draft editing,
//! validation, rebase, and tree materialization.
//!
//! Everything here is computed fresh per request from the store — there is no
//! shared mutable cache of "the current effective view", which sidesteps
//! invalidation bugs at the cost of recomputation. All functions are generic
//! over [`strata_core::store::OntologyStore`].

pub mod edit;
pub mod error;
pub mod graph;
pub mod inherit;
pub mod materialize;
pub mod overlay;
pub mod rebase;
pub mod validate;
pub mod view;

pub use error::{Error, Result};
pub use view::View;

#[cfg(test)]
mod tests;
