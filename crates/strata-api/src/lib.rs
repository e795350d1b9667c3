//! JSON REST API for Strata.
//!
//! Exposes an axum [`Router`] backed by any
//! [`strata_core::store::OntologyStore`]. Every read endpoint accepts an
//! optional `draft_id` and returns entities and graphs already overlaid —
//! frontends never merge canonical and draft data themselves. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", strata_api::api_router(store.clone()))
//! ```

pub mod drafts;
pub mod entities;
pub mod error;
pub mod graph;
pub mod versions;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{delete, get, post},
};
use serde::Deserialize;
use strata_core::store::OntologyStore;

pub use error::ApiError;

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: OntologyStore + Clone + Send + Sync + 'static,
{
  Router::new()
    // Versions
    .route("/versions/current", get(versions::current::<S>))
    // Effective entities
    .route("/entities/{entity_type}", get(entities::list::<S>))
    .route("/entities/{entity_type}/{key}", get(entities::get_one::<S>))
    .route(
      "/entities/category/{key}/properties",
      get(entities::effective_properties::<S>),
    )
    // Graphs
    .route(
      "/graph/neighborhood/{entity_type}/{key}",
      get(graph::neighborhood::<S>),
    )
    .route("/graph/module/{key}", get(graph::module::<S>))
    .route("/graph/closure/{entity_type}/{key}", get(graph::closure::<S>))
    // Drafts
    .route("/drafts", get(drafts::list::<S>).post(drafts::create::<S>))
    .route("/drafts/{id}", get(drafts::get_one::<S>))
    .route("/drafts/{id}/status", post(drafts::transition::<S>))
    .route(
      "/drafts/{id}/changes",
      get(drafts::list_changes::<S>).put(drafts::upsert_change::<S>),
    )
    .route(
      "/drafts/{id}/changes/{entity_type}/{key}",
      delete(drafts::withdraw_change::<S>),
    )
    .route("/drafts/{id}/validate", get(drafts::validate::<S>))
    .route("/drafts/{id}/rebase", post(drafts::rebase::<S>))
    .route("/drafts/{id}/tree", get(drafts::tree::<S>))
    .with_state(store)
}

/// Query parameters shared by every draft-aware read endpoint.
#[derive(Debug, Deserialize)]
pub struct DraftParams {
  pub draft_id: Option<uuid::Uuid>,
}

/// Parse an `{entity_type}` path segment.
pub(crate) fn parse_entity_type(
  raw: &str,
) -> Result<strata_core::entity::EntityType, ApiError> {
  strata_core::entity::EntityType::from_discriminant(raw)
    .map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// Parse a `{key}` path segment.
pub(crate) fn parse_key(
  raw: &str,
) -> Result<strata_core::entity::EntityKey, ApiError> {
  strata_core::entity::EntityKey::new(raw)
    .map_err(|e| ApiError::BadRequest(e.to_string()))
}
