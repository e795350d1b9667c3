//! Handlers for `/graph` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/graph/neighborhood/{type}/{key}` | `?depth=` (default 2, max 8), `?draft_id` |
//! | `GET`  | `/graph/module/{key}` | Module-scoped graph; optional `?draft_id` |
//! | `GET`  | `/graph/closure/{type}/{key}` | Canonical transitive closure |

use std::{collections::BTreeSet, sync::Arc};

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::Deserialize;
use strata_core::{
  entity::EntityKey,
  graph::{ModuleGraph, NeighborhoodGraph},
  store::OntologyStore,
};
use strata_engine::{View, graph};
use uuid::Uuid;

use crate::{DraftParams, error::ApiError, parse_entity_type, parse_key};

/// Traversal depth is always caller-bounded; the cap keeps a hostile
/// `?depth=` from turning into an unbounded recursive query.
const DEFAULT_DEPTH: u32 = 2;
const MAX_DEPTH: u32 = 8;

#[derive(Debug, Deserialize)]
pub struct NeighborhoodParams {
  pub depth:    Option<u32>,
  pub draft_id: Option<Uuid>,
}

/// `GET /graph/neighborhood/{type}/{key}[?depth=..][&draft_id=..]`
pub async fn neighborhood<S>(
  State(store): State<Arc<S>>,
  Path((entity_type, key)): Path<(String, String)>,
  Query(params): Query<NeighborhoodParams>,
) -> Result<Json<NeighborhoodGraph>, ApiError>
where
  S: OntologyStore,
{
  let entity_type = parse_entity_type(&entity_type)?;
  let key = parse_key(&key)?;
  let depth = params.depth.unwrap_or(DEFAULT_DEPTH).clamp(1, MAX_DEPTH);

  let view = View::resolve(store.as_ref(), params.draft_id).await?;
  let g =
    graph::neighborhood(store.as_ref(), &view, entity_type, &key, depth).await?;
  Ok(Json(g))
}

/// `GET /graph/module/{key}[?draft_id=<id>]`
pub async fn module<S>(
  State(store): State<Arc<S>>,
  Path(key): Path<String>,
  Query(params): Query<DraftParams>,
) -> Result<Json<ModuleGraph>, ApiError>
where
  S: OntologyStore,
{
  let key = parse_key(&key)?;
  let view = View::resolve(store.as_ref(), params.draft_id).await?;
  let g = graph::module_graph(store.as_ref(), &view, &key).await?;
  Ok(Json(g))
}

/// `GET /graph/closure/{type}/{key}[?draft_id=<id>]`
pub async fn closure<S>(
  State(store): State<Arc<S>>,
  Path((entity_type, key)): Path<(String, String)>,
  Query(params): Query<DraftParams>,
) -> Result<Json<BTreeSet<EntityKey>>, ApiError>
where
  S: OntologyStore,
{
  let entity_type = parse_entity_type(&entity_type)?;
  let key = parse_key(&key)?;
  let view = View::resolve(store.as_ref(), params.draft_id).await?;
  let set = graph::closure(store.as_ref(), &view, entity_type, &key).await?;
  Ok(Json(set))
}
