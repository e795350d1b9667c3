//! Handlers for `/entities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities/{type}` | Effective list; optional `?draft_id` |
//! | `GET`  | `/entities/{type}/{key}` | 404 if absent from the effective view |
//! | `GET`  | `/entities/category/{key}/properties` | Direct + inherited, with provenance |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use strata_core::{
  draft::EffectiveEntity, entity::EffectiveProperty, store::OntologyStore,
};
use strata_engine::{View, inherit, overlay};

use crate::{DraftParams, error::ApiError, parse_entity_type, parse_key};

/// `GET /entities/{type}[?draft_id=<id>]`
pub async fn list<S>(
  State(store): State<Arc<S>>,
  Path(entity_type): Path<String>,
  Query(params): Query<DraftParams>,
) -> Result<Json<Vec<EffectiveEntity>>, ApiError>
where
  S: OntologyStore,
{
  let entity_type = parse_entity_type(&entity_type)?;
  let view = View::resolve(store.as_ref(), params.draft_id).await?;
  let entities = overlay::list_effective(store.as_ref(), &view, entity_type).await?;
  Ok(Json(entities))
}

/// `GET /entities/{type}/{key}[?draft_id=<id>]`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path((entity_type, key)): Path<(String, String)>,
  Query(params): Query<DraftParams>,
) -> Result<Json<EffectiveEntity>, ApiError>
where
  S: OntologyStore,
{
  let entity_type = parse_entity_type(&entity_type)?;
  let key = parse_key(&key)?;
  let view = View::resolve(store.as_ref(), params.draft_id).await?;

  let entity = overlay::effective(store.as_ref(), &view, entity_type, &key)
    .await?
    .ok_or_else(|| {
      ApiError::NotFound(format!("{entity_type} {key} not found"))
    })?;
  Ok(Json(entity))
}

/// `GET /entities/category/{key}/properties[?draft_id=<id>]`
pub async fn effective_properties<S>(
  State(store): State<Arc<S>>,
  Path(key): Path<String>,
  Query(params): Query<DraftParams>,
) -> Result<Json<Vec<EffectiveProperty>>, ApiError>
where
  S: OntologyStore,
{
  let key = parse_key(&key)?;
  let view = View::resolve(store.as_ref(), params.draft_id).await?;
  let properties =
    inherit::effective_properties(store.as_ref(), &view, &key).await?;
  Ok(Json(properties))
}
