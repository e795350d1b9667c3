//! Handlers for `/drafts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/drafts` | Body: `{"base_version_id": ...}` (defaults to current) |
//! | `GET`  | `/drafts` / `/drafts/:id` | List / fetch |
//! | `POST` | `/drafts/:id/status` | Body: `{"status": "submitted"}` |
//! | `PUT`  | `/drafts/:id/changes` | Upsert a change; 204 when it collapses away |
//! | `DELETE` | `/drafts/:id/changes/:type/:key` | Withdraw a pending change |
//! | `GET`  | `/drafts/:id/changes` | Pending changes in seq order |
//! | `GET`  | `/drafts/:id/validate` | Structured findings, never an exception |
//! | `POST` | `/drafts/:id/rebase` | Body may name the target version |
//! | `GET`  | `/drafts/:id/tree` | Materialized effective tree |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use strata_core::{
  draft::{
    Draft, DraftChange, DraftStatus, EffectiveTree, NewDraftChange,
    RebaseOutcome,
  },
  store::OntologyStore,
  validation::ValidationReport,
};
use strata_engine::{edit, materialize, rebase as rebase_engine, validate as validate_engine};
use uuid::Uuid;

use crate::{error::ApiError, parse_entity_type, parse_key};

// ─── Create / list / fetch ────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateBody {
  /// Defaults to the current version when omitted.
  pub base_version_id: Option<Uuid>,
}

/// `POST /drafts` — body: `{}` or `{"base_version_id": ...}`
pub async fn create<S>(
  State(store): State<Arc<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: OntologyStore,
{
  let base = match body.base_version_id {
    Some(id) => id,
    None => store
      .current_version()
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?
      .ok_or_else(|| {
        ApiError::NotFound("no ontology version has been ingested".into())
      })?
      .version_id,
  };

  let draft = store
    .create_draft(base)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok((StatusCode::CREATED, Json(draft)))
}

/// `GET /drafts`
pub async fn list<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Draft>>, ApiError>
where
  S: OntologyStore,
{
  let drafts = store
    .list_drafts()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(drafts))
}

/// `GET /drafts/:id`
pub async fn get_one<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Draft>, ApiError>
where
  S: OntologyStore,
{
  let draft = store
    .get_draft(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("draft {id} not found")))?;
  Ok(Json(draft))
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
  pub status: DraftStatus,
}

/// `POST /drafts/:id/status` — body: `{"status":"submitted"}`
pub async fn transition<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<TransitionBody>,
) -> Result<Json<Draft>, ApiError>
where
  S: OntologyStore,
{
  let draft = edit::transition_draft(store.as_ref(), id, body.status).await?;
  Ok(Json(draft))
}

// ─── Changes ──────────────────────────────────────────────────────────────────

/// `PUT /drafts/:id/changes` — body: [`NewDraftChange`].
///
/// Returns the stored change, or 204 when a delete collapsed a pending
/// create into nothing.
pub async fn upsert_change<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<NewDraftChange>,
) -> Result<impl IntoResponse, ApiError>
where
  S: OntologyStore,
{
  match edit::apply_change(store.as_ref(), id, body).await? {
    Some(change) => Ok((StatusCode::OK, Json(change)).into_response()),
    None => Ok(StatusCode::NO_CONTENT.into_response()),
  }
}

/// `DELETE /drafts/:id/changes/:type/:key`
pub async fn withdraw_change<S>(
  State(store): State<Arc<S>>,
  Path((id, entity_type, key)): Path<(Uuid, String, String)>,
) -> Result<StatusCode, ApiError>
where
  S: OntologyStore,
{
  let entity_type = parse_entity_type(&entity_type)?;
  let key = parse_key(&key)?;

  let removed =
    edit::withdraw_change(store.as_ref(), id, entity_type, &key).await?;
  if removed {
    Ok(StatusCode::NO_CONTENT)
  } else {
    Err(ApiError::NotFound(format!(
      "no pending change for {entity_type} {key}"
    )))
  }
}

/// `GET /drafts/:id/changes`
pub async fn list_changes<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<DraftChange>>, ApiError>
where
  S: OntologyStore,
{
  store
    .get_draft(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("draft {id} not found")))?;

  let changes = store
    .list_changes(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(changes))
}

// ─── Validation / rebase / tree ───────────────────────────────────────────────

/// `GET /drafts/:id/validate`
pub async fn validate<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ValidationReport>, ApiError>
where
  S: OntologyStore,
{
  let report = validate_engine::validate_draft(store.as_ref(), id).await?;
  Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct RebaseBody {
  /// Defaults to the current version when omitted.
  pub version_id: Option<Uuid>,
}

/// `POST /drafts/:id/rebase` — body: `{}` or `{"version_id": ...}`
pub async fn rebase<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<RebaseBody>,
) -> Result<Json<RebaseOutcome>, ApiError>
where
  S: OntologyStore,
{
  let target = match body.version_id {
    Some(id) => id,
    None => store
      .current_version()
      .await
      .map_err(|e| ApiError::Store(Box::new(e)))?
      .ok_or_else(|| {
        ApiError::NotFound("no ontology version has been ingested".into())
      })?
      .version_id,
  };

  let outcome = rebase_engine::rebase_draft(store.as_ref(), id, target).await?;
  Ok(Json(outcome))
}

/// `GET /drafts/:id/tree` — the PR builder's input.
pub async fn tree<S>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EffectiveTree>, ApiError>
where
  S: OntologyStore,
{
  let tree = materialize::effective_tree(store.as_ref(), Some(id)).await?;
  Ok(Json(tree))
}
