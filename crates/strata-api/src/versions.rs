//! Handler for `/versions` endpoints.

use std::sync::Arc;

use axum::{Json, extract::State};
use strata_core::{store::OntologyStore, version::OntologyVersion};

use crate::error::ApiError;

/// `GET /versions/current` — 404 until the first successful install.
pub async fn current<S>(
  State(store): State<Arc<S>>,
) -> Result<Json<OntologyVersion>, ApiError>
where
  S: OntologyStore,
{
  let version = store
    .current_version()
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| {
      ApiError::NotFound("no ontology version has been ingested".into())
    })?;
  Ok(Json(version))
}
