//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Validation findings are never errors — they travel as response data. Only
//! infrastructure failures and malformed requests surface here.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use strata_core::Error as CoreError;
use strata_engine::Error as EngineError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self {
    match e {
      EngineError::Core(core) => match core {
        CoreError::NoCurrentVersion
        | CoreError::VersionNotFound(_)
        | CoreError::DraftNotFound(_)
        | CoreError::EntityNotFound { .. } => ApiError::NotFound(core.to_string()),
        CoreError::CreateTargetExists { .. }
        | CoreError::MissingCanonicalTarget { .. }
        | CoreError::DraftNotEditable { .. } => ApiError::Conflict(core.to_string()),
        other => ApiError::BadRequest(other.to_string()),
      },
      EngineError::PatchRejected(_) | EngineError::ClosureUnsupported(_) => {
        ApiError::BadRequest(e.to_string())
      }
      EngineError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
      EngineError::Store(inner) => ApiError::Store(inner),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
