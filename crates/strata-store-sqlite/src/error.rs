//! Error type for `strata-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] strata_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored row failed to decode into its domain type.
  #[error("row decode error: {0}")]
  Decode(String),

  #[error("ontology version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("draft not found: {0}")]
  DraftNotFound(Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
