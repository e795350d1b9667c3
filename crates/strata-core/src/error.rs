//! Error types for `strata-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::{
  draft::DraftStatus,
  entity::{EntityKey, EntityType},
};

#[derive(Debug, Error)]
pub enum Error {
  #[error("no ontology version has been ingested")]
  NoCurrentVersion,

  #[error("ontology version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("draft not found: {0}")]
  DraftNotFound(Uuid),

  #[error("draft {draft_id} is {status}; changes require an active draft")]
  DraftNotEditable {
    draft_id: Uuid,
    status:   DraftStatus,
  },

  #[error("{entity_type} {entity_key} already exists canonically")]
  CreateTargetExists {
    entity_type: EntityType,
    entity_key:  EntityKey,
  },

  #[error("{entity_type} {entity_key} has no canonical row to {op}")]
  MissingCanonicalTarget {
    entity_type: EntityType,
    entity_key:  EntityKey,
    op:          &'static str,
  },

  #[error("{entity_type} {entity_key} not found")]
  EntityNotFound {
    entity_type: EntityType,
    entity_key:  EntityKey,
  },

  #[error("invalid entity key: {0:?}")]
  InvalidEntityKey(String),

  #[error("unknown entity type discriminant: {0:?}")]
  UnknownEntityType(String),

  #[error("unknown draft status: {0:?}")]
  UnknownDraftStatus(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
