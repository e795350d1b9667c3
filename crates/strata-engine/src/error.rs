//! Error type for `strata-engine`.

use strata_core::{draft::DraftStatus, entity::EntityType};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Core(#[from] strata_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// A patch handed to the mutation surface could not be folded into the
  /// pending create body. Distinct from the overlay's read-time fallback:
  /// rejecting a write loudly is correct, failing a read is not.
  #[error("patch does not apply: {0}")]
  PatchRejected(String),

  #[error("draft {draft_id} cannot move from {from} to {to}")]
  InvalidTransition {
    draft_id: Uuid,
    from:     DraftStatus,
    to:       DraftStatus,
  },

  #[error("closure is not defined for entity type {0}")]
  ClosureUnsupported(EntityType),
}

impl Error {
  /// Box a backend error. Mirrors how the API layer wraps store failures.
  pub fn store<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
