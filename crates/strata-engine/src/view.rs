//! Per-request view resolution: which canonical version, and which draft,
//! frame a read.

use strata_core::{Error as CoreError, draft::Draft, store::OntologyStore};
use uuid::Uuid;

use crate::{Error, Result};

/// The frame every overlaid read is computed in: one canonical version plus
/// at most one draft based on it. Resolved fresh per request; never cached.
#[derive(Debug, Clone)]
pub struct View {
  pub version_id: Uuid,
  pub draft:      Option<Draft>,
}

impl View {
  /// Resolve a request's view. With a draft id, the draft's base version is
  /// the canonical frame; otherwise the current version. A missing draft or
  /// a store with no ingested version is a hard error — unlike validation
  /// findings, these are infrastructure-level failures.
  pub async fn resolve<S: OntologyStore>(
    store: &S,
    draft_id: Option<Uuid>,
  ) -> Result<View> {
    match draft_id {
      Some(id) => {
        let draft = store
          .get_draft(id)
          .await
          .map_err(Error::store)?
          .ok_or(CoreError::DraftNotFound(id))?;
        Ok(View {
          version_id: draft.base_version_id,
          draft:      Some(draft),
        })
      }
      None => {
        let version = store
          .current_version()
          .await
          .map_err(Error::store)?
          .ok_or(CoreError::NoCurrentVersion)?;
        Ok(View {
          version_id: version.version_id,
          draft:      None,
        })
      }
    }
  }

  pub fn draft_id(&self) -> Option<Uuid> {
    self.draft.as_ref().map(|d| d.draft_id)
  }
}
