//! The rebase engine: reconciling a draft when canonical advances.
//!
//! Stored changes are never rewritten here. Either every change re-applies
//! against the new version and the draft's base pointer advances, or the
//! draft is marked stale with its changes preserved verbatim for manual
//! resolution.

use strata_core::{
  Error as CoreError,
  draft::{ChangeOp, RebaseConflict, RebaseOutcome},
  store::OntologyStore,
};
use uuid::Uuid;

use crate::{Error, Result};

/// Reconcile `draft_id` against `new_version_id`.
///
/// Only `active` and `validated` drafts are eligible; anything else is left
/// untouched and reported as not rebased.
pub async fn rebase_draft<S: OntologyStore>(
  store: &S,
  draft_id: Uuid,
  new_version_id: Uuid,
) -> Result<RebaseOutcome> {
  let draft = store
    .get_draft(draft_id)
    .await
    .map_err(Error::store)?
    .ok_or(CoreError::DraftNotFound(draft_id))?;

  if store
    .get_version(new_version_id)
    .await
    .map_err(Error::store)?
    .is_none()
  {
    return Err(CoreError::VersionNotFound(new_version_id).into());
  }

  if !draft.status.is_rebase_eligible() {
    return Ok(RebaseOutcome {
      rebased:   false,
      conflicts: Vec::new(),
    });
  }

  let changes = store
    .list_changes(draft_id)
    .await
    .map_err(Error::store)?;

  let mut conflicts = Vec::new();
  for change in &changes {
    let canonical = store
      .get_entity(new_version_id, change.entity_type, &change.entity_key)
      .await
      .map_err(Error::store)?;

    let reason = match (&change.op, &canonical) {
      (ChangeOp::Create { .. }, Some(_)) => {
        Some("entity now exists canonically".to_string())
      }
      (ChangeOp::Create { .. }, None) => None,

      (ChangeOp::Delete, None) => {
        Some("entity no longer exists canonically".to_string())
      }
      (ChangeOp::Delete, Some(_)) => None,

      (ChangeOp::Update { .. }, None) => {
        Some("entity no longer exists canonically".to_string())
      }
      (ChangeOp::Update { patch }, Some(entity)) => {
        // Re-apply on a scratch copy. The stored patch is never mutated —
        // only the draft's base pointer may advance.
        let mut scratch = entity.body.clone();
        json_patch::patch(&mut scratch, patch)
          .err()
          .map(|e| format!("stored patch no longer applies: {e}"))
      }
    };

    if let Some(reason) = reason {
      conflicts.push(RebaseConflict {
        entity_type: change.entity_type,
        entity_key:  change.entity_key.clone(),
        reason,
      });
    }
  }

  if conflicts.is_empty() {
    store
      .mark_draft_rebased(draft_id, new_version_id, new_version_id, false)
      .await
      .map_err(Error::store)?;
    tracing::info!(
      draft_id = %draft_id,
      version_id = %new_version_id,
      changes = changes.len(),
      "draft rebased cleanly"
    );
    Ok(RebaseOutcome {
      rebased: true,
      conflicts,
    })
  } else {
    // Base pointer stays put; the draft is flagged stale and its changes
    // remain exactly as proposed.
    store
      .mark_draft_rebased(draft_id, draft.base_version_id, new_version_id, true)
      .await
      .map_err(Error::store)?;
    tracing::warn!(
      draft_id = %draft_id,
      version_id = %new_version_id,
      conflicts = conflicts.len(),
      "draft marked stale after rebase conflicts"
    );
    Ok(RebaseOutcome {
      rebased: false,
      conflicts,
    })
  }
}
