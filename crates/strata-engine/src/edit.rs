//! Draft editing: precondition checks and change upserts.
//!
//! Canonical data is immutable; these are the only write paths a draft has.
//! The store upsert itself is unconditional — every invariant lives here.

use strata_core::{
  Error as CoreError,
  draft::{ChangeOp, Draft, DraftChange, DraftStatus, NewDraftChange},
  entity::{EntityKey, EntityType},
  store::OntologyStore,
};
use uuid::Uuid;

use crate::{Error, Result};

/// Apply one proposed mutation to a draft.
///
/// Preconditions, per op:
/// - `create`: the key must not exist canonically.
/// - `update`: the key must exist canonically, or be a prior `create` in the
///   same draft — the patch is then folded into the pending create body and
///   the row stays a `create`.
/// - `delete`: the key must exist canonically; `delete` over a prior
///   `create` removes the row entirely and returns `None` (no tombstone).
pub async fn apply_change<S: OntologyStore>(
  store: &S,
  draft_id: Uuid,
  change: NewDraftChange,
) -> Result<Option<DraftChange>> {
  let draft = editable_draft(store, draft_id).await?;

  let canonical = store
    .get_entity(draft.base_version_id, change.entity_type, &change.entity_key)
    .await
    .map_err(Error::store)?;
  let existing = store
    .get_change(draft_id, change.entity_type, &change.entity_key)
    .await
    .map_err(Error::store)?;
  let pending_create = match existing.as_ref().map(|c| &c.op) {
    Some(ChangeOp::Create { body }) => Some(body),
    _ => None,
  };

  let op = match change.op {
    ChangeOp::Create { body } => {
      if canonical.is_some() {
        return Err(
          CoreError::CreateTargetExists {
            entity_type: change.entity_type,
            entity_key:  change.entity_key,
          }
          .into(),
        );
      }
      ChangeOp::Create { body }
    }

    ChangeOp::Update { patch } => {
      if let Some(body) = pending_create {
        let mut patched = body.clone();
        json_patch::patch(&mut patched, &patch)
          .map_err(|e| Error::PatchRejected(e.to_string()))?;
        ChangeOp::Create { body: patched }
      } else if canonical.is_some() {
        // Stored verbatim; whether it still applies is judged at read time.
        ChangeOp::Update { patch }
      } else {
        return Err(
          CoreError::MissingCanonicalTarget {
            entity_type: change.entity_type,
            entity_key:  change.entity_key,
            op:          "update",
          }
          .into(),
        );
      }
    }

    ChangeOp::Delete => {
      if pending_create.is_some() {
        // Create-then-delete collapses to no change at all.
        store
          .remove_change(draft_id, change.entity_type, &change.entity_key)
          .await
          .map_err(Error::store)?;
        return Ok(None);
      }
      if canonical.is_none() {
        return Err(
          CoreError::MissingCanonicalTarget {
            entity_type: change.entity_type,
            entity_key:  change.entity_key,
            op:          "delete",
          }
          .into(),
        );
      }
      ChangeOp::Delete
    }
  };

  store
    .put_change(draft_id, change.entity_type, &change.entity_key, op)
    .await
    .map(Some)
    .map_err(Error::store)
}

/// Withdraw the pending change for a key — the undo behind `deleted` and
/// `modified` markers. Returns `false` when there was nothing to withdraw.
pub async fn withdraw_change<S: OntologyStore>(
  store: &S,
  draft_id: Uuid,
  entity_type: EntityType,
  entity_key: &EntityKey,
) -> Result<bool> {
  editable_draft(store, draft_id).await?;
  store
    .remove_change(draft_id, entity_type, entity_key)
    .await
    .map_err(Error::store)
}

/// Move a draft through its lifecycle. Merged and abandoned are terminal;
/// everything else may step forward, and validated may fall back to active
/// when edits resume.
pub async fn transition_draft<S: OntologyStore>(
  store: &S,
  draft_id: Uuid,
  to: DraftStatus,
) -> Result<Draft> {
  let draft = store
    .get_draft(draft_id)
    .await
    .map_err(Error::store)?
    .ok_or(CoreError::DraftNotFound(draft_id))?;

  let allowed = matches!(
    (draft.status, to),
    (DraftStatus::Active, DraftStatus::Validated)
      | (DraftStatus::Active, DraftStatus::Submitted)
      | (DraftStatus::Active, DraftStatus::Abandoned)
      | (DraftStatus::Validated, DraftStatus::Active)
      | (DraftStatus::Validated, DraftStatus::Submitted)
      | (DraftStatus::Validated, DraftStatus::Abandoned)
      | (DraftStatus::Submitted, DraftStatus::Merged)
      | (DraftStatus::Submitted, DraftStatus::Abandoned)
      | (DraftStatus::Submitted, DraftStatus::Active)
  );
  if !allowed {
    return Err(Error::InvalidTransition {
      draft_id,
      from: draft.status,
      to,
    });
  }

  store
    .set_draft_status(draft_id, to)
    .await
    .map_err(Error::store)
}

async fn editable_draft<S: OntologyStore>(
  store: &S,
  draft_id: Uuid,
) -> Result<Draft> {
  let draft = store
    .get_draft(draft_id)
    .await
    .map_err(Error::store)?
    .ok_or(CoreError::DraftNotFound(draft_id))?;

  if !draft.status.is_editable() {
    return Err(
      CoreError::DraftNotEditable {
        draft_id,
        status: draft.status,
      }
      .into(),
    );
  }

  Ok(draft)
}
