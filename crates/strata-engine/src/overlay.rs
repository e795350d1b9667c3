//! The overlay engine: canonical body + draft change → effective body.
//!
//! Callers never merge canonical and draft data themselves; every read in a
//! draft context flows through [`effective`] or [`list_effective`].

use std::collections::BTreeMap;

use strata_core::{
  draft::{ChangeOp, ChangeStatus, DraftChange, EffectiveEntity},
  entity::{Entity, EntityKey, EntityType},
  store::OntologyStore,
};

use crate::{Error, Result, View};

// ─── Single entity ───────────────────────────────────────────────────────────

/// The effective view of one entity, or `None` when it exists neither
/// canonically nor as a draft create.
pub async fn effective<S: OntologyStore>(
  store: &S,
  view: &View,
  entity_type: EntityType,
  entity_key: &EntityKey,
) -> Result<Option<EffectiveEntity>> {
  let canonical = store
    .get_entity(view.version_id, entity_type, entity_key)
    .await
    .map_err(Error::store)?;

  let change = match &view.draft {
    Some(draft) => store
      .get_change(draft.draft_id, entity_type, entity_key)
      .await
      .map_err(Error::store)?,
    None => None,
  };

  Ok(overlay_entity(
    entity_type,
    entity_key,
    canonical.as_ref(),
    change.as_ref(),
  ))
}

// ─── Lists ───────────────────────────────────────────────────────────────────

/// Effective entities of one type: canonical rows overlaid individually,
/// draft creates for keys with no canonical counterpart injected inline, and
/// the whole set re-sorted by key. Deleted entities are included with their
/// marker, never filtered.
pub async fn list_effective<S: OntologyStore>(
  store: &S,
  view: &View,
  entity_type: EntityType,
) -> Result<Vec<EffectiveEntity>> {
  let canonical = store
    .list_entities(view.version_id, entity_type)
    .await
    .map_err(Error::store)?;

  let mut changes = changes_for_type(store, view, entity_type).await?;

  let mut out = Vec::with_capacity(canonical.len() + changes.len());
  for entity in &canonical {
    let change = changes.remove(&entity.entity_key);
    if let Some(eff) =
      overlay_entity(entity_type, &entity.entity_key, Some(entity), change.as_ref())
    {
      out.push(eff);
    }
  }

  // Whatever is left has no canonical counterpart: creates join the result
  // set inline; orphaned updates/deletes have nothing to show.
  for (key, change) in changes {
    if let Some(eff) = overlay_entity(entity_type, &key, None, Some(&change)) {
      out.push(eff);
    }
  }

  out.sort_by(|a, b| a.entity_key.cmp(&b.entity_key));
  Ok(out)
}

/// The draft's live changes for one entity type, keyed by entity key.
pub(crate) async fn changes_for_type<S: OntologyStore>(
  store: &S,
  view: &View,
  entity_type: EntityType,
) -> Result<BTreeMap<EntityKey, DraftChange>> {
  let Some(draft) = &view.draft else {
    return Ok(BTreeMap::new());
  };

  let changes = store
    .list_changes(draft.draft_id)
    .await
    .map_err(Error::store)?;

  Ok(
    changes
      .into_iter()
      .filter(|c| c.entity_type == entity_type)
      .map(|c| (c.entity_key.clone(), c))
      .collect(),
  )
}

// ─── Overlay core ────────────────────────────────────────────────────────────

/// Overlay one canonical entity (or none) with one draft change (or none).
///
/// The canonical body is never mutated: `update` deep-copies it before
/// applying the stored patch. A patch that no longer applies is a
/// recoverable condition — the canonical body is returned as `unchanged`
/// with the failure annotated, never raised to the caller.
pub(crate) fn overlay_entity(
  entity_type: EntityType,
  entity_key: &EntityKey,
  canonical: Option<&Entity>,
  change: Option<&DraftChange>,
) -> Option<EffectiveEntity> {
  match change.map(|c| &c.op) {
    None => canonical.map(|entity| EffectiveEntity {
      entity_type,
      entity_key:  entity_key.clone(),
      label:       entity.label.clone(),
      body:        entity.body.clone(),
      status:      ChangeStatus::Unchanged,
      patch_error: None,
    }),

    Some(ChangeOp::Create { body }) => Some(EffectiveEntity {
      entity_type,
      entity_key:  entity_key.clone(),
      label:       label_of(body, ""),
      body:        body.clone(),
      status:      ChangeStatus::Added,
      patch_error: None,
    }),

    Some(ChangeOp::Delete) => canonical.map(|entity| EffectiveEntity {
      entity_type,
      entity_key:  entity_key.clone(),
      label:       entity.label.clone(),
      body:        entity.body.clone(),
      status:      ChangeStatus::Deleted,
      patch_error: None,
    }),

    Some(ChangeOp::Update { patch }) => {
      let entity = canonical?;
      let mut patched = entity.body.clone();
      match json_patch::patch(&mut patched, patch) {
        Ok(()) => Some(EffectiveEntity {
          entity_type,
          entity_key:  entity_key.clone(),
          label:       label_of(&patched, &entity.label),
          body:        patched,
          status:      ChangeStatus::Modified,
          patch_error: None,
        }),
        Err(e) => Some(EffectiveEntity {
          entity_type,
          entity_key:  entity_key.clone(),
          label:       entity.label.clone(),
          body:        entity.body.clone(),
          status:      ChangeStatus::Unchanged,
          patch_error: Some(e.to_string()),
        }),
      }
    }
  }
}

/// Pull the label out of a raw body, falling back when absent.
fn label_of(body: &serde_json::Value, fallback: &str) -> String {
  body
    .get("label")
    .and_then(|v| v.as_str())
    .unwrap_or(fallback)
    .to_string()
}
