//! Full effective-tree materialization for the PR builder.

use strata_core::{
  draft::{EffectiveTree, TreeSection},
  entity::EntityType,
  store::OntologyStore,
};
use uuid::Uuid;

use crate::{Result, View, overlay, validate};

/// Serialize every entity's effective body — all six types, deleted entities
/// included with their marker — plus the semver suggestions. With no draft,
/// this is the canonical tree with an empty suggestion list.
pub async fn effective_tree<S: OntologyStore>(
  store: &S,
  draft_id: Option<Uuid>,
) -> Result<EffectiveTree> {
  let view = View::resolve(store, draft_id).await?;

  let mut sections = Vec::with_capacity(EntityType::ALL.len());
  for entity_type in EntityType::ALL {
    sections.push(TreeSection {
      entity_type,
      entities: overlay::list_effective(store, &view, entity_type).await?,
    });
  }

  let semver = match view.draft_id() {
    Some(id) => validate::validate_draft(store, id).await?.semver,
    None => Vec::new(),
  };

  Ok(EffectiveTree {
    version_id: view.version_id,
    draft_id: view.draft_id(),
    sections,
    semver,
  })
}
