//! Effective inherited properties of a category, draft-aware.
//!
//! The materialized view is built from canonical data only. While a draft
//! touches any category, parent and property edges may differ from what the
//! view recorded, so the chain is recomputed here in application logic —
//! bounded, path-tracked, from the queried category upward.

use std::collections::{BTreeMap, VecDeque};

use strata_core::{
  entity::{EffectiveProperty, EntityKey, EntityPayload, EntityType},
  store::OntologyStore,
};

use crate::{Error, Result, View, overlay};

/// Hard bound on the live recomputation walk. Canonical data is cycle-free
/// after validation, but a draft mid-edit may not be.
pub const MAX_INHERITANCE_DEPTH: u32 = 32;

/// Direct + inherited properties of a category with provenance, under the
/// view's draft if any.
///
/// Without draft category changes this is a read of the materialized rows.
/// Otherwise the effective parent chain is walked breadth-first: effective
/// payloads for drafted categories, canonical bodies elsewhere. The nearest
/// source wins; ties at equal depth resolve to the smaller source key, the
/// same rule the materialized rebuild uses.
pub async fn effective_properties<S: OntologyStore>(
  store: &S,
  view: &View,
  category_key: &EntityKey,
) -> Result<Vec<EffectiveProperty>> {
  let draft_touches_categories = match &view.draft {
    Some(draft) => store
      .list_changes(draft.draft_id)
      .await
      .map_err(Error::store)?
      .iter()
      .any(|c| c.entity_type == EntityType::Category),
    None => false,
  };

  if !draft_touches_categories {
    return store
      .effective_properties(view.version_id, category_key)
      .await
      .map_err(Error::store);
  }

  live_effective_properties(store, view, category_key).await
}

async fn live_effective_properties<S: OntologyStore>(
  store: &S,
  view: &View,
  root: &EntityKey,
) -> Result<Vec<EffectiveProperty>> {
  let mut best: BTreeMap<EntityKey, EffectiveProperty> = BTreeMap::new();
  let mut queue: VecDeque<(EntityKey, u32, Vec<EntityKey>)> = VecDeque::new();
  queue.push_back((root.clone(), 0, vec![root.clone()]));

  while let Some((key, depth, path)) = queue.pop_front() {
    let Some(eff) =
      overlay::effective(store, view, EntityType::Category, &key).await?
    else {
      continue;
    };
    // A category deleted in the draft contributes nothing to the chain.
    if eff.is_deleted() {
      continue;
    }
    // Misshapen drafted bodies are a validation finding, not a read failure.
    let Ok(EntityPayload::Category(spec)) = eff.payload() else {
      continue;
    };

    for pr in &spec.properties {
      let better = match best.get(&pr.property) {
        Some(existing) => {
          depth < existing.depth
            || (depth == existing.depth && key < existing.source_category_key)
        }
        None => true,
      };
      if better {
        best.insert(
          pr.property.clone(),
          EffectiveProperty {
            property_key:        pr.property.clone(),
            required:            pr.required,
            source_category_key: key.clone(),
            depth,
          },
        );
      }
    }

    if depth >= MAX_INHERITANCE_DEPTH {
      continue;
    }
    for parent in &spec.parents {
      // Path-tracked pruning: never revisit a node on this walk's own path.
      if path.contains(parent) {
        continue;
      }
      let mut next_path = path.clone();
      next_path.push(parent.clone());
      queue.push_back((parent.clone(), depth + 1, next_path));
    }
  }

  let mut out: Vec<EffectiveProperty> = best.into_values().collect();
  out.sort_by(|a, b| {
    a.depth
      .cmp(&b.depth)
      .then_with(|| a.property_key.cmp(&b.property_key))
  });
  Ok(out)
}
