//! The graph query service: neighborhood graphs, module-scoped graphs, and
//! transitive closures over canonical + overlay data.
//!
//! Without draft category edits, traversal runs on the store's path-tracked
//! recursive query. When the draft touches categories, the version's parent
//! edges are patched in memory and walked with the identical pruning rule,
//! so both paths terminate on cyclic data and report `has_cycles` instead of
//! hanging.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use strata_core::{
  Error as CoreError,
  draft::{ChangeOp, ChangeStatus, DraftChange},
  entity::{EntityKey, EntityPayload, EntityType},
  graph::{
    EdgeKind, GraphEdge, GraphNode, ModuleGraph, NeighborhoodGraph,
    TraversalDirection,
  },
  store::OntologyStore,
};

use crate::{Error, Result, View, overlay};

// ─── Neighborhood ────────────────────────────────────────────────────────────

/// Bounded-depth bidirectional neighborhood of an entity over the parent
/// relation. Non-category entities have no parent edges; their neighborhood
/// is the decorated node alone.
pub async fn neighborhood<S: OntologyStore>(
  store: &S,
  view: &View,
  entity_type: EntityType,
  entity_key: &EntityKey,
  depth: u32,
) -> Result<NeighborhoodGraph> {
  let start = overlay::effective(store, view, entity_type, entity_key)
    .await?
    .ok_or_else(|| CoreError::EntityNotFound {
      entity_type,
      entity_key: entity_key.clone(),
    })?;

  if entity_type != EntityType::Category {
    let nodes =
      decorate(store, view, entity_type, &[start.entity_key.clone()]).await?;
    return Ok(NeighborhoodGraph {
      nodes,
      edges: Vec::new(),
      has_cycles: false,
    });
  }

  let category_changes =
    overlay::changes_for_type(store, view, EntityType::Category).await?;

  let (keys, edges, has_cycles) = if category_changes.is_empty() {
    canonical_walk(store, view, entity_key, depth).await?
  } else {
    overlaid_walk(store, view, entity_key, depth, &category_changes).await?
  };

  let nodes = decorate(store, view, EntityType::Category, &keys).await?;
  Ok(NeighborhoodGraph {
    nodes,
    edges,
    has_cycles,
  })
}

/// Fast path: the store's recursive traversal over canonical edges.
async fn canonical_walk<S: OntologyStore>(
  store: &S,
  view: &View,
  start: &EntityKey,
  depth: u32,
) -> Result<(Vec<EntityKey>, Vec<GraphEdge>, bool)> {
  let steps = store
    .traverse_neighborhood(view.version_id, start, depth)
    .await
    .map_err(Error::store)?;

  let mut keys = BTreeSet::new();
  let mut edges = BTreeSet::new();
  let mut has_cycles = false;

  for step in steps {
    keys.insert(step.key.clone());
    if step.cycle {
      has_cycles = true;
    }
    if let Some(from) = step.from_key {
      // Up-steps run child → parent; down-steps parent → child. Edges are
      // always stored child → parent.
      let (child, parent) = match step.direction {
        TraversalDirection::Up => (from, step.key),
        TraversalDirection::Down => (step.key, from),
      };
      edges.insert((child, parent));
    }
  }

  Ok((
    keys.into_iter().collect(),
    edges
      .into_iter()
      .map(|(from, to)| GraphEdge {
        from,
        to,
        kind: EdgeKind::Parent,
      })
      .collect(),
    has_cycles,
  ))
}

/// Draft path: canonical parent edges patched with the draft's category
/// edits, walked in memory with the same path-tracked pruning.
async fn overlaid_walk<S: OntologyStore>(
  store: &S,
  view: &View,
  start: &EntityKey,
  depth: u32,
  changes: &BTreeMap<EntityKey, DraftChange>,
) -> Result<(Vec<EntityKey>, Vec<GraphEdge>, bool)> {
  let mut by_child: BTreeMap<EntityKey, Vec<EntityKey>> = BTreeMap::new();
  for edge in store
    .parent_edges(view.version_id)
    .await
    .map_err(Error::store)?
  {
    by_child
      .entry(edge.category_key)
      .or_default()
      .push(edge.parent_key);
  }

  // A created or updated category replaces its outgoing edges with the ones
  // its effective body declares. Deleted categories keep their canonical
  // edges: they are rendered with a deleted marker, not cut out.
  for (key, change) in changes {
    let body = match &change.op {
      ChangeOp::Create { body } => Some(body.clone()),
      ChangeOp::Update { .. } => {
        match overlay::effective(store, view, EntityType::Category, key).await? {
          Some(eff) => Some(eff.body),
          None => None,
        }
      }
      ChangeOp::Delete => None,
    };
    if let Some(body) = body {
      let parents = match EntityPayload::from_parts(EntityType::Category, body) {
        Ok(EntityPayload::Category(spec)) => spec.parents,
        _ => Vec::new(),
      };
      by_child.insert(key.clone(), parents);
    }
  }

  let mut by_parent: BTreeMap<EntityKey, Vec<EntityKey>> = BTreeMap::new();
  for (child, parents) in &by_child {
    for parent in parents {
      by_parent
        .entry(parent.clone())
        .or_default()
        .push(child.clone());
    }
  }

  let mut keys = BTreeSet::new();
  let mut edges = BTreeSet::new();
  let mut has_cycles = false;
  keys.insert(start.clone());

  for up in [true, false] {
    let adjacency = if up { &by_child } else { &by_parent };
    let mut queue: VecDeque<(EntityKey, u32, Vec<EntityKey>)> = VecDeque::new();
    queue.push_back((start.clone(), 0, vec![start.clone()]));

    while let Some((key, at, path)) = queue.pop_front() {
      if at >= depth {
        continue;
      }
      let Some(nexts) = adjacency.get(&key) else {
        continue;
      };
      for next in nexts {
        let (child, parent) = if up {
          (key.clone(), next.clone())
        } else {
          (next.clone(), key.clone())
        };
        edges.insert((child, parent));
        if path.contains(next) {
          has_cycles = true;
          continue;
        }
        keys.insert(next.clone());
        let mut next_path = path.clone();
        next_path.push(next.clone());
        queue.push_back((next.clone(), at + 1, next_path));
      }
    }
  }

  Ok((
    keys.into_iter().collect(),
    edges
      .into_iter()
      .map(|(from, to)| GraphEdge {
        from,
        to,
        kind: EdgeKind::Parent,
      })
      .collect(),
    has_cycles,
  ))
}

// ─── Module graph ────────────────────────────────────────────────────────────

/// All effective direct members of a module plus the parent and property
/// edges among them.
pub async fn module_graph<S: OntologyStore>(
  store: &S,
  view: &View,
  module_key: &EntityKey,
) -> Result<ModuleGraph> {
  let module = overlay::effective(store, view, EntityType::Module, module_key)
    .await?
    .ok_or_else(|| CoreError::EntityNotFound {
      entity_type: EntityType::Module,
      entity_key:  module_key.clone(),
    })?;

  let members = match module.payload() {
    Ok(EntityPayload::Module(spec)) => spec.members,
    _ => Vec::new(),
  };

  let member_keys: BTreeSet<&EntityKey> =
    members.iter().map(|m| &m.entity_key).collect();

  let mut nodes = Vec::new();
  let mut edges = BTreeSet::new();

  for member in &members {
    let Some(eff) =
      overlay::effective(store, view, member.entity_type, &member.entity_key)
        .await?
    else {
      // Dangling membership; the validation engine reports it.
      continue;
    };

    if let Ok(payload) = eff.payload() {
      match &payload {
        EntityPayload::Category(spec) => {
          for parent in &spec.parents {
            if member_keys.contains(parent) {
              edges.insert((
                eff.entity_key.clone(),
                parent.clone(),
                EdgeKind::Parent,
              ));
            }
          }
          for pr in &spec.properties {
            if member_keys.contains(&pr.property) {
              edges.insert((
                eff.entity_key.clone(),
                pr.property.clone(),
                EdgeKind::Property,
              ));
            }
          }
        }
        EntityPayload::Subobject(spec) => {
          for pr in &spec.properties {
            if member_keys.contains(&pr.property) {
              edges.insert((
                eff.entity_key.clone(),
                pr.property.clone(),
                EdgeKind::Property,
              ));
            }
          }
        }
        _ => {}
      }
    }

    nodes.push((member.entity_type, eff));
  }

  let all_keys: Vec<EntityKey> =
    nodes.iter().map(|(_, eff)| eff.entity_key.clone()).collect();
  let memberships = store
    .module_memberships(view.version_id, &all_keys)
    .await
    .map_err(Error::store)?;

  let decorated = nodes
    .into_iter()
    .map(|(entity_type, eff)| {
      let modules = memberships
        .iter()
        .filter(|m| m.entity_type == entity_type && m.entity_key == eff.entity_key)
        .map(|m| m.module_key.clone())
        .collect();
      GraphNode {
        entity_key: eff.entity_key,
        entity_type,
        label: eff.label,
        modules,
        change_status: view.draft.as_ref().map(|_| eff.status),
      }
    })
    .collect();

  Ok(ModuleGraph {
    nodes: decorated,
    edges: edges
      .into_iter()
      .map(|(from, to, kind)| GraphEdge { from, to, kind })
      .collect(),
  })
}

// ─── Closure ─────────────────────────────────────────────────────────────────

/// Transitive dependency set. Category closure is the category plus its
/// ancestors; module closure is its direct members plus the ancestors of its
/// direct categories; bundle closure is the union of its modules' closures.
///
/// Closures are computed over canonical edges — a draft-created module or
/// bundle has an empty closure by definition, since no canonical edges
/// reference it yet.
pub async fn closure<S: OntologyStore>(
  store: &S,
  view: &View,
  entity_type: EntityType,
  entity_key: &EntityKey,
) -> Result<BTreeSet<EntityKey>> {
  overlay::effective(store, view, entity_type, entity_key)
    .await?
    .ok_or_else(|| CoreError::EntityNotFound {
      entity_type,
      entity_key: entity_key.clone(),
    })?;

  match entity_type {
    EntityType::Category => {
      let mut set: BTreeSet<EntityKey> = store
        .ancestor_categories(view.version_id, &[entity_key.clone()])
        .await
        .map_err(Error::store)?
        .into_iter()
        .collect();
      set.insert(entity_key.clone());
      Ok(set)
    }
    EntityType::Module => module_closure(store, view, entity_key).await,
    EntityType::Bundle => {
      let modules = store
        .bundle_modules(view.version_id, entity_key)
        .await
        .map_err(Error::store)?;
      let mut set = BTreeSet::new();
      for module in &modules {
        set.extend(module_closure(store, view, module).await?);
      }
      Ok(set)
    }
    other => Err(Error::ClosureUnsupported(other)),
  }
}

async fn module_closure<S: OntologyStore>(
  store: &S,
  view: &View,
  module_key: &EntityKey,
) -> Result<BTreeSet<EntityKey>> {
  let members = store
    .module_members(view.version_id, module_key)
    .await
    .map_err(Error::store)?;

  let mut set: BTreeSet<EntityKey> =
    members.iter().map(|m| m.entity_key.clone()).collect();

  let category_roots: Vec<EntityKey> = members
    .iter()
    .filter(|m| m.entity_type == EntityType::Category)
    .map(|m| m.entity_key.clone())
    .collect();

  set.extend(
    store
      .ancestor_categories(view.version_id, &category_roots)
      .await
      .map_err(Error::store)?,
  );

  Ok(set)
}

// ─── Decoration ──────────────────────────────────────────────────────────────

/// Decorate a key set into graph nodes: labels and change-status from the
/// overlay, module memberships from a single batched lookup.
async fn decorate<S: OntologyStore>(
  store: &S,
  view: &View,
  entity_type: EntityType,
  keys: &[EntityKey],
) -> Result<Vec<GraphNode>> {
  let canonical = store
    .get_entities(view.version_id, entity_type, keys)
    .await
    .map_err(Error::store)?;
  let by_key: BTreeMap<&EntityKey, _> =
    canonical.iter().map(|e| (&e.entity_key, e)).collect();

  let changes = overlay::changes_for_type(store, view, entity_type).await?;

  let memberships = store
    .module_memberships(view.version_id, keys)
    .await
    .map_err(Error::store)?;

  let mut nodes = Vec::with_capacity(keys.len());
  for key in keys {
    let eff = overlay::overlay_entity(
      entity_type,
      key,
      by_key.get(key).copied(),
      changes.get(key),
    );

    let (label, status) = match eff {
      Some(eff) => (eff.label, Some(eff.status)),
      // A dangling edge target: no canonical row, no draft change. Keep the
      // node so the gap is visible; validation reports the broken reference.
      None => (key.as_str().to_string(), None),
    };

    nodes.push(GraphNode {
      entity_key: key.clone(),
      entity_type,
      label,
      modules: memberships
        .iter()
        .filter(|m| m.entity_type == entity_type && &m.entity_key == key)
        .map(|m| m.module_key.clone())
        .collect(),
      change_status: if view.draft.is_some() {
        status.or(Some(ChangeStatus::Unchanged))
      } else {
        None
      },
    });
  }

  Ok(nodes)
}
