//! Graph read models — computed per request, never stored.

use serde::{Deserialize, Serialize};

use crate::{
  draft::ChangeStatus,
  entity::{EntityKey, EntityType},
};

// ─── Decorated graphs ────────────────────────────────────────────────────────

/// The relation an edge was drawn from.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
  /// Category → parent category.
  Parent,
  /// Category or subobject → assigned property.
  Property,
}

/// A node of a neighborhood or module graph, decorated with every module it
/// belongs to and, under a draft, its overlay change-status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
  pub entity_key:    EntityKey,
  pub entity_type:   EntityType,
  pub label:         String,
  /// All modules this entity is a member of — entities in several modules
  /// carry every membership, they are never filtered to one.
  pub modules:       Vec<EntityKey>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub change_status: Option<ChangeStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
  pub from: EntityKey,
  pub to:   EntityKey,
  pub kind: EdgeKind,
}

/// Bounded-depth bidirectional neighborhood over the parent relation.
/// `has_cycles` is set when traversal pruned a step that would have revisited
/// a node on its own path; the returned nodes and edges are then partial but
/// complete up to the pruned steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborhoodGraph {
  pub nodes:      Vec<GraphNode>,
  pub edges:      Vec<GraphEdge>,
  pub has_cycles: bool,
}

/// All direct members of a module, of every entity type, plus the edges
/// among them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleGraph {
  pub nodes: Vec<GraphNode>,
  pub edges: Vec<GraphEdge>,
}

// ─── Store traversal rows ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraversalDirection {
  /// Towards ancestors (child → parent).
  Up,
  /// Towards descendants (parent → child).
  Down,
}

/// One step of the store's path-tracked recursive traversal. A step with
/// `cycle` set records an edge back onto the step's own path; it is returned
/// but never expanded further.
#[derive(Debug, Clone)]
pub struct TraversalStep {
  /// The node this step was reached from; `None` for the start node.
  pub from_key:  Option<EntityKey>,
  pub key:       EntityKey,
  pub depth:     u32,
  pub direction: TraversalDirection,
  pub cycle:     bool,
}
