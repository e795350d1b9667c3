//! The `OntologyStore` trait and supporting row types.
//!
//! The trait is implemented by storage backends (e.g. `strata-store-sqlite`).
//! Higher layers (`strata-engine`, `strata-api`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  draft::{ChangeOp, Draft, DraftChange, DraftStatus},
  entity::{EffectiveProperty, Entity, EntityKey, EntityRef, EntityType},
  graph::TraversalStep,
  version::{NewVersion, OntologyVersion, VersionSnapshot},
};

// ─── Edge row types ──────────────────────────────────────────────────────────

/// A `category → parent` edge of one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentEdge {
  pub category_key: EntityKey,
  pub parent_key:   EntityKey,
}

/// A `category → property` edge of one version.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEdge {
  pub category_key: EntityKey,
  pub property_key: EntityKey,
  pub required:     bool,
  pub origin:       Option<String>,
}

/// One `entity → module` membership, as returned by the batched lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMembership {
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  pub module_key:  EntityKey,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Strata ontology store backend.
///
/// Canonical data is written only by [`install_version`] — one transaction
/// per ingested snapshot — and is immutable afterwards. Drafts and their
/// changes are the only mutable state.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
///
/// [`install_version`]: OntologyStore::install_version
pub trait OntologyStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Versions ──────────────────────────────────────────────────────────

  /// Install a fully-populated snapshot as the new current version.
  ///
  /// In one transaction: inserts the version row and entity rows, derives
  /// the normalized relationship tables from the payloads, rebuilds the
  /// materialized inheritance view, flips the current-version pointer, and
  /// deletes the superseded version's canonical rows.
  fn install_version(
    &self,
    new: NewVersion,
    snapshot: VersionSnapshot,
  ) -> impl Future<Output = Result<OntologyVersion, Self::Error>> + Send + '_;

  /// Record a version whose ingest failed, without touching canonical data.
  fn record_failed_version(
    &self,
    new: NewVersion,
    error: String,
  ) -> impl Future<Output = Result<OntologyVersion, Self::Error>> + Send + '_;

  /// The current version, or `None` before the first successful install.
  fn current_version(
    &self,
  ) -> impl Future<Output = Result<Option<OntologyVersion>, Self::Error>> + Send + '_;

  fn get_version(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<OntologyVersion>, Self::Error>> + Send + '_;

  // ── Canonical reads ───────────────────────────────────────────────────

  fn get_entity<'a>(
    &'a self,
    version_id: Uuid,
    entity_type: EntityType,
    entity_key: &'a EntityKey,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + 'a;

  /// Batched fetch; missing keys are simply absent from the result.
  fn get_entities<'a>(
    &'a self,
    version_id: Uuid,
    entity_type: EntityType,
    entity_keys: &'a [EntityKey],
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// All entities of a type, ordered by key.
  fn list_entities(
    &self,
    version_id: Uuid,
    entity_type: EntityType,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Every parent edge of the version. The draft-aware graph walk patches
  /// this list in memory instead of re-querying per node.
  fn parent_edges(
    &self,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ParentEdge>, Self::Error>> + Send + '_;

  /// Direct property edges of one category.
  fn property_edges<'a>(
    &'a self,
    version_id: Uuid,
    category_key: &'a EntityKey,
  ) -> impl Future<Output = Result<Vec<PropertyEdge>, Self::Error>> + Send + 'a;

  /// Direct members of a module, every entity type included.
  fn module_members<'a>(
    &'a self,
    version_id: Uuid,
    module_key: &'a EntityKey,
  ) -> impl Future<Output = Result<Vec<EntityRef>, Self::Error>> + Send + 'a;

  fn bundle_modules<'a>(
    &'a self,
    version_id: Uuid,
    bundle_key: &'a EntityKey,
  ) -> impl Future<Output = Result<Vec<EntityKey>, Self::Error>> + Send + 'a;

  /// Module memberships for N entities in a single batched query — graph
  /// decoration must never issue N individual lookups.
  fn module_memberships<'a>(
    &'a self,
    version_id: Uuid,
    entity_keys: &'a [EntityKey],
  ) -> impl Future<Output = Result<Vec<ModuleMembership>, Self::Error>> + Send + 'a;

  /// Materialized inheritance rows for one category (direct + inherited,
  /// nearest source, shortest depth).
  fn effective_properties<'a>(
    &'a self,
    version_id: Uuid,
    category_key: &'a EntityKey,
  ) -> impl Future<Output = Result<Vec<EffectiveProperty>, Self::Error>> + Send + 'a;

  // ── Recursive queries ─────────────────────────────────────────────────

  /// Bounded-depth bidirectional walk over the parent relation, path-tracked:
  /// a step revisiting a node on its own path is returned flagged `cycle`
  /// and never expanded, so traversal terminates on cyclic data.
  fn traverse_neighborhood<'a>(
    &'a self,
    version_id: Uuid,
    start_key: &'a EntityKey,
    depth: u32,
  ) -> impl Future<Output = Result<Vec<TraversalStep>, Self::Error>> + Send + 'a;

  /// Transitive parent closure of a set of categories (the roots themselves
  /// excluded), deduplicated.
  fn ancestor_categories<'a>(
    &'a self,
    version_id: Uuid,
    roots: &'a [EntityKey],
  ) -> impl Future<Output = Result<Vec<EntityKey>, Self::Error>> + Send + 'a;

  // ── Drafts ────────────────────────────────────────────────────────────

  fn create_draft(
    &self,
    base_version_id: Uuid,
  ) -> impl Future<Output = Result<Draft, Self::Error>> + Send + '_;

  fn get_draft(
    &self,
    draft_id: Uuid,
  ) -> impl Future<Output = Result<Option<Draft>, Self::Error>> + Send + '_;

  fn list_drafts(
    &self,
  ) -> impl Future<Output = Result<Vec<Draft>, Self::Error>> + Send + '_;

  fn set_draft_status(
    &self,
    draft_id: Uuid,
    status: DraftStatus,
  ) -> impl Future<Output = Result<Draft, Self::Error>> + Send + '_;

  /// Record the outcome of a rebase: set the base pointer (which only
  /// advances on a clean rebase), the version the draft was reconciled
  /// against, and the stale flag. Stored changes are untouched.
  fn mark_draft_rebased(
    &self,
    draft_id: Uuid,
    base_version_id: Uuid,
    rebased_against: Uuid,
    stale: bool,
  ) -> impl Future<Output = Result<Draft, Self::Error>> + Send + '_;

  // ── Draft changes ─────────────────────────────────────────────────────

  /// Upsert the live change for a key. Replacing an existing row assigns a
  /// fresh per-draft monotonic `seq`, so `(draft_id, max seq)` changes on
  /// every write. Precondition checks live in the editing layer, not here.
  fn put_change<'a>(
    &'a self,
    draft_id: Uuid,
    entity_type: EntityType,
    entity_key: &'a EntityKey,
    op: ChangeOp,
  ) -> impl Future<Output = Result<DraftChange, Self::Error>> + Send + 'a;

  /// Remove the live change for a key. Returns `false` if none existed.
  fn remove_change<'a>(
    &'a self,
    draft_id: Uuid,
    entity_type: EntityType,
    entity_key: &'a EntityKey,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  fn get_change<'a>(
    &'a self,
    draft_id: Uuid,
    entity_type: EntityType,
    entity_key: &'a EntityKey,
  ) -> impl Future<Output = Result<Option<DraftChange>, Self::Error>> + Send + 'a;

  /// All live changes of a draft in `seq` order.
  fn list_changes(
    &self,
    draft_id: Uuid,
  ) -> impl Future<Output = Result<Vec<DraftChange>, Self::Error>> + Send + '_;
}
