//! Drafts and draft changes — the proposed-edit layer over canonical data.
//!
//! A draft binds to exactly one base OntologyVersion and holds at most one
//! live change per `(entity_type, entity_key)`. Canonical rows are never
//! touched by a draft; the effective view is computed per request by the
//! overlay engine.

use chrono::{DateTime, Utc};
use json_patch::Patch;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{
  Error, Result,
  entity::{EntityKey, EntityPayload, EntityType},
  validation::SemverSuggestion,
};

// ─── Draft ───────────────────────────────────────────────────────────────────

/// Lifecycle of a draft: `active → validated → submitted → merged`, with
/// `abandoned` reachable from any pre-merge status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
  Active,
  Validated,
  Submitted,
  Merged,
  Abandoned,
}

impl DraftStatus {
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Validated => "validated",
      Self::Submitted => "submitted",
      Self::Merged => "merged",
      Self::Abandoned => "abandoned",
    }
  }

  pub fn from_discriminant(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(Self::Active),
      "validated" => Ok(Self::Validated),
      "submitted" => Ok(Self::Submitted),
      "merged" => Ok(Self::Merged),
      "abandoned" => Ok(Self::Abandoned),
      other => Err(Error::UnknownDraftStatus(other.to_string())),
    }
  }

  /// Changes may be created, replaced, or withdrawn only while active.
  pub fn is_editable(&self) -> bool { matches!(self, Self::Active) }

  /// Active and validated drafts are reconciled when canonical advances;
  /// submitted, merged, and abandoned drafts are left untouched.
  pub fn is_rebase_eligible(&self) -> bool {
    matches!(self, Self::Active | Self::Validated)
  }
}

impl fmt::Display for DraftStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.discriminant())
  }
}

/// An in-progress set of proposed edits against one base version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
  pub draft_id:        Uuid,
  pub base_version_id: Uuid,
  pub status:          DraftStatus,
  /// Set when canonical advanced underneath the draft and reconciliation
  /// could not re-apply every change.
  pub stale:           bool,
  /// The version this draft was last reconciled against, if any.
  pub rebased_against: Option<Uuid>,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
}

// ─── DraftChange ─────────────────────────────────────────────────────────────

/// One proposed mutation. `create` carries a full replacement body, `update`
/// a JSON Patch (RFC 6902) applied against the canonical body, `delete` is a
/// tombstone. Stored verbatim and never rewritten except by being superseded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ChangeOp {
  Create { body: serde_json::Value },
  Update { patch: Patch },
  Delete,
}

impl ChangeOp {
  /// The discriminant string stored in the `op` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Create { .. } => "create",
      Self::Update { .. } => "update",
      Self::Delete => "delete",
    }
  }
}

/// A persisted draft change. At most one exists per `(draft_id, entity_type,
/// entity_key)`; superseding a change replaces the row and assigns a fresh,
/// per-draft monotonic `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DraftChange {
  pub draft_id:    Uuid,
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  #[serde(flatten)]
  pub op:          ChangeOp,
  pub seq:         i64,
  pub recorded_at: DateTime<Utc>,
}

/// Input to the draft mutation surface. `seq` and `recorded_at` are assigned
/// by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewDraftChange {
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  #[serde(flatten)]
  pub op:          ChangeOp,
}

// ─── Effective view ──────────────────────────────────────────────────────────

/// How an entity appears under a draft, relative to canonical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
  Added,
  Modified,
  Deleted,
  Unchanged,
}

/// One entity as seen through the effective view: the canonical body with
/// the draft's change overlaid, plus the change-status tag.
///
/// Deleted entities are returned with `status: deleted` and their canonical
/// body intact — callers must not drop them from result sets, so UIs can
/// render an undo affordance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveEntity {
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  pub label:       String,
  pub body:        serde_json::Value,
  pub status:      ChangeStatus,
  /// Present when a stored patch failed to apply (stale path, failed `test`).
  /// The body then falls back to canonical and `status` is `unchanged`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub patch_error: Option<String>,
}

impl EffectiveEntity {
  pub fn is_deleted(&self) -> bool {
    matches!(self.status, ChangeStatus::Deleted)
  }

  /// Decode the effective body into the typed payload.
  pub fn payload(&self) -> Result<EntityPayload> {
    EntityPayload::from_parts(self.entity_type, self.body.clone())
  }
}

// ─── Rebase ──────────────────────────────────────────────────────────────────

/// A change whose precondition no longer holds against the new canonical
/// version. The stored change is preserved verbatim for manual resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebaseConflict {
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  pub reason:      String,
}

/// Result of reconciling a draft against a newer canonical version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebaseOutcome {
  /// True when every change re-applied cleanly and the base pointer advanced.
  pub rebased:   bool,
  pub conflicts: Vec<RebaseConflict>,
}

// ─── Materialized tree ───────────────────────────────────────────────────────

/// All effective entities of one type, sorted by key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSection {
  pub entity_type: EntityType,
  pub entities:    Vec<EffectiveEntity>,
}

/// The fully-materialized effective view of a draft (or of canonical, when no
/// draft is given): every entity's effective body plus the semver
/// suggestions. This is what the PR builder serializes into file writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveTree {
  pub version_id: Uuid,
  pub draft_id:   Option<Uuid>,
  pub sections:   Vec<TreeSection>,
  pub semver:     Vec<SemverSuggestion>,
}
