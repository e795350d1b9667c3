//! OntologyVersion — the identity of one ingested canonical snapshot.
//!
//! Exactly one version is current at a time. Superseded versions are not
//! retained; the source repository is the historical archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityKey, EntityPayload};

/// Outcome of the ingest run that produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
  Pending,
  Complete,
  Failed,
}

impl IngestStatus {
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Complete => "complete",
      Self::Failed => "failed",
    }
  }
}

/// The currently (or formerly) ingested canonical snapshot. Immutable once
/// created; referenced by every canonical entity row and by every draft as
/// its base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OntologyVersion {
  pub version_id:  Uuid,
  /// Source repository reference (e.g. branch or tag name).
  pub source_ref:  String,
  pub commit_sha:  String,
  pub ingested_at: DateTime<Utc>,
  pub status:      IngestStatus,
  pub error:       Option<String>,
}

// ─── Install input ───────────────────────────────────────────────────────────

/// Identity of a version about to be installed.
/// `version_id` and `ingested_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub source_ref: String,
  pub commit_sha: String,
}

/// One entity handed over by the ingest pipeline.
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub entity_key: EntityKey,
  pub payload:    EntityPayload,
}

/// The fully-populated content of one ontology version. The store derives
/// the normalized relationship tables and the materialized inheritance view
/// from the payloads, in the same transaction — which is what makes
/// cross-version edges structurally impossible.
#[derive(Debug, Clone, Default)]
pub struct VersionSnapshot {
  pub entities: Vec<NewEntity>,
}

impl VersionSnapshot {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, entity_key: EntityKey, payload: EntityPayload) {
    self.entities.push(NewEntity {
      entity_key,
      payload,
    });
  }
}
