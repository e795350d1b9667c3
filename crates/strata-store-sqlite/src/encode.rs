//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Entity bodies and patches
//! are stored as compact JSON. UUIDs are stored as hyphenated lowercase
//! strings. Enum discriminants come from the core types themselves.

use chrono::{DateTime, Utc};
use strata_core::{
  draft::{ChangeOp, Draft, DraftChange, DraftStatus},
  entity::{EffectiveProperty, Entity, EntityKey, EntityType},
  graph::{TraversalDirection, TraversalStep},
  version::{IngestStatus, OntologyVersion},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Keys and discriminants ──────────────────────────────────────────────────

pub fn decode_key(s: &str) -> Result<EntityKey> {
  EntityKey::new(s).map_err(Error::Core)
}

pub fn decode_entity_type(s: &str) -> Result<EntityType> {
  EntityType::from_discriminant(s).map_err(Error::Core)
}

pub fn decode_ingest_status(s: &str) -> Result<IngestStatus> {
  match s {
    "pending" => Ok(IngestStatus::Pending),
    "complete" => Ok(IngestStatus::Complete),
    "failed" => Ok(IngestStatus::Failed),
    other => Err(Error::Decode(format!("unknown ingest status: {other:?}"))),
  }
}

pub fn decode_draft_status(s: &str) -> Result<DraftStatus> {
  DraftStatus::from_discriminant(s).map_err(Error::Core)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `ontology_versions` row.
pub struct RawVersion {
  pub version_id:  String,
  pub source_ref:  String,
  pub commit_sha:  String,
  pub ingested_at: String,
  pub status:      String,
  pub error:       Option<String>,
}

impl RawVersion {
  pub fn into_version(self) -> Result<OntologyVersion> {
    Ok(OntologyVersion {
      version_id:  decode_uuid(&self.version_id)?,
      source_ref:  self.source_ref,
      commit_sha:  self.commit_sha,
      ingested_at: decode_dt(&self.ingested_at)?,
      status:      decode_ingest_status(&self.status)?,
      error:       self.error,
    })
  }
}

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub version_id:  String,
  pub entity_type: String,
  pub entity_key:  String,
  pub label:       String,
  pub body_json:   String,
}

impl RawEntity {
  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      version_id:  decode_uuid(&self.version_id)?,
      entity_type: decode_entity_type(&self.entity_type)?,
      entity_key:  decode_key(&self.entity_key)?,
      label:       self.label,
      body:        serde_json::from_str(&self.body_json)?,
    })
  }
}

/// Raw strings read directly from a `drafts` row.
pub struct RawDraft {
  pub draft_id:        String,
  pub base_version_id: String,
  pub status:          String,
  pub stale:           bool,
  pub rebased_against: Option<String>,
  pub created_at:      String,
  pub updated_at:      String,
}

impl RawDraft {
  pub fn into_draft(self) -> Result<Draft> {
    Ok(Draft {
      draft_id:        decode_uuid(&self.draft_id)?,
      base_version_id: decode_uuid(&self.base_version_id)?,
      status:          decode_draft_status(&self.status)?,
      stale:           self.stale,
      rebased_against: self
        .rebased_against
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
    })
  }
}

/// Raw strings read directly from a `draft_changes` row.
pub struct RawDraftChange {
  pub draft_id:    String,
  pub entity_type: String,
  pub entity_key:  String,
  pub op:          String,
  pub body_json:   Option<String>,
  pub patch_json:  Option<String>,
  pub seq:         i64,
  pub recorded_at: String,
}

impl RawDraftChange {
  pub fn into_change(self) -> Result<DraftChange> {
    let op = match self.op.as_str() {
      "create" => {
        let body = self.body_json.ok_or_else(|| {
          Error::Decode("create change without body_json".into())
        })?;
        ChangeOp::Create {
          body: serde_json::from_str(&body)?,
        }
      }
      "update" => {
        let patch = self.patch_json.ok_or_else(|| {
          Error::Decode("update change without patch_json".into())
        })?;
        ChangeOp::Update {
          patch: serde_json::from_str(&patch)?,
        }
      }
      "delete" => ChangeOp::Delete,
      other => {
        return Err(Error::Decode(format!("unknown change op: {other:?}")));
      }
    };

    Ok(DraftChange {
      draft_id:    decode_uuid(&self.draft_id)?,
      entity_type: decode_entity_type(&self.entity_type)?,
      entity_key:  decode_key(&self.entity_key)?,
      op,
      seq:         self.seq,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

/// Encode a [`ChangeOp`] into its `(op, body_json, patch_json)` columns.
pub fn encode_change_op(
  op: &ChangeOp,
) -> Result<(&'static str, Option<String>, Option<String>)> {
  Ok(match op {
    ChangeOp::Create { body } => {
      ("create", Some(serde_json::to_string(body)?), None)
    }
    ChangeOp::Update { patch } => {
      ("update", None, Some(serde_json::to_string(patch)?))
    }
    ChangeOp::Delete => ("delete", None, None),
  })
}

/// Raw row from one of the recursive traversal queries.
pub struct RawTraversalStep {
  pub from_key: Option<String>,
  pub key:      String,
  pub depth:    i64,
  pub cycle:    bool,
}

impl RawTraversalStep {
  pub fn into_step(self, direction: TraversalDirection) -> Result<TraversalStep> {
    Ok(TraversalStep {
      from_key: self.from_key.as_deref().map(decode_key).transpose()?,
      key: decode_key(&self.key)?,
      depth: self.depth as u32,
      direction,
      cycle: self.cycle,
    })
  }
}

/// Raw row from `category_property_effective`.
pub struct RawEffectiveProperty {
  pub property_key:        String,
  pub required:            bool,
  pub source_category_key: String,
  pub depth:               i64,
}

impl RawEffectiveProperty {
  pub fn into_effective(self) -> Result<EffectiveProperty> {
    Ok(EffectiveProperty {
      property_key:        decode_key(&self.property_key)?,
      required:            self.required,
      source_category_key: decode_key(&self.source_category_key)?,
      depth:               self.depth as u32,
    })
  }
}
