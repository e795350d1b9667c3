//! Validation read models — structured findings, never exceptions.
//!
//! Validation problems are always returned as data. Errors block a clean
//! submission; warnings (breaking changes) are surfaced but never block.

use serde::{Deserialize, Serialize};

use crate::entity::{EntityKey, EntityType};

// ─── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Error,
  Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
  /// A drafted body no longer decodes into its entity type's shape.
  InvalidShape,
  /// A referenced entity does not resolve in the effective view.
  UnresolvedReference,
  /// The effective parent graph admits no total order.
  InheritanceCycle,
  /// A property's datatype changed.
  DatatypeChanged,
  /// A property's cardinality narrowed (many → single).
  CardinalityNarrowed,
  /// An entity still referenced elsewhere was deleted.
  ReferencedEntityRemoved,
  /// A member, property, or parent was removed from its container.
  MemberRemoved,
}

/// One validation finding, anchored to the entity (and optionally the field)
/// it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationMessage {
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub field_path:  Option<String>,
  pub severity:    Severity,
  pub code:        ValidationCode,
  pub message:     String,
}

// ─── Semver suggestions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
  Patch,
  Minor,
  Major,
}

/// A proposed version bump for a module or bundle, aggregated from the
/// classified changes beneath it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemverSuggestion {
  pub entity_type:       EntityType,
  pub entity_key:        EntityKey,
  pub bump:              BumpLevel,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_version:   Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub suggested_version: Option<String>,
  pub reasons:           Vec<String>,
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// The full output of validating a draft. Pure function of the effective
/// view; safe to recompute on every edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
  pub messages:    Vec<ValidationMessage>,
  pub semver:      Vec<SemverSuggestion>,
  /// True when no `error`-severity message is present. Warnings never block.
  pub submittable: bool,
}

impl ValidationReport {
  pub fn new(
    messages: Vec<ValidationMessage>,
    semver: Vec<SemverSuggestion>,
  ) -> Self {
    let submittable = messages
      .iter()
      .all(|m| m.severity != Severity::Error);
    Self {
      messages,
      semver,
      submittable,
    }
  }
}
