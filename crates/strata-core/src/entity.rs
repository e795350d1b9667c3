//! Entity types — the six typed payloads of the ontology.
//!
//! An entity is immutable once ingested for a version; the only way to change
//! one is through a draft. The variant name of [`EntityPayload`] serves as the
//! `entity_type` discriminant stored in the database, with the inner payload
//! serialised into the `body_json` column.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

// ─── EntityKey ───────────────────────────────────────────────────────────────

/// Stable, path-derived identifier for an entity — unique within an
/// OntologyVersion and persistent across edits and refactors.
///
/// Keys may not be empty, contain whitespace or `|` (reserved as the path
/// separator in recursive traversal queries), or start/end with `/`.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityKey(String);

impl EntityKey {
  pub fn new(raw: impl Into<String>) -> Result<Self> {
    let raw = raw.into();
    let bad = raw.is_empty()
      || raw.starts_with('/')
      || raw.ends_with('/')
      || raw.chars().any(|c| c.is_whitespace() || c == '|');
    if bad {
      return Err(Error::InvalidEntityKey(raw));
    }
    Ok(Self(raw))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for EntityKey {
  type Error = Error;

  fn try_from(raw: String) -> Result<Self> { Self::new(raw) }
}

impl From<EntityKey> for String {
  fn from(key: EntityKey) -> Self { key.0 }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── EntityType ──────────────────────────────────────────────────────────────

/// The closed set of entity types. Exhaustive matching over this enum is what
/// keeps the overlay, graph, and validation layers honest across all six.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
  Category,
  Property,
  Subobject,
  Module,
  Bundle,
  Template,
}

impl EntityType {
  pub const ALL: [EntityType; 6] = [
    EntityType::Category,
    EntityType::Property,
    EntityType::Subobject,
    EntityType::Module,
    EntityType::Bundle,
    EntityType::Template,
  ];

  /// The discriminant string stored in the `entity_type` column.
  /// Must match the `rename_all = "lowercase"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Category => "category",
      Self::Property => "property",
      Self::Subobject => "subobject",
      Self::Module => "module",
      Self::Bundle => "bundle",
      Self::Template => "template",
    }
  }

  pub fn from_discriminant(s: &str) -> Result<Self> {
    match s {
      "category" => Ok(Self::Category),
      "property" => Ok(Self::Property),
      "subobject" => Ok(Self::Subobject),
      "module" => Ok(Self::Module),
      "bundle" => Ok(Self::Bundle),
      "template" => Ok(Self::Template),
      other => Err(Error::UnknownEntityType(other.to_string())),
    }
  }
}

impl fmt::Display for EntityType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.discriminant())
  }
}

/// A typed reference to an entity, used for module membership where members
/// span all six types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
}

// ─── Property value shape ────────────────────────────────────────────────────

/// The datatype of values a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Datatype {
  Text,
  Number,
  Boolean,
  Date,
  /// A reference to another page/entity.
  Page,
  Url,
}

impl fmt::Display for Datatype {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Text => "text",
      Self::Number => "number",
      Self::Boolean => "boolean",
      Self::Date => "date",
      Self::Page => "page",
      Self::Url => "url",
    })
  }
}

/// How many values a property may carry on a single entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
  Single,
  Many,
}

impl Cardinality {
  /// `many → single` narrows; everything else does not.
  pub fn narrows_to(&self, new: Cardinality) -> bool {
    matches!((self, new), (Cardinality::Many, Cardinality::Single))
  }
}

/// A property assignment on a category or subobject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyRequirement {
  pub property: EntityKey,
  #[serde(default)]
  pub required: bool,
  /// Provenance tag for the assignment (e.g. the template that declared it).
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub origin:   Option<String>,
}

// ─── Typed payloads ──────────────────────────────────────────────────────────

/// A class of pages; inherits properties through its parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpec {
  pub label:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub parents:     Vec<EntityKey>,
  #[serde(default)]
  pub properties:  Vec<PropertyRequirement>,
  #[serde(default)]
  pub subobjects:  Vec<EntityKey>,
}

/// A typed attribute assignable to categories and subobjects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySpec {
  pub label:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub datatype:    Datatype,
  pub cardinality: Cardinality,
}

/// A repeatable record embedded in pages of a category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubobjectSpec {
  pub label:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default)]
  pub properties:  Vec<PropertyRequirement>,
}

/// A named grouping of entities of any type; the unit of semver suggestions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSpec {
  pub label:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version:     Option<String>,
  #[serde(default)]
  pub members:     Vec<EntityRef>,
}

/// A distributable collection of modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleSpec {
  pub label:       String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub version:     Option<String>,
  #[serde(default)]
  pub modules:     Vec<EntityKey>,
}

/// A rendering template, optionally bound to the category it renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
  pub label:  String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub target: Option<EntityKey>,
  pub source: String,
}

// ─── EntityPayload ───────────────────────────────────────────────────────────

/// The typed payload of an entity. The variant name serves as the
/// `entity_type` discriminant stored in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EntityPayload {
  Category(CategorySpec),
  Property(PropertySpec),
  Subobject(SubobjectSpec),
  Module(ModuleSpec),
  Bundle(BundleSpec),
  Template(TemplateSpec),
}

/// An outgoing reference from one entity payload to another entity, with the
/// JSON-pointer path of the referencing field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
  pub field_path:  String,
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
}

impl EntityPayload {
  pub fn entity_type(&self) -> EntityType {
    match self {
      Self::Category(_) => EntityType::Category,
      Self::Property(_) => EntityType::Property,
      Self::Subobject(_) => EntityType::Subobject,
      Self::Module(_) => EntityType::Module,
      Self::Bundle(_) => EntityType::Bundle,
      Self::Template(_) => EntityType::Template,
    }
  }

  pub fn label(&self) -> &str {
    match self {
      Self::Category(c) => &c.label,
      Self::Property(p) => &p.label,
      Self::Subobject(s) => &s.label,
      Self::Module(m) => &m.label,
      Self::Bundle(b) => &b.label,
      Self::Template(t) => &t.label,
    }
  }

  /// Serialise the inner payload (without the type tag) for the `body_json`
  /// database column.
  pub fn to_json(&self) -> Result<serde_json::Value> {
    // The full serialised form is `{"type": "...", "data": <payload>}`.
    // We want only the payload.
    let full = serde_json::to_value(self)?;
    Ok(full.get("data").cloned().unwrap_or(serde_json::Value::Null))
  }

  /// Deserialise from the entity type and the JSON payload stored in the
  /// database. This is also the post-patch shape check: a body that no longer
  /// decodes for its type is rejected here.
  pub fn from_parts(
    entity_type: EntityType,
    data: serde_json::Value,
  ) -> Result<Self> {
    let wrapped = serde_json::json!({
      "type": entity_type.discriminant(),
      "data": data,
    });
    Ok(serde_json::from_value(wrapped)?)
  }

  /// Every outgoing reference this payload makes, with its field path.
  /// Validation resolves each of these against the effective view.
  pub fn references(&self) -> Vec<Reference> {
    let mut refs = Vec::new();
    let mut push = |path: String, entity_type: EntityType, key: &EntityKey| {
      refs.push(Reference {
        field_path: path,
        entity_type,
        entity_key: key.clone(),
      });
    };

    match self {
      Self::Category(c) => {
        for (i, parent) in c.parents.iter().enumerate() {
          push(format!("/parents/{i}"), EntityType::Category, parent);
        }
        for (i, pr) in c.properties.iter().enumerate() {
          push(
            format!("/properties/{i}/property"),
            EntityType::Property,
            &pr.property,
          );
        }
        for (i, sub) in c.subobjects.iter().enumerate() {
          push(format!("/subobjects/{i}"), EntityType::Subobject, sub);
        }
      }
      Self::Property(_) => {}
      Self::Subobject(s) => {
        for (i, pr) in s.properties.iter().enumerate() {
          push(
            format!("/properties/{i}/property"),
            EntityType::Property,
            &pr.property,
          );
        }
      }
      Self::Module(m) => {
        for (i, member) in m.members.iter().enumerate() {
          push(
            format!("/members/{i}"),
            member.entity_type,
            &member.entity_key,
          );
        }
      }
      Self::Bundle(b) => {
        for (i, module) in b.modules.iter().enumerate() {
          push(format!("/modules/{i}"), EntityType::Module, module);
        }
      }
      Self::Template(t) => {
        if let Some(target) = &t.target {
          push("/target".to_string(), EntityType::Category, target);
        }
      }
    }

    refs
  }
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// A canonical entity row: one typed entity in one ingested version.
/// Immutable once ingested; the only way to change one is through a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
  pub version_id:  Uuid,
  pub entity_type: EntityType,
  pub entity_key:  EntityKey,
  pub label:       String,
  /// The raw body as stored; [`Entity::payload`] decodes it.
  pub body:        serde_json::Value,
}

impl Entity {
  /// Decode the raw body into the typed payload for this entity's type.
  pub fn payload(&self) -> Result<EntityPayload> {
    EntityPayload::from_parts(self.entity_type, self.body.clone())
  }
}

// ─── Materialized inheritance row ────────────────────────────────────────────

/// One row of the materialized inheritance view: a property effective on a
/// category, with provenance. `depth` 0 is a direct assignment; greater
/// depths are inherited, collapsed to the shortest inheritance distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveProperty {
  pub property_key:        EntityKey,
  pub required:            bool,
  pub source_category_key: EntityKey,
  pub depth:               u32,
}
