//! [`SqliteStore`] — the SQLite implementation of [`OntologyStore`].

use std::{collections::BTreeSet, path::Path};

use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use strata_core::{
  draft::{ChangeOp, Draft, DraftChange, DraftStatus},
  entity::{
    EffectiveProperty, Entity, EntityKey, EntityPayload, EntityRef, EntityType,
  },
  graph::{TraversalDirection, TraversalStep},
  store::{ModuleMembership, OntologyStore, ParentEdge, PropertyEdge},
  version::{IngestStatus, NewVersion, OntologyVersion, VersionSnapshot},
};

use crate::{
  Error, Result,
  encode::{
    RawDraft, RawDraftChange, RawEffectiveProperty, RawEntity,
    RawTraversalStep, RawVersion, decode_entity_type, decode_key,
    encode_change_op, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Traversal SQL ───────────────────────────────────────────────────────────

// Path-tracked recursive walks over category_parents. The path is a
// '|'-delimited key string (EntityKey forbids '|'); a step whose target
// already occurs on its own path is emitted with cycle = 1 and never
// expanded, which guarantees termination on cyclic data.

const WALK_UP_SQL: &str = "
WITH RECURSIVE walk_up(from_key, key, depth, path, cycle) AS (
  SELECT NULL, ?2, 0, '|' || ?2 || '|', 0
  UNION ALL
  SELECT w.key, p.parent_key, w.depth + 1,
         w.path || p.parent_key || '|',
         CASE WHEN instr(w.path, '|' || p.parent_key || '|') > 0
              THEN 1 ELSE 0 END
    FROM walk_up w
    JOIN category_parents p
      ON p.version_id = ?1 AND p.category_key = w.key
   WHERE w.depth < ?3 AND w.cycle = 0
)
SELECT from_key, key, depth, cycle FROM walk_up
";

const WALK_DOWN_SQL: &str = "
WITH RECURSIVE walk_down(from_key, key, depth, path, cycle) AS (
  SELECT NULL, ?2, 0, '|' || ?2 || '|', 0
  UNION ALL
  SELECT w.key, p.category_key, w.depth + 1,
         w.path || p.category_key || '|',
         CASE WHEN instr(w.path, '|' || p.category_key || '|') > 0
              THEN 1 ELSE 0 END
    FROM walk_down w
    JOIN category_parents p
      ON p.version_id = ?1 AND p.parent_key = w.key
   WHERE w.depth < ?3 AND w.cycle = 0
)
SELECT from_key, key, depth, cycle FROM walk_down WHERE depth > 0
";

const ANCESTORS_SQL: &str = "
WITH RECURSIVE anc(key, path) AS (
  SELECT ?2, '|' || ?2 || '|'
  UNION ALL
  SELECT p.parent_key, a.path || p.parent_key || '|'
    FROM anc a
    JOIN category_parents p
      ON p.version_id = ?1 AND p.category_key = a.key
   WHERE instr(a.path, '|' || p.parent_key || '|') = 0
)
SELECT DISTINCT key FROM anc WHERE key <> ?2
";

// Full rebuild of the materialized inheritance view for one version.
// Diamonds collapse to the nearest source; ties at equal depth resolve to
// the lexicographically smallest source key.
const REBUILD_EFFECTIVE_SQL: &str = "
INSERT INTO category_property_effective
  (version_id, category_key, property_key, required, source_category_key, depth)
WITH RECURSIVE ancestry(category_key, ancestor_key, depth, path) AS (
  SELECT entity_key, entity_key, 0, '|' || entity_key || '|'
    FROM entities
   WHERE version_id = ?1 AND entity_type = 'category'
  UNION ALL
  SELECT a.category_key, p.parent_key, a.depth + 1,
         a.path || p.parent_key || '|'
    FROM ancestry a
    JOIN category_parents p
      ON p.version_id = ?1 AND p.category_key = a.ancestor_key
   WHERE instr(a.path, '|' || p.parent_key || '|') = 0
),
ranked AS (
  SELECT a.category_key, cp.property_key, cp.required,
         a.ancestor_key AS source_category_key, a.depth,
         ROW_NUMBER() OVER (
           PARTITION BY a.category_key, cp.property_key
           ORDER BY a.depth, a.ancestor_key
         ) AS rn
    FROM ancestry a
    JOIN category_properties cp
      ON cp.version_id = ?1 AND cp.category_key = a.ancestor_key
)
SELECT ?1, category_key, property_key, required, source_category_key, depth
  FROM ranked
 WHERE rn = 1
";

// ─── Row derivation ──────────────────────────────────────────────────────────

/// Pre-encoded rows for one snapshot entity, built outside the connection
/// closure.
struct EntityRows {
  entities:   Vec<(&'static str, String, String, String)>,
  parents:    Vec<(String, String)>,
  properties: Vec<(String, String, bool, Option<String>)>,
  members:    Vec<(String, &'static str, String)>,
  bundles:    Vec<(String, String)>,
}

fn derive_rows(snapshot: &VersionSnapshot) -> Result<EntityRows> {
  let mut rows = EntityRows {
    entities:   Vec::with_capacity(snapshot.entities.len()),
    parents:    Vec::new(),
    properties: Vec::new(),
    members:    Vec::new(),
    bundles:    Vec::new(),
  };

  for new in &snapshot.entities {
    let key = new.entity_key.as_str().to_owned();
    rows.entities.push((
      new.payload.entity_type().discriminant(),
      key.clone(),
      new.payload.label().to_owned(),
      new.payload.to_json().map_err(Error::Core)?.to_string(),
    ));

    match &new.payload {
      EntityPayload::Category(c) => {
        for parent in &c.parents {
          rows.parents.push((key.clone(), parent.as_str().to_owned()));
        }
        for pr in &c.properties {
          rows.properties.push((
            key.clone(),
            pr.property.as_str().to_owned(),
            pr.required,
            pr.origin.clone(),
          ));
        }
      }
      EntityPayload::Module(m) => {
        for member in &m.members {
          rows.members.push((
            key.clone(),
            member.entity_type.discriminant(),
            member.entity_key.as_str().to_owned(),
          ));
        }
      }
      EntityPayload::Bundle(b) => {
        for module in &b.modules {
          rows.bundles.push((key.clone(), module.as_str().to_owned()));
        }
      }
      EntityPayload::Property(_)
      | EntityPayload::Subobject(_)
      | EntityPayload::Template(_) => {}
    }
  }

  Ok(rows)
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Strata ontology store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-row version query with the given parameters.
  async fn version_row(
    &self,
    sql: &'static str,
    params: Vec<String>,
  ) -> Result<Option<OntologyVersion>> {
    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(sql, rusqlite::params_from_iter(params), |row| {
              Ok(RawVersion {
                version_id:  row.get(0)?,
                source_ref:  row.get(1)?,
                commit_sha:  row.get(2)?,
                ingested_at: row.get(3)?,
                status:      row.get(4)?,
                error:       row.get(5)?,
              })
            })
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }

  /// Fetch a draft inside an already-open connection.
  fn draft_row(
    conn: &rusqlite::Connection,
    id_str: &str,
  ) -> rusqlite::Result<Option<RawDraft>> {
    conn
      .query_row(
        "SELECT draft_id, base_version_id, status, stale, rebased_against,
                created_at, updated_at
           FROM drafts WHERE draft_id = ?1",
        rusqlite::params![id_str],
        |row| {
          Ok(RawDraft {
            draft_id:        row.get(0)?,
            base_version_id: row.get(1)?,
            status:          row.get(2)?,
            stale:           row.get(3)?,
            rebased_against: row.get(4)?,
            created_at:      row.get(5)?,
            updated_at:      row.get(6)?,
          })
        },
      )
      .optional()
  }
}

// ─── OntologyStore impl ──────────────────────────────────────────────────────

impl OntologyStore for SqliteStore {
  type Error = Error;

  // ── Versions ──────────────────────────────────────────────────────────────

  async fn install_version(
    &self,
    new: NewVersion,
    snapshot: VersionSnapshot,
  ) -> Result<OntologyVersion> {
    let version = OntologyVersion {
      version_id:  Uuid::new_v4(),
      source_ref:  new.source_ref,
      commit_sha:  new.commit_sha,
      ingested_at: Utc::now(),
      status:      IngestStatus::Complete,
      error:       None,
    };

    let rows = derive_rows(&snapshot)?;
    let id_str = encode_uuid(version.version_id);
    let source_ref = version.source_ref.clone();
    let commit_sha = version.commit_sha.clone();
    let at_str = encode_dt(version.ingested_at);
    let entity_count = rows.entities.len();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        tx.execute(
          "UPDATE ontology_versions SET is_current = 0 WHERE is_current = 1",
          [],
        )?;
        tx.execute(
          "INSERT INTO ontology_versions
             (version_id, source_ref, commit_sha, ingested_at, status, error, is_current)
           VALUES (?1, ?2, ?3, ?4, 'complete', NULL, 1)",
          rusqlite::params![id_str, source_ref, commit_sha, at_str],
        )?;

        {
          let mut stmt = tx.prepare(
            "INSERT INTO entities (version_id, entity_type, entity_key, label, body_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for (entity_type, key, label, body) in &rows.entities {
            stmt.execute(rusqlite::params![id_str, entity_type, key, label, body])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO category_parents (version_id, category_key, parent_key)
             VALUES (?1, ?2, ?3)",
          )?;
          for (category, parent) in &rows.parents {
            stmt.execute(rusqlite::params![id_str, category, parent])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO category_properties
               (version_id, category_key, property_key, required, origin)
             VALUES (?1, ?2, ?3, ?4, ?5)",
          )?;
          for (category, property, required, origin) in &rows.properties {
            stmt.execute(rusqlite::params![id_str, category, property, required, origin])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO module_members
               (version_id, module_key, member_type, member_key)
             VALUES (?1, ?2, ?3, ?4)",
          )?;
          for (module, member_type, member_key) in &rows.members {
            stmt.execute(rusqlite::params![id_str, module, member_type, member_key])?;
          }

          let mut stmt = tx.prepare(
            "INSERT INTO bundle_modules (version_id, bundle_key, module_key)
             VALUES (?1, ?2, ?3)",
          )?;
          for (bundle, module) in &rows.bundles {
            stmt.execute(rusqlite::params![id_str, bundle, module])?;
          }
        }

        tx.execute(REBUILD_EFFECTIVE_SQL, rusqlite::params![id_str])?;

        // Superseded versions are not retained; the source repository is the
        // archive. A version still referenced by any draft keeps its rows so
        // un-rebased drafts stay readable.
        let orphaned: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT version_id FROM ontology_versions
              WHERE is_current = 0
                AND version_id NOT IN (SELECT base_version_id FROM drafts)",
          )?;
          let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          ids
        };
        for old_id in &orphaned {
          for table in [
            "category_property_effective",
            "category_parents",
            "category_properties",
            "module_members",
            "bundle_modules",
            "entities",
          ] {
            tx.execute(
              &format!("DELETE FROM {table} WHERE version_id = ?1"),
              rusqlite::params![old_id],
            )?;
          }
          tx.execute(
            "DELETE FROM ontology_versions WHERE version_id = ?1",
            rusqlite::params![old_id],
          )?;
        }

        tx.commit()?;
        Ok(())
      })
      .await?;

    tracing::info!(
      version_id = %version.version_id,
      commit = %version.commit_sha,
      entities = entity_count,
      "installed ontology version"
    );

    Ok(version)
  }

  async fn record_failed_version(
    &self,
    new: NewVersion,
    error: String,
  ) -> Result<OntologyVersion> {
    let version = OntologyVersion {
      version_id:  Uuid::new_v4(),
      source_ref:  new.source_ref,
      commit_sha:  new.commit_sha,
      ingested_at: Utc::now(),
      status:      IngestStatus::Failed,
      error:       Some(error),
    };

    let id_str = encode_uuid(version.version_id);
    let source_ref = version.source_ref.clone();
    let commit_sha = version.commit_sha.clone();
    let at_str = encode_dt(version.ingested_at);
    let error_str = version.error.clone();

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO ontology_versions
             (version_id, source_ref, commit_sha, ingested_at, status, error, is_current)
           VALUES (?1, ?2, ?3, ?4, 'failed', ?5, 0)",
          rusqlite::params![id_str, source_ref, commit_sha, at_str, error_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(version)
  }

  async fn current_version(&self) -> Result<Option<OntologyVersion>> {
    self
      .version_row(
        "SELECT version_id, source_ref, commit_sha, ingested_at, status, error
           FROM ontology_versions WHERE is_current = 1",
        Vec::new(),
      )
      .await
  }

  async fn get_version(&self, version_id: Uuid) -> Result<Option<OntologyVersion>> {
    self
      .version_row(
        "SELECT version_id, source_ref, commit_sha, ingested_at, status, error
           FROM ontology_versions WHERE version_id = ?1",
        vec![encode_uuid(version_id)],
      )
      .await
  }

  // ── Canonical reads ───────────────────────────────────────────────────────

  async fn get_entity(
    &self,
    version_id: Uuid,
    entity_type: EntityType,
    entity_key: &EntityKey,
  ) -> Result<Option<Entity>> {
    let version_str = encode_uuid(version_id);
    let type_str = entity_type.discriminant();
    let key_str = entity_key.as_str().to_owned();

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT version_id, entity_type, entity_key, label, body_json
                 FROM entities
                WHERE version_id = ?1 AND entity_type = ?2 AND entity_key = ?3",
              rusqlite::params![version_str, type_str, key_str],
              |row| {
                Ok(RawEntity {
                  version_id:  row.get(0)?,
                  entity_type: row.get(1)?,
                  entity_key:  row.get(2)?,
                  label:       row.get(3)?,
                  body_json:   row.get(4)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn get_entities(
    &self,
    version_id: Uuid,
    entity_type: EntityType,
    entity_keys: &[EntityKey],
  ) -> Result<Vec<Entity>> {
    if entity_keys.is_empty() {
      return Ok(Vec::new());
    }

    let mut params: Vec<String> = vec![
      encode_uuid(version_id),
      entity_type.discriminant().to_owned(),
    ];
    params.extend(entity_keys.iter().map(|k| k.as_str().to_owned()));
    let placeholders = vec!["?"; entity_keys.len()].join(", ");

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT version_id, entity_type, entity_key, label, body_json
             FROM entities
            WHERE version_id = ? AND entity_type = ? AND entity_key IN ({placeholders})
            ORDER BY entity_key"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            Ok(RawEntity {
              version_id:  row.get(0)?,
              entity_type: row.get(1)?,
              entity_key:  row.get(2)?,
              label:       row.get(3)?,
              body_json:   row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn list_entities(
    &self,
    version_id: Uuid,
    entity_type: EntityType,
  ) -> Result<Vec<Entity>> {
    let version_str = encode_uuid(version_id);
    let type_str = entity_type.discriminant();

    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT version_id, entity_type, entity_key, label, body_json
             FROM entities
            WHERE version_id = ?1 AND entity_type = ?2
            ORDER BY entity_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str, type_str], |row| {
            Ok(RawEntity {
              version_id:  row.get(0)?,
              entity_type: row.get(1)?,
              entity_key:  row.get(2)?,
              label:       row.get(3)?,
              body_json:   row.get(4)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn parent_edges(&self, version_id: Uuid) -> Result<Vec<ParentEdge>> {
    let version_str = encode_uuid(version_id);

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT category_key, parent_key FROM category_parents
            WHERE version_id = ?1 ORDER BY category_key, parent_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(category, parent)| {
        Ok(ParentEdge {
          category_key: decode_key(&category)?,
          parent_key:   decode_key(&parent)?,
        })
      })
      .collect()
  }

  async fn property_edges(
    &self,
    version_id: Uuid,
    category_key: &EntityKey,
  ) -> Result<Vec<PropertyEdge>> {
    let version_str = encode_uuid(version_id);
    let key_str = category_key.as_str().to_owned();

    let rows: Vec<(String, String, bool, Option<String>)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT category_key, property_key, required, origin
             FROM category_properties
            WHERE version_id = ?1 AND category_key = ?2
            ORDER BY property_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str, key_str], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(category, property, required, origin)| {
        Ok(PropertyEdge {
          category_key: decode_key(&category)?,
          property_key: decode_key(&property)?,
          required,
          origin,
        })
      })
      .collect()
  }

  async fn module_members(
    &self,
    version_id: Uuid,
    module_key: &EntityKey,
  ) -> Result<Vec<EntityRef>> {
    let version_str = encode_uuid(version_id);
    let key_str = module_key.as_str().to_owned();

    let rows: Vec<(String, String)> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT member_type, member_key FROM module_members
            WHERE version_id = ?1 AND module_key = ?2
            ORDER BY member_type, member_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str, key_str], |row| {
            Ok((row.get(0)?, row.get(1)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(member_type, member_key)| {
        Ok(EntityRef {
          entity_type: decode_entity_type(&member_type)?,
          entity_key:  decode_key(&member_key)?,
        })
      })
      .collect()
  }

  async fn bundle_modules(
    &self,
    version_id: Uuid,
    bundle_key: &EntityKey,
  ) -> Result<Vec<EntityKey>> {
    let version_str = encode_uuid(version_id);
    let key_str = bundle_key.as_str().to_owned();

    let rows: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT module_key FROM bundle_modules
            WHERE version_id = ?1 AND bundle_key = ?2
            ORDER BY module_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str, key_str], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows.iter().map(|s| decode_key(s)).collect()
  }

  async fn module_memberships(
    &self,
    version_id: Uuid,
    entity_keys: &[EntityKey],
  ) -> Result<Vec<ModuleMembership>> {
    if entity_keys.is_empty() {
      return Ok(Vec::new());
    }

    let mut params: Vec<String> = vec![encode_uuid(version_id)];
    params.extend(entity_keys.iter().map(|k| k.as_str().to_owned()));
    let placeholders = vec!["?"; entity_keys.len()].join(", ");

    let rows: Vec<(String, String, String)> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT member_type, member_key, module_key FROM module_members
            WHERE version_id = ? AND member_key IN ({placeholders})
            ORDER BY member_key, module_key"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params), |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(member_type, member_key, module_key)| {
        Ok(ModuleMembership {
          entity_type: decode_entity_type(&member_type)?,
          entity_key:  decode_key(&member_key)?,
          module_key:  decode_key(&module_key)?,
        })
      })
      .collect()
  }

  async fn effective_properties(
    &self,
    version_id: Uuid,
    category_key: &EntityKey,
  ) -> Result<Vec<EffectiveProperty>> {
    let version_str = encode_uuid(version_id);
    let key_str = category_key.as_str().to_owned();

    let raws: Vec<RawEffectiveProperty> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT property_key, required, source_category_key, depth
             FROM category_property_effective
            WHERE version_id = ?1 AND category_key = ?2
            ORDER BY depth, property_key",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![version_str, key_str], |row| {
            Ok(RawEffectiveProperty {
              property_key:        row.get(0)?,
              required:            row.get(1)?,
              source_category_key: row.get(2)?,
              depth:               row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(RawEffectiveProperty::into_effective)
      .collect()
  }

  // ── Recursive queries ─────────────────────────────────────────────────────

  async fn traverse_neighborhood(
    &self,
    version_id: Uuid,
    start_key: &EntityKey,
    depth: u32,
  ) -> Result<Vec<TraversalStep>> {
    let version_str = encode_uuid(version_id);
    let key_str = start_key.as_str().to_owned();
    let depth_val = depth as i64;

    let (up, down): (Vec<RawTraversalStep>, Vec<RawTraversalStep>) = self
      .conn
      .call(move |conn| {
        let map_row = |row: &rusqlite::Row<'_>| {
          Ok(RawTraversalStep {
            from_key: row.get(0)?,
            key:      row.get(1)?,
            depth:    row.get(2)?,
            cycle:    row.get(3)?,
          })
        };

        let mut stmt = conn.prepare(WALK_UP_SQL)?;
        let up = stmt
          .query_map(
            rusqlite::params![version_str, key_str, depth_val],
            map_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(WALK_DOWN_SQL)?;
        let down = stmt
          .query_map(
            rusqlite::params![version_str, key_str, depth_val],
            map_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((up, down))
      })
      .await?;

    let mut steps = Vec::with_capacity(up.len() + down.len());
    for raw in up {
      steps.push(raw.into_step(TraversalDirection::Up)?);
    }
    for raw in down {
      steps.push(raw.into_step(TraversalDirection::Down)?);
    }
    Ok(steps)
  }

  async fn ancestor_categories(
    &self,
    version_id: Uuid,
    roots: &[EntityKey],
  ) -> Result<Vec<EntityKey>> {
    if roots.is_empty() {
      return Ok(Vec::new());
    }

    let version_str = encode_uuid(version_id);
    let root_strs: Vec<String> =
      roots.iter().map(|k| k.as_str().to_owned()).collect();

    let keys: BTreeSet<String> = self
      .conn
      .call(move |conn| {
        let mut ancestors = BTreeSet::new();
        let mut stmt = conn.prepare(ANCESTORS_SQL)?;
        for root in &root_strs {
          let rows = stmt
            .query_map(rusqlite::params![version_str, root], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
          ancestors.extend(rows);
        }
        Ok(ancestors)
      })
      .await?;

    keys.iter().map(|s| decode_key(s)).collect()
  }

  // ── Drafts ────────────────────────────────────────────────────────────────

  async fn create_draft(&self, base_version_id: Uuid) -> Result<Draft> {
    if self.get_version(base_version_id).await?.is_none() {
      return Err(Error::VersionNotFound(base_version_id));
    }

    let now = Utc::now();
    let draft = Draft {
      draft_id:        Uuid::new_v4(),
      base_version_id,
      status:          DraftStatus::Active,
      stale:           false,
      rebased_against: None,
      created_at:      now,
      updated_at:      now,
    };

    let id_str = encode_uuid(draft.draft_id);
    let base_str = encode_uuid(base_version_id);
    let at_str = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO drafts
             (draft_id, base_version_id, status, stale, rebased_against,
              created_at, updated_at)
           VALUES (?1, ?2, 'active', 0, NULL, ?3, ?3)",
          rusqlite::params![id_str, base_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(draft)
  }

  async fn get_draft(&self, draft_id: Uuid) -> Result<Option<Draft>> {
    let id_str = encode_uuid(draft_id);

    let raw: Option<RawDraft> = self
      .conn
      .call(move |conn| Ok(SqliteStore::draft_row(conn, &id_str)?))
      .await?;

    raw.map(RawDraft::into_draft).transpose()
  }

  async fn list_drafts(&self) -> Result<Vec<Draft>> {
    let raws: Vec<RawDraft> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT draft_id, base_version_id, status, stale, rebased_against,
                  created_at, updated_at
             FROM drafts ORDER BY created_at",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(RawDraft {
              draft_id:        row.get(0)?,
              base_version_id: row.get(1)?,
              status:          row.get(2)?,
              stale:           row.get(3)?,
              rebased_against: row.get(4)?,
              created_at:      row.get(5)?,
              updated_at:      row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDraft::into_draft).collect()
  }

  async fn set_draft_status(
    &self,
    draft_id: Uuid,
    status: DraftStatus,
  ) -> Result<Draft> {
    let id_str = encode_uuid(draft_id);
    let status_str = status.discriminant();
    let at_str = encode_dt(Utc::now());

    let raw: Option<RawDraft> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE drafts SET status = ?2, updated_at = ?3 WHERE draft_id = ?1",
          rusqlite::params![id_str, status_str, at_str],
        )?;
        Ok(SqliteStore::draft_row(conn, &id_str)?)
      })
      .await?;

    raw
      .map(RawDraft::into_draft)
      .transpose()?
      .ok_or(Error::DraftNotFound(draft_id))
  }

  async fn mark_draft_rebased(
    &self,
    draft_id: Uuid,
    base_version_id: Uuid,
    rebased_against: Uuid,
    stale: bool,
  ) -> Result<Draft> {
    let id_str = encode_uuid(draft_id);
    let base_str = encode_uuid(base_version_id);
    let against_str = encode_uuid(rebased_against);
    let at_str = encode_dt(Utc::now());

    let raw: Option<RawDraft> = self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE drafts
              SET base_version_id = ?2, rebased_against = ?3, stale = ?4,
                  updated_at = ?5
            WHERE draft_id = ?1",
          rusqlite::params![id_str, base_str, against_str, stale, at_str],
        )?;
        Ok(SqliteStore::draft_row(conn, &id_str)?)
      })
      .await?;

    raw
      .map(RawDraft::into_draft)
      .transpose()?
      .ok_or(Error::DraftNotFound(draft_id))
  }

  // ── Draft changes ─────────────────────────────────────────────────────────

  async fn put_change(
    &self,
    draft_id: Uuid,
    entity_type: EntityType,
    entity_key: &EntityKey,
    op: ChangeOp,
  ) -> Result<DraftChange> {
    let now = Utc::now();
    let (op_str, body_json, patch_json) = encode_change_op(&op)?;

    let id_str = encode_uuid(draft_id);
    let type_str = entity_type.discriminant();
    let key_str = entity_key.as_str().to_owned();
    let at_str = encode_dt(now);

    let seq: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let seq: i64 = tx.query_row(
          "SELECT COALESCE(MAX(seq), 0) + 1 FROM draft_changes WHERE draft_id = ?1",
          rusqlite::params![id_str],
          |row| row.get(0),
        )?;

        tx.execute(
          "INSERT INTO draft_changes
             (draft_id, entity_type, entity_key, op, body_json, patch_json,
              seq, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
           ON CONFLICT(draft_id, entity_type, entity_key) DO UPDATE SET
             op = excluded.op,
             body_json = excluded.body_json,
             patch_json = excluded.patch_json,
             seq = excluded.seq,
             recorded_at = excluded.recorded_at",
          rusqlite::params![
            id_str, type_str, key_str, op_str, body_json, patch_json, seq, at_str,
          ],
        )?;
        tx.execute(
          "UPDATE drafts SET updated_at = ?2 WHERE draft_id = ?1",
          rusqlite::params![id_str, at_str],
        )?;

        tx.commit()?;
        Ok(seq)
      })
      .await?;

    Ok(DraftChange {
      draft_id,
      entity_type,
      entity_key: entity_key.clone(),
      op,
      seq,
      recorded_at: now,
    })
  }

  async fn remove_change(
    &self,
    draft_id: Uuid,
    entity_type: EntityType,
    entity_key: &EntityKey,
  ) -> Result<bool> {
    let id_str = encode_uuid(draft_id);
    let type_str = entity_type.discriminant();
    let key_str = entity_key.as_str().to_owned();
    let at_str = encode_dt(Utc::now());

    let removed: usize = self
      .conn
      .call(move |conn| {
        let removed = conn.execute(
          "DELETE FROM draft_changes
            WHERE draft_id = ?1 AND entity_type = ?2 AND entity_key = ?3",
          rusqlite::params![id_str, type_str, key_str],
        )?;
        if removed > 0 {
          conn.execute(
            "UPDATE drafts SET updated_at = ?2 WHERE draft_id = ?1",
            rusqlite::params![id_str, at_str],
          )?;
        }
        Ok(removed)
      })
      .await?;

    Ok(removed > 0)
  }

  async fn get_change(
    &self,
    draft_id: Uuid,
    entity_type: EntityType,
    entity_key: &EntityKey,
  ) -> Result<Option<DraftChange>> {
    let id_str = encode_uuid(draft_id);
    let type_str = entity_type.discriminant();
    let key_str = entity_key.as_str().to_owned();

    let raw: Option<RawDraftChange> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT draft_id, entity_type, entity_key, op, body_json,
                      patch_json, seq, recorded_at
                 FROM draft_changes
                WHERE draft_id = ?1 AND entity_type = ?2 AND entity_key = ?3",
              rusqlite::params![id_str, type_str, key_str],
              |row| {
                Ok(RawDraftChange {
                  draft_id:    row.get(0)?,
                  entity_type: row.get(1)?,
                  entity_key:  row.get(2)?,
                  op:          row.get(3)?,
                  body_json:   row.get(4)?,
                  patch_json:  row.get(5)?,
                  seq:         row.get(6)?,
                  recorded_at: row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDraftChange::into_change).transpose()
  }

  async fn list_changes(&self, draft_id: Uuid) -> Result<Vec<DraftChange>> {
    let id_str = encode_uuid(draft_id);

    let raws: Vec<RawDraftChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT draft_id, entity_type, entity_key, op, body_json,
                  patch_json, seq, recorded_at
             FROM draft_changes
            WHERE draft_id = ?1
            ORDER BY seq",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], |row| {
            Ok(RawDraftChange {
              draft_id:    row.get(0)?,
              entity_type: row.get(1)?,
              entity_key:  row.get(2)?,
              op:          row.get(3)?,
              body_json:   row.get(4)?,
              patch_json:  row.get(5)?,
              seq:         row.get(6)?,
              recorded_at: row.get(7)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDraftChange::into_change).collect()
  }
}
