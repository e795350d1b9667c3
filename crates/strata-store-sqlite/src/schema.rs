//! SQL schema for the Strata SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS ontology_versions (
    version_id  TEXT PRIMARY KEY,
    source_ref  TEXT NOT NULL,
    commit_sha  TEXT NOT NULL,
    ingested_at TEXT NOT NULL,   -- ISO 8601 UTC; store-assigned
    status      TEXT NOT NULL,   -- 'pending' | 'complete' | 'failed'
    error       TEXT,
    is_current  INTEGER NOT NULL DEFAULT 0
);

-- At most one current version at a time.
CREATE UNIQUE INDEX IF NOT EXISTS versions_current_idx
    ON ontology_versions(is_current) WHERE is_current = 1;

-- Canonical entity rows. Written only by install_version; never updated.
CREATE TABLE IF NOT EXISTS entities (
    version_id  TEXT NOT NULL REFERENCES ontology_versions(version_id),
    entity_type TEXT NOT NULL,   -- discriminant of EntityPayload variant
    entity_key  TEXT NOT NULL,
    label       TEXT NOT NULL,
    body_json   TEXT NOT NULL,   -- JSON payload (inner data only)
    PRIMARY KEY (version_id, entity_type, entity_key)
);

-- Normalized relationship tables, derived from entity payloads inside the
-- install_version transaction. Every edge endpoint shares version_id with
-- its source row; a cross-version edge cannot be expressed.
CREATE TABLE IF NOT EXISTS category_parents (
    version_id   TEXT NOT NULL,
    category_key TEXT NOT NULL,
    parent_key   TEXT NOT NULL,
    PRIMARY KEY (version_id, category_key, parent_key)
);

CREATE TABLE IF NOT EXISTS category_properties (
    version_id   TEXT NOT NULL,
    category_key TEXT NOT NULL,
    property_key TEXT NOT NULL,
    required     INTEGER NOT NULL DEFAULT 0,
    origin       TEXT,
    PRIMARY KEY (version_id, category_key, property_key)
);

CREATE TABLE IF NOT EXISTS module_members (
    version_id  TEXT NOT NULL,
    module_key  TEXT NOT NULL,
    member_type TEXT NOT NULL,
    member_key  TEXT NOT NULL,
    PRIMARY KEY (version_id, module_key, member_type, member_key)
);

CREATE TABLE IF NOT EXISTS bundle_modules (
    version_id TEXT NOT NULL,
    bundle_key TEXT NOT NULL,
    module_key TEXT NOT NULL,
    PRIMARY KEY (version_id, bundle_key, module_key)
);

-- Materialized inheritance view: one row per (category, property) reachable
-- through the parent graph. depth is the shortest inheritance distance and
-- source_category_key the nearest declaring ancestor. Rebuilt fully inside
-- install_version; never written by drafts.
CREATE TABLE IF NOT EXISTS category_property_effective (
    version_id          TEXT NOT NULL,
    category_key        TEXT NOT NULL,
    property_key        TEXT NOT NULL,
    required            INTEGER NOT NULL DEFAULT 0,
    source_category_key TEXT NOT NULL,
    depth               INTEGER NOT NULL,
    PRIMARY KEY (version_id, category_key, property_key)
);

CREATE TABLE IF NOT EXISTS drafts (
    draft_id        TEXT PRIMARY KEY,
    base_version_id TEXT NOT NULL REFERENCES ontology_versions(version_id),
    status          TEXT NOT NULL DEFAULT 'active',
    stale           INTEGER NOT NULL DEFAULT 0,
    rebased_against TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

-- At most one live change per (draft, type, key). Superseding a change
-- replaces the row and assigns a fresh per-draft seq.
CREATE TABLE IF NOT EXISTS draft_changes (
    draft_id    TEXT NOT NULL REFERENCES drafts(draft_id),
    entity_type TEXT NOT NULL,
    entity_key  TEXT NOT NULL,
    op          TEXT NOT NULL,   -- 'create' | 'update' | 'delete'
    body_json   TEXT,            -- full replacement body for 'create'
    patch_json  TEXT,            -- RFC 6902 operation list for 'update'
    seq         INTEGER NOT NULL,
    recorded_at TEXT NOT NULL,
    PRIMARY KEY (draft_id, entity_type, entity_key)
);

CREATE INDEX IF NOT EXISTS entities_type_idx      ON entities(version_id, entity_type);
CREATE INDEX IF NOT EXISTS parents_child_idx      ON category_parents(version_id, category_key);
CREATE INDEX IF NOT EXISTS parents_parent_idx     ON category_parents(version_id, parent_key);
CREATE INDEX IF NOT EXISTS module_members_key_idx ON module_members(version_id, member_key);
CREATE INDEX IF NOT EXISTS effective_cat_idx      ON category_property_effective(version_id, category_key);
CREATE INDEX IF NOT EXISTS draft_changes_seq_idx  ON draft_changes(draft_id, seq);

PRAGMA user_version = 1;
";
