//! Engine tests against the real SQLite backend (in-memory).

use strata_core::{
  draft::{ChangeOp, ChangeStatus, Draft, DraftChange, DraftStatus, NewDraftChange},
  entity::{
    BundleSpec, Cardinality, CategorySpec, Datatype, EntityKey, EntityPayload,
    EntityRef, EntityType, ModuleSpec, PropertyRequirement, PropertySpec,
  },
  store::OntologyStore,
  validation::{BumpLevel, Severity, ValidationCode},
  version::{NewVersion, OntologyVersion, VersionSnapshot},
};
use strata_store_sqlite::SqliteStore;

use crate::{View, edit, graph, inherit, materialize, overlay, rebase, validate};

// ─── Fixtures ────────────────────────────────────────────────────────────────

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn key(s: &str) -> EntityKey { EntityKey::new(s).expect("valid key") }

fn category(
  label: &str,
  parents: &[&str],
  properties: &[(&str, bool)],
) -> EntityPayload {
  EntityPayload::Category(CategorySpec {
    label:       label.into(),
    description: None,
    parents:     parents.iter().map(|p| key(p)).collect(),
    properties:  properties
      .iter()
      .map(|(p, required)| PropertyRequirement {
        property: key(p),
        required: *required,
        origin:   None,
      })
      .collect(),
    subobjects:  Vec::new(),
  })
}

fn property(label: &str, datatype: Datatype, cardinality: Cardinality) -> EntityPayload {
  EntityPayload::Property(PropertySpec {
    label: label.into(),
    description: None,
    datatype,
    cardinality,
  })
}

fn module(label: &str, version: &str, members: &[(EntityType, &str)]) -> EntityPayload {
  EntityPayload::Module(ModuleSpec {
    label:       label.into(),
    description: None,
    version:     Some(version.into()),
    members:     members
      .iter()
      .map(|(t, k)| EntityRef {
        entity_type: *t,
        entity_key:  key(k),
      })
      .collect(),
  })
}

fn bundle(label: &str, version: &str, modules: &[&str]) -> EntityPayload {
  EntityPayload::Bundle(BundleSpec {
    label:       label.into(),
    description: None,
    version:     Some(version.into()),
    modules:     modules.iter().map(|m| key(m)).collect(),
  })
}

async fn install(
  s: &SqliteStore,
  commit: &str,
  entries: &[(&str, EntityPayload)],
) -> OntologyVersion {
  let mut snapshot = VersionSnapshot::new();
  for (k, payload) in entries {
    snapshot.push(key(k), payload.clone());
  }
  s.install_version(
    NewVersion {
      source_ref: "main".into(),
      commit_sha: commit.into(),
    },
    snapshot,
  )
  .await
  .unwrap()
}

/// A small world with inheritance, a module and a bundle.
async fn base_ontology(s: &SqliteStore) -> OntologyVersion {
  install(
    s,
    "base",
    &[
      ("name", property("Name", Datatype::Text, Cardinality::Single)),
      ("age", property("Age", Datatype::Number, Cardinality::Single)),
      ("nickname", property("Nickname", Datatype::Text, Cardinality::Many)),
      ("person", category("Person", &[], &[("name", true)])),
      ("employee", category("Employee", &["person"], &[])),
      (
        "people",
        module(
          "People",
          "1.2.3",
          &[
            (EntityType::Category, "person"),
            (EntityType::Category, "employee"),
            (EntityType::Property, "name"),
          ],
        ),
      ),
      ("core", bundle("Core", "0.5.0", &["people"])),
    ],
  )
  .await
}

async fn draft_on_current(s: &SqliteStore) -> Draft {
  let current = s.current_version().await.unwrap().unwrap();
  s.create_draft(current.version_id).await.unwrap()
}

async fn view(s: &SqliteStore, draft: Option<&Draft>) -> View {
  View::resolve(s, draft.map(|d| d.draft_id)).await.unwrap()
}

fn update(patch: serde_json::Value) -> ChangeOp {
  ChangeOp::Update {
    patch: serde_json::from_value(patch).expect("valid patch"),
  }
}

fn create(payload: &EntityPayload) -> ChangeOp {
  ChangeOp::Create {
    body: payload.to_json().unwrap(),
  }
}

async fn apply(
  s: &SqliteStore,
  draft: &Draft,
  entity_type: EntityType,
  k: &str,
  op: ChangeOp,
) -> Option<DraftChange> {
  edit::apply_change(
    s,
    draft.draft_id,
    NewDraftChange {
      entity_type,
      entity_key: key(k),
      op,
    },
  )
  .await
  .unwrap()
}

// ─── Overlay ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn effective_without_draft_is_canonical_unchanged() {
  let s = store().await;
  base_ontology(&s).await;
  let v = view(&s, None).await;

  let eff = overlay::effective(&s, &v, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(eff.status, ChangeStatus::Unchanged);
  assert_eq!(eff.label, "Person");

  let missing = overlay::effective(&s, &v, EntityType::Category, &key("ghost"))
    .await
    .unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn effective_draft_without_change_is_unchanged() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;
  let v = view(&s, Some(&d)).await;

  let eff = overlay::effective(&s, &v, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(eff.status, ChangeStatus::Unchanged);
}

#[tokio::test]
async fn simple_override_scenario() {
  // Canonical Person has name (required); the draft patches in an optional
  // age. The effective view shows both, status modified.
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "add", "path": "/properties/-",
       "value": {"property": "age", "required": false}}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let eff = overlay::effective(&s, &v, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(eff.status, ChangeStatus::Modified);
  let EntityPayload::Category(spec) = eff.payload().unwrap() else {
    panic!("expected category payload");
  };
  let props: Vec<_> = spec.properties.iter().map(|p| p.property.as_str()).collect();
  assert_eq!(props, ["name", "age"]);
  assert!(spec.properties[0].required);
  assert!(!spec.properties[1].required);
}

#[tokio::test]
async fn overlay_never_mutates_canonical_and_is_idempotent() {
  let s = store().await;
  let version = base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  let before = s
    .get_entity(version.version_id, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "replace", "path": "/label", "value": "Human"}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let first = overlay::effective(&s, &v, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();
  let second = overlay::effective(&s, &v, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();

  // Deep-copy-then-apply twice over independently fetched canonical copies
  // yields byte-identical results.
  assert_eq!(
    serde_json::to_string(&first.body).unwrap(),
    serde_json::to_string(&second.body).unwrap(),
  );

  // The canonical row is untouched.
  let after = s
    .get_entity(version.version_id, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(before.body, after.body);
  assert_eq!(after.label, "Person");
}

#[tokio::test]
async fn failed_patch_falls_back_to_canonical_with_annotation() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "test", "path": "/label", "value": "NotThePersonLabel"},
      {"op": "replace", "path": "/label", "value": "Human"}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let eff = overlay::effective(&s, &v, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();

  assert_eq!(eff.status, ChangeStatus::Unchanged);
  assert_eq!(eff.label, "Person");
  assert!(eff.patch_error.is_some());
}

#[tokio::test]
async fn delete_returns_body_with_marker() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(&s, &d, EntityType::Category, "employee", ChangeOp::Delete).await;

  let v = view(&s, Some(&d)).await;
  let eff = overlay::effective(&s, &v, EntityType::Category, &key("employee"))
    .await
    .unwrap()
    .unwrap();

  // Deleted entities are returned, annotated — never dropped.
  assert_eq!(eff.status, ChangeStatus::Deleted);
  assert_eq!(eff.label, "Employee");
}

#[tokio::test]
async fn list_inlines_creates_at_sorted_position() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "animal",
    create(&category("Animal", &[], &[])),
  )
  .await;
  apply(&s, &d, EntityType::Category, "employee", ChangeOp::Delete).await;

  let v = view(&s, Some(&d)).await;
  let listed = overlay::list_effective(&s, &v, EntityType::Category)
    .await
    .unwrap();

  let keys: Vec<_> = listed.iter().map(|e| e.entity_key.as_str()).collect();
  assert_eq!(keys, ["animal", "employee", "person"]);

  assert_eq!(listed[0].status, ChangeStatus::Added);
  assert_eq!(listed[1].status, ChangeStatus::Deleted);
  assert_eq!(listed[2].status, ChangeStatus::Unchanged);
}

// ─── Draft editing ───────────────────────────────────────────────────────────

#[tokio::test]
async fn create_then_delete_collapses_to_nothing() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "animal",
    create(&category("Animal", &[], &[])),
  )
  .await;
  let result = apply(&s, &d, EntityType::Category, "animal", ChangeOp::Delete).await;

  assert!(result.is_none());
  assert!(s.list_changes(d.draft_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn create_over_canonical_is_rejected() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  let err = edit::apply_change(
    &s,
    d.draft_id,
    NewDraftChange {
      entity_type: EntityType::Category,
      entity_key:  key("person"),
      op:          create(&category("Person", &[], &[])),
    },
  )
  .await
  .unwrap_err();

  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::CreateTargetExists { .. })
  ));
}

#[tokio::test]
async fn update_without_canonical_target_is_rejected() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  let err = edit::apply_change(
    &s,
    d.draft_id,
    NewDraftChange {
      entity_type: EntityType::Category,
      entity_key:  key("ghost"),
      op:          update(serde_json::json!([
        {"op": "replace", "path": "/label", "value": "Ghost"}
      ])),
    },
  )
  .await
  .unwrap_err();

  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::MissingCanonicalTarget { .. })
  ));
}

#[tokio::test]
async fn update_folds_into_pending_create() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "animal",
    create(&category("Animal", &[], &[])),
  )
  .await;
  apply(
    &s,
    &d,
    EntityType::Category,
    "animal",
    update(serde_json::json!([
      {"op": "replace", "path": "/label", "value": "Beast"}
    ])),
  )
  .await;

  let change = s
    .get_change(d.draft_id, EntityType::Category, &key("animal"))
    .await
    .unwrap()
    .unwrap();
  // Still a create; the patch was folded into its body.
  let ChangeOp::Create { body } = change.op else {
    panic!("expected a create change");
  };
  assert_eq!(body.get("label").and_then(|v| v.as_str()), Some("Beast"));
}

#[tokio::test]
async fn edits_require_active_draft() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  edit::transition_draft(&s, d.draft_id, DraftStatus::Submitted)
    .await
    .unwrap();

  let err = edit::apply_change(
    &s,
    d.draft_id,
    NewDraftChange {
      entity_type: EntityType::Category,
      entity_key:  key("person"),
      op:          ChangeOp::Delete,
    },
  )
  .await
  .unwrap_err();

  assert!(matches!(
    err,
    crate::Error::Core(strata_core::Error::DraftNotEditable { .. })
  ));
}

#[tokio::test]
async fn terminal_statuses_cannot_transition() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  edit::transition_draft(&s, d.draft_id, DraftStatus::Abandoned)
    .await
    .unwrap();
  let err = edit::transition_draft(&s, d.draft_id, DraftStatus::Active)
    .await
    .unwrap_err();

  assert!(matches!(err, crate::Error::InvalidTransition { .. }));
}

// ─── Inheritance under draft ─────────────────────────────────────────────────

#[tokio::test]
async fn effective_properties_use_materialized_rows_without_category_edits() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  // A property-typed change does not touch the inheritance graph.
  apply(
    &s,
    &d,
    EntityType::Property,
    "age",
    update(serde_json::json!([
      {"op": "replace", "path": "/label", "value": "Years"}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let props = inherit::effective_properties(&s, &v, &key("employee"))
    .await
    .unwrap();

  assert_eq!(props.len(), 1);
  assert_eq!(props[0].property_key.as_str(), "name");
  assert_eq!(props[0].depth, 1);
  assert_eq!(props[0].source_category_key.as_str(), "person");
}

#[tokio::test]
async fn drafted_parent_edge_changes_inheritance_live() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  // New category with its own property; employee is reparented onto it.
  apply(
    &s,
    &d,
    EntityType::Category,
    "contractor",
    create(&category("Contractor", &[], &[("nickname", false)])),
  )
  .await;
  apply(
    &s,
    &d,
    EntityType::Category,
    "employee",
    update(serde_json::json!([
      {"op": "add", "path": "/parents/-", "value": "contractor"}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let props = inherit::effective_properties(&s, &v, &key("employee"))
    .await
    .unwrap();

  let keys: Vec<_> = props.iter().map(|p| p.property_key.as_str()).collect();
  assert_eq!(keys, ["name", "nickname"]);
  assert!(props.iter().all(|p| p.depth == 1));
}

#[tokio::test]
async fn deleted_parent_contributes_nothing_live() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(&s, &d, EntityType::Category, "person", ChangeOp::Delete).await;

  let v = view(&s, Some(&d)).await;
  let props = inherit::effective_properties(&s, &v, &key("employee"))
    .await
    .unwrap();

  assert!(props.is_empty());
}

// ─── Graph queries ───────────────────────────────────────────────────────────

#[tokio::test]
async fn neighborhood_walks_and_decorates() {
  let s = store().await;
  base_ontology(&s).await;
  let v = view(&s, None).await;

  let g = graph::neighborhood(&s, &v, EntityType::Category, &key("employee"), 2)
    .await
    .unwrap();

  let node_keys: Vec<_> = g.nodes.iter().map(|n| n.entity_key.as_str()).collect();
  assert_eq!(node_keys, ["employee", "person"]);
  assert!(!g.has_cycles);
  assert_eq!(g.edges.len(), 1);
  assert_eq!(g.edges[0].from.as_str(), "employee");
  assert_eq!(g.edges[0].to.as_str(), "person");

  // Module memberships come back on every node; no draft means no status.
  let person = g.nodes.iter().find(|n| n.entity_key.as_str() == "person").unwrap();
  assert_eq!(person.modules.len(), 1);
  assert_eq!(person.modules[0].as_str(), "people");
  assert!(person.change_status.is_none());
}

#[tokio::test]
async fn neighborhood_terminates_on_cycles_of_any_length() {
  let s = store().await;

  // k = 2 and k = 3 cycles in the same graph.
  install(
    &s,
    "cyclic",
    &[
      ("a", category("A", &["b"], &[])),
      ("b", category("B", &["a"], &[])),
      ("x", category("X", &["y"], &[])),
      ("y", category("Y", &["z"], &[])),
      ("z", category("Z", &["x"], &[])),
    ],
  )
  .await;
  let v = view(&s, None).await;

  for start in ["a", "b", "x", "y", "z"] {
    let g = graph::neighborhood(&s, &v, EntityType::Category, &key(start), 16)
      .await
      .unwrap();
    assert!(g.has_cycles, "cycle not reported from {start}");
  }
}

#[tokio::test]
async fn neighborhood_reflects_draft_edits() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "org",
    create(&category("Org", &[], &[])),
  )
  .await;
  apply(
    &s,
    &d,
    EntityType::Category,
    "employee",
    update(serde_json::json!([
      {"op": "replace", "path": "/parents", "value": ["org"]}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let g = graph::neighborhood(&s, &v, EntityType::Category, &key("employee"), 2)
    .await
    .unwrap();

  let node_keys: Vec<_> = g.nodes.iter().map(|n| n.entity_key.as_str()).collect();
  assert_eq!(node_keys, ["employee", "org"]);

  let statuses: Vec<_> = g.nodes.iter().map(|n| n.change_status.unwrap()).collect();
  assert_eq!(statuses, [ChangeStatus::Modified, ChangeStatus::Added]);

  assert_eq!(g.edges.len(), 1);
  assert_eq!(g.edges[0].to.as_str(), "org");
}

#[tokio::test]
async fn draft_cycle_is_flagged_not_fatal() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  // person → employee while employee → person still holds canonically.
  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "replace", "path": "/parents", "value": ["employee"]}
    ])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let g = graph::neighborhood(&s, &v, EntityType::Category, &key("person"), 8)
    .await
    .unwrap();

  assert!(g.has_cycles);
}

#[tokio::test]
async fn module_graph_carries_all_memberships() {
  let s = store().await;

  install(
    &s,
    "modular",
    &[
      ("name", property("Name", Datatype::Text, Cardinality::Single)),
      ("person", category("Person", &[], &[("name", true)])),
      (
        "people",
        module(
          "People",
          "1.0.0",
          &[
            (EntityType::Category, "person"),
            (EntityType::Property, "name"),
          ],
        ),
      ),
      (
        "identity",
        module("Identity", "1.0.0", &[(EntityType::Property, "name")]),
      ),
    ],
  )
  .await;
  let v = view(&s, None).await;

  let g = graph::module_graph(&s, &v, &key("people")).await.unwrap();

  assert_eq!(g.nodes.len(), 2);
  let name = g.nodes.iter().find(|n| n.entity_key.as_str() == "name").unwrap();
  let modules: Vec<_> = name.modules.iter().map(|m| m.as_str()).collect();
  assert_eq!(modules, ["identity", "people"]);

  // person → name is a property edge inside the module.
  assert_eq!(g.edges.len(), 1);
  assert_eq!(g.edges[0].from.as_str(), "person");
  assert_eq!(g.edges[0].to.as_str(), "name");
}

#[tokio::test]
async fn module_closure_is_superset_of_direct_categories() {
  let s = store().await;
  base_ontology(&s).await;
  let v = view(&s, None).await;

  let closure = graph::closure(&s, &v, EntityType::Module, &key("people"))
    .await
    .unwrap();

  // Direct members plus ancestors of member categories.
  for direct in ["person", "employee", "name"] {
    assert!(closure.contains(&key(direct)), "{direct} missing from closure");
  }
}

#[tokio::test]
async fn bundle_closure_is_union_of_module_closures() {
  let s = store().await;
  base_ontology(&s).await;
  let v = view(&s, None).await;

  let module_closure = graph::closure(&s, &v, EntityType::Module, &key("people"))
    .await
    .unwrap();
  let bundle_closure = graph::closure(&s, &v, EntityType::Bundle, &key("core"))
    .await
    .unwrap();

  assert_eq!(bundle_closure, module_closure);
}

#[tokio::test]
async fn draft_created_module_has_empty_closure() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Module,
    "fresh",
    create(&module("Fresh", "0.1.0", &[(EntityType::Category, "person")])),
  )
  .await;

  let v = view(&s, Some(&d)).await;
  let closure = graph::closure(&s, &v, EntityType::Module, &key("fresh"))
    .await
    .unwrap();

  // No canonical edges reference the drafted module yet.
  assert!(closure.is_empty());
}

// ─── Validation ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn unresolved_reference_is_an_error() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "alien",
    create(&category("Alien", &[], &[("tentacles", false)])),
  )
  .await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  let finding = report
    .messages
    .iter()
    .find(|m| m.code == ValidationCode::UnresolvedReference)
    .expect("unresolved reference reported");
  assert_eq!(finding.severity, Severity::Error);
  assert_eq!(finding.entity_key.as_str(), "alien");
  assert_eq!(finding.field_path.as_deref(), Some("/properties/0/property"));
  assert!(!report.submittable);
}

#[tokio::test]
async fn cycle_report_enumerates_full_path() {
  let s = store().await;

  install(
    &s,
    "chain",
    &[
      ("a", category("A", &["b"], &[])),
      ("b", category("B", &["c"], &[])),
      ("c", category("C", &[], &[])),
    ],
  )
  .await;
  let d = draft_on_current(&s).await;

  // Close the loop: c → a.
  apply(
    &s,
    &d,
    EntityType::Category,
    "c",
    update(serde_json::json!([
      {"op": "replace", "path": "/parents", "value": ["a"]}
    ])),
  )
  .await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  let finding = report
    .messages
    .iter()
    .find(|m| m.code == ValidationCode::InheritanceCycle)
    .expect("cycle reported");
  assert_eq!(finding.severity, Severity::Error);
  assert_eq!(finding.message, "inheritance cycle: a -> b -> c -> a");
  assert!(!report.submittable);

  // Draft saves still succeed — the cycle only blocks clean submission.
  assert_eq!(s.list_changes(d.draft_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn breaking_changes_warn_but_never_block() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Property,
    "name",
    update(serde_json::json!([
      {"op": "replace", "path": "/datatype", "value": "number"}
    ])),
  )
  .await;
  apply(
    &s,
    &d,
    EntityType::Property,
    "nickname",
    update(serde_json::json!([
      {"op": "replace", "path": "/cardinality", "value": "single"}
    ])),
  )
  .await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  let codes: Vec<_> = report.messages.iter().map(|m| m.code).collect();
  assert!(codes.contains(&ValidationCode::DatatypeChanged));
  assert!(codes.contains(&ValidationCode::CardinalityNarrowed));
  assert!(
    report
      .messages
      .iter()
      .all(|m| m.severity == Severity::Warning)
  );
  assert!(report.submittable);
}

#[tokio::test]
async fn deleting_referenced_entity_warns_and_breaks_references() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(&s, &d, EntityType::Property, "name", ChangeOp::Delete).await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  // The removal itself is a warning; the dangling reference from person is
  // an error.
  assert!(
    report
      .messages
      .iter()
      .any(|m| m.code == ValidationCode::ReferencedEntityRemoved
        && m.severity == Severity::Warning)
  );
  assert!(
    report
      .messages
      .iter()
      .any(|m| m.code == ValidationCode::UnresolvedReference
        && m.entity_key.as_str() == "person")
  );
  assert!(!report.submittable);
}

#[tokio::test]
async fn patched_body_is_shape_checked() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "remove", "path": "/label"}
    ])),
  )
  .await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  assert!(
    report
      .messages
      .iter()
      .any(|m| m.code == ValidationCode::InvalidShape
        && m.severity == Severity::Error)
  );
}

#[tokio::test]
async fn semver_addition_suggests_minor() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "add", "path": "/properties/-",
       "value": {"property": "age", "required": false}}
    ])),
  )
  .await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  let people = report
    .semver
    .iter()
    .find(|sv| sv.entity_key.as_str() == "people")
    .expect("module suggestion");
  assert_eq!(people.bump, BumpLevel::Minor);
  assert_eq!(people.current_version.as_deref(), Some("1.2.3"));
  assert_eq!(people.suggested_version.as_deref(), Some("1.3.0"));
  assert!(!people.reasons.is_empty());

  let core = report
    .semver
    .iter()
    .find(|sv| sv.entity_key.as_str() == "core")
    .expect("bundle suggestion");
  assert_eq!(core.bump, BumpLevel::Minor);
  assert_eq!(core.suggested_version.as_deref(), Some("0.6.0"));
}

#[tokio::test]
async fn semver_breaking_member_suggests_major() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Property,
    "name",
    update(serde_json::json!([
      {"op": "replace", "path": "/datatype", "value": "number"}
    ])),
  )
  .await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  let people = report
    .semver
    .iter()
    .find(|sv| sv.entity_key.as_str() == "people")
    .expect("module suggestion");
  assert_eq!(people.bump, BumpLevel::Major);
  assert_eq!(people.suggested_version.as_deref(), Some("2.0.0"));
}

#[tokio::test]
async fn untouched_draft_validates_clean() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  let report = validate::validate_draft(&s, d.draft_id).await.unwrap();

  assert!(report.messages.is_empty());
  assert!(report.semver.is_empty());
  assert!(report.submittable);
}

// ─── Rebase ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn clean_rebase_advances_base_pointer() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "replace", "path": "/label", "value": "Human"}
    ])),
  )
  .await;

  // Canonical advances; person still exists so the patch re-applies.
  let v2 = install(
    &s,
    "advanced",
    &[
      ("name", property("Name", Datatype::Text, Cardinality::Single)),
      ("person", category("Person v2", &[], &[("name", true)])),
    ],
  )
  .await;

  let outcome = rebase::rebase_draft(&s, d.draft_id, v2.version_id)
    .await
    .unwrap();
  assert!(outcome.rebased);
  assert!(outcome.conflicts.is_empty());

  let rebased = s.get_draft(d.draft_id).await.unwrap().unwrap();
  assert_eq!(rebased.base_version_id, v2.version_id);
  assert_eq!(rebased.rebased_against, Some(v2.version_id));
  assert!(!rebased.stale);
}

#[tokio::test]
async fn stale_patch_scenario_preserves_stored_patch() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;
  let original_base = d.base_version_id;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "replace", "path": "/label", "value": "Human"}
    ])),
  )
  .await;
  let stored_before = s
    .get_change(d.draft_id, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();

  // Canonical advances to a version where person is gone.
  let v2 = install(&s, "personless", &[]).await;

  let outcome = rebase::rebase_draft(&s, d.draft_id, v2.version_id)
    .await
    .unwrap();
  assert!(!outcome.rebased);
  assert_eq!(outcome.conflicts.len(), 1);
  assert_eq!(outcome.conflicts[0].entity_key.as_str(), "person");

  let stale = s.get_draft(d.draft_id).await.unwrap().unwrap();
  assert!(stale.stale);
  assert_eq!(stale.base_version_id, original_base);
  assert_eq!(stale.rebased_against, Some(v2.version_id));

  // The stored patch is untouched, byte for byte.
  let stored_after = s
    .get_change(d.draft_id, EntityType::Category, &key("person"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored_after.op, stored_before.op);
  assert_eq!(stored_after.seq, stored_before.seq);
}

#[tokio::test]
async fn rebase_flags_create_collision() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "org",
    create(&category("Org", &[], &[])),
  )
  .await;

  // The same key lands canonically in the next version.
  let v2 = install(&s, "collision", &[("org", category("Org", &[], &[]))]).await;

  let outcome = rebase::rebase_draft(&s, d.draft_id, v2.version_id)
    .await
    .unwrap();
  assert!(!outcome.rebased);
  assert_eq!(outcome.conflicts.len(), 1);
  assert!(outcome.conflicts[0].reason.contains("now exists"));
}

#[tokio::test]
async fn rebase_flags_vanished_delete_target() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(&s, &d, EntityType::Category, "employee", ChangeOp::Delete).await;

  let v2 = install(&s, "slimmer", &[]).await;

  let outcome = rebase::rebase_draft(&s, d.draft_id, v2.version_id)
    .await
    .unwrap();
  assert!(!outcome.rebased);
  assert!(
    outcome.conflicts[0]
      .reason
      .contains("no longer exists")
  );
}

#[tokio::test]
async fn rebase_leaves_submitted_drafts_untouched() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;
  edit::transition_draft(&s, d.draft_id, DraftStatus::Submitted)
    .await
    .unwrap();

  let v2 = install(&s, "next", &[]).await;
  let outcome = rebase::rebase_draft(&s, d.draft_id, v2.version_id)
    .await
    .unwrap();

  assert!(!outcome.rebased);
  assert!(outcome.conflicts.is_empty());

  let untouched = s.get_draft(d.draft_id).await.unwrap().unwrap();
  assert_eq!(untouched.base_version_id, d.base_version_id);
  assert!(!untouched.stale);
}

#[tokio::test]
async fn validated_drafts_are_rebase_eligible() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;
  edit::transition_draft(&s, d.draft_id, DraftStatus::Validated)
    .await
    .unwrap();

  let v2 = install(&s, "next", &[]).await;
  let outcome = rebase::rebase_draft(&s, d.draft_id, v2.version_id)
    .await
    .unwrap();

  assert!(outcome.rebased);
  let rebased = s.get_draft(d.draft_id).await.unwrap().unwrap();
  assert_eq!(rebased.base_version_id, v2.version_id);
}

// ─── Materialization ─────────────────────────────────────────────────────────

#[tokio::test]
async fn effective_tree_covers_all_types_with_suggestions() {
  let s = store().await;
  base_ontology(&s).await;
  let d = draft_on_current(&s).await;

  apply(
    &s,
    &d,
    EntityType::Category,
    "person",
    update(serde_json::json!([
      {"op": "add", "path": "/properties/-",
       "value": {"property": "age", "required": false}}
    ])),
  )
  .await;

  let tree = materialize::effective_tree(&s, Some(d.draft_id)).await.unwrap();

  assert_eq!(tree.draft_id, Some(d.draft_id));
  assert_eq!(tree.sections.len(), EntityType::ALL.len());

  let categories = tree
    .sections
    .iter()
    .find(|sec| sec.entity_type == EntityType::Category)
    .unwrap();
  let person = categories
    .entities
    .iter()
    .find(|e| e.entity_key.as_str() == "person")
    .unwrap();
  assert_eq!(person.status, ChangeStatus::Modified);

  assert!(!tree.semver.is_empty());
}
