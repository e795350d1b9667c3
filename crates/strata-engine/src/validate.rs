//! The validation engine: shape checks, reference resolution, cycle
//! detection with full cycle paths, breaking-change classification, and
//! semver recommendations.
//!
//! Validation is a pure function of the draft's effective view. It never
//! mutates state and is safe to call on every edit for live feedback; its
//! findings are data, never exceptions.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use strata_core::{
  draft::{ChangeOp, DraftChange, EffectiveEntity},
  entity::{EntityKey, EntityPayload, EntityType},
  store::OntologyStore,
  validation::{
    BumpLevel, SemverSuggestion, Severity, ValidationCode, ValidationMessage,
    ValidationReport,
  },
};
use uuid::Uuid;

use crate::{Error, Result, View, overlay};

type WorldKey = (EntityType, EntityKey);
type World = BTreeMap<WorldKey, EffectiveEntity>;
type Payloads = BTreeMap<WorldKey, EntityPayload>;
type Classes = BTreeMap<WorldKey, Vec<(BumpLevel, String)>>;

/// Validate a draft's effective view end to end.
pub async fn validate_draft<S: OntologyStore>(
  store: &S,
  draft_id: Uuid,
) -> Result<ValidationReport> {
  let view = View::resolve(store, Some(draft_id)).await?;

  // The whole effective world, loaded once. Deleted entities stay in the
  // map: they must not resolve references, but their deletions are judged.
  let mut world: World = BTreeMap::new();
  for entity_type in EntityType::ALL {
    for eff in overlay::list_effective(store, &view, entity_type).await? {
      world.insert((entity_type, eff.entity_key.clone()), eff);
    }
  }

  let mut messages = Vec::new();
  let payloads = decode_payloads(&world, &mut messages);

  check_references(&world, &payloads, &mut messages);
  check_cycles(&world, &payloads, &mut messages);

  let changes = store
    .list_changes(draft_id)
    .await
    .map_err(Error::store)?;
  let classes =
    classify_changes(store, &view, &world, &payloads, &changes, &mut messages)
      .await?;
  let semver = suggest_semver(&world, &payloads, &classes);

  Ok(ValidationReport::new(messages, semver))
}

// ─── Shape check ─────────────────────────────────────────────────────────────

/// Decode every effective body into its typed payload. The patch itself is
/// never validated — the *result* of applying it is.
fn decode_payloads(world: &World, messages: &mut Vec<ValidationMessage>) -> Payloads {
  let mut payloads = Payloads::new();
  for ((entity_type, entity_key), eff) in world {
    match eff.payload() {
      Ok(payload) => {
        payloads.insert((*entity_type, entity_key.clone()), payload);
      }
      Err(e) => messages.push(ValidationMessage {
        entity_type: *entity_type,
        entity_key:  entity_key.clone(),
        field_path:  None,
        severity:    Severity::Error,
        code:        ValidationCode::InvalidShape,
        message:     format!(
          "body of {entity_type} {entity_key} does not match its schema: {e}"
        ),
      }),
    }
  }
  payloads
}

// ─── Reference resolution ────────────────────────────────────────────────────

fn check_references(
  world: &World,
  payloads: &Payloads,
  messages: &mut Vec<ValidationMessage>,
) {
  for ((entity_type, entity_key), payload) in payloads {
    let wk = (*entity_type, entity_key.clone());
    // Entities on their way out do not need their references to hold.
    if world.get(&wk).is_some_and(EffectiveEntity::is_deleted) {
      continue;
    }

    for r in payload.references() {
      let resolves = world
        .get(&(r.entity_type, r.entity_key.clone()))
        .is_some_and(|target| !target.is_deleted());
      if !resolves {
        messages.push(ValidationMessage {
          entity_type: *entity_type,
          entity_key:  entity_key.clone(),
          field_path:  Some(r.field_path.clone()),
          severity:    Severity::Error,
          code:        ValidationCode::UnresolvedReference,
          message:     format!(
            "{entity_type} {entity_key} references {} {}, which does not \
             resolve in the effective view",
            r.entity_type, r.entity_key
          ),
        });
      }
    }
  }
}

// ─── Cycle detection ─────────────────────────────────────────────────────────

/// Topological sort over the effective parent graph. Every residual cycle is
/// reported with its complete ordered path, not merely its existence.
fn check_cycles(
  world: &World,
  payloads: &Payloads,
  messages: &mut Vec<ValidationMessage>,
) {
  // child → parents, restricted to categories that exist and are not
  // deleted. Dangling parents are already reported as unresolved.
  let mut adjacency: BTreeMap<&EntityKey, Vec<&EntityKey>> = BTreeMap::new();
  for ((entity_type, entity_key), payload) in payloads {
    if *entity_type != EntityType::Category {
      continue;
    }
    let wk = (EntityType::Category, entity_key.clone());
    if world.get(&wk).is_some_and(EffectiveEntity::is_deleted) {
      continue;
    }
    let EntityPayload::Category(spec) = payload else {
      continue;
    };
    let parents = spec
      .parents
      .iter()
      .filter(|p| {
        payloads.contains_key(&(EntityType::Category, (*p).clone()))
          && !world
            .get(&(EntityType::Category, (*p).clone()))
            .is_some_and(EffectiveEntity::is_deleted)
      })
      .collect::<Vec<_>>();
    adjacency.insert(entity_key, parents);
  }

  // Kahn's algorithm; whatever survives feeds or forms a cycle.
  let mut in_degree: BTreeMap<&EntityKey, usize> =
    adjacency.keys().map(|k| (*k, 0)).collect();
  for parents in adjacency.values() {
    for parent in parents {
      if let Some(d) = in_degree.get_mut(*parent) {
        *d += 1;
      }
    }
  }

  let mut queue: VecDeque<&EntityKey> = in_degree
    .iter()
    .filter(|(_, d)| **d == 0)
    .map(|(k, _)| *k)
    .collect();
  let mut remaining: BTreeSet<&EntityKey> = adjacency.keys().copied().collect();

  while let Some(node) = queue.pop_front() {
    remaining.remove(node);
    for parent in &adjacency[node] {
      if let Some(d) = in_degree.get_mut(*parent) {
        *d -= 1;
        if *d == 0 {
          queue.push_back(parent);
        }
      }
    }
  }

  // Extract each cycle once by walking parent edges inside the residue.
  while let Some(start) = remaining.iter().next().copied() {
    let mut path: Vec<&EntityKey> = Vec::new();
    let mut seen: BTreeMap<&EntityKey, usize> = BTreeMap::new();
    let mut current = start;

    loop {
      if let Some(&i) = seen.get(current) {
        let cycle: Vec<&EntityKey> = path[i..].to_vec();
        report_cycle(&cycle, messages);
        break;
      }
      seen.insert(current, path.len());
      path.push(current);

      match adjacency[current]
        .iter()
        .find(|p| remaining.contains(*p))
        .copied()
      {
        Some(next) => current = next,
        // Dead end: this walk drained into an already-reported cycle.
        None => break,
      }
    }

    for node in path {
      remaining.remove(node);
    }
  }
}

fn report_cycle(cycle: &[&EntityKey], messages: &mut Vec<ValidationMessage>) {
  // Rotate so the path starts at the smallest key, for a stable message.
  let pivot = cycle
    .iter()
    .enumerate()
    .min_by_key(|(_, k)| *k)
    .map(|(i, _)| i)
    .unwrap_or(0);

  let mut ordered: Vec<&str> = cycle[pivot..]
    .iter()
    .chain(cycle[..pivot].iter())
    .map(|k| k.as_str())
    .collect();
  ordered.push(ordered[0]);

  messages.push(ValidationMessage {
    entity_type: EntityType::Category,
    entity_key:  cycle[pivot].clone(),
    field_path:  Some("/parents".to_string()),
    severity:    Severity::Error,
    code:        ValidationCode::InheritanceCycle,
    message:     format!("inheritance cycle: {}", ordered.join(" -> ")),
  });
}

// ─── Breaking-change classification ──────────────────────────────────────────

/// Classify every draft change, pushing breaking-change warnings and
/// returning the per-entity bump contributions for semver aggregation.
async fn classify_changes<S: OntologyStore>(
  store: &S,
  view: &View,
  world: &World,
  payloads: &Payloads,
  changes: &[DraftChange],
  messages: &mut Vec<ValidationMessage>,
) -> Result<Classes> {
  let mut classes = Classes::new();

  for change in changes {
    let wk = (change.entity_type, change.entity_key.clone());
    let entry = classes.entry(wk.clone()).or_default();

    match &change.op {
      ChangeOp::Create { .. } => {
        entry.push((
          BumpLevel::Minor,
          format!("added {} {}", change.entity_type, change.entity_key),
        ));
      }

      ChangeOp::Delete => {
        let referrers = find_referrers(world, payloads, &wk);
        if !referrers.is_empty() {
          let (rt, rk) = &referrers[0];
          messages.push(ValidationMessage {
            entity_type: change.entity_type,
            entity_key:  change.entity_key.clone(),
            field_path:  None,
            severity:    Severity::Warning,
            code:        ValidationCode::ReferencedEntityRemoved,
            message:     format!(
              "{} {} is deleted but still referenced by {} other \
               entities (e.g. {rt} {rk})",
              change.entity_type,
              change.entity_key,
              referrers.len(),
            ),
          });
        }
        entry.push((
          BumpLevel::Major,
          format!("removed {} {}", change.entity_type, change.entity_key),
        ));
      }

      ChangeOp::Update { .. } => {
        let canonical = store
          .get_entity(view.version_id, change.entity_type, &change.entity_key)
          .await
          .map_err(Error::store)?;
        let old = canonical.as_ref().and_then(|e| e.payload().ok());
        let new = payloads.get(&wk);

        if let (Some(old), Some(new)) = (old, new) {
          diff_payloads(&old, new, change, entry, messages);
        }
        if entry.is_empty() {
          entry.push((
            BumpLevel::Patch,
            format!("modified {} {}", change.entity_type, change.entity_key),
          ));
        }
      }
    }
  }

  Ok(classes)
}

/// All non-deleted effective entities referencing `target`.
fn find_referrers(
  world: &World,
  payloads: &Payloads,
  target: &WorldKey,
) -> Vec<WorldKey> {
  payloads
    .iter()
    .filter(|(wk, _)| *wk != target)
    .filter(|(wk, _)| {
      !world.get(*wk).is_some_and(EffectiveEntity::is_deleted)
    })
    .filter(|(_, payload)| {
      payload
        .references()
        .iter()
        .any(|r| (r.entity_type, r.entity_key.clone()) == *target)
    })
    .map(|(wk, _)| wk.clone())
    .collect()
}

fn warn(
  change: &DraftChange,
  field_path: &str,
  code: ValidationCode,
  message: String,
) -> ValidationMessage {
  ValidationMessage {
    entity_type: change.entity_type,
    entity_key:  change.entity_key.clone(),
    field_path:  Some(field_path.to_string()),
    severity:    Severity::Warning,
    code,
    message,
  }
}

/// Compare canonical and effective payloads of one updated entity, pushing
/// breaking-change warnings and recording bump contributions.
fn diff_payloads(
  old: &EntityPayload,
  new: &EntityPayload,
  change: &DraftChange,
  entry: &mut Vec<(BumpLevel, String)>,
  messages: &mut Vec<ValidationMessage>,
) {
  let key = &change.entity_key;

  match (old, new) {
    (EntityPayload::Property(o), EntityPayload::Property(n)) => {
      if o.datatype != n.datatype {
        let reason = format!(
          "property {key} datatype changed from {} to {}",
          o.datatype, n.datatype,
        );
        messages.push(warn(
          change,
          "/datatype",
          ValidationCode::DatatypeChanged,
          reason.clone(),
        ));
        entry.push((BumpLevel::Major, reason));
      }
      if o.cardinality.narrows_to(n.cardinality) {
        let reason =
          format!("property {key} cardinality narrowed from many to single");
        messages.push(warn(
          change,
          "/cardinality",
          ValidationCode::CardinalityNarrowed,
          reason.clone(),
        ));
        entry.push((BumpLevel::Major, reason));
      } else if n.cardinality.narrows_to(o.cardinality) {
        entry.push((
          BumpLevel::Minor,
          format!("property {key} cardinality widened from single to many"),
        ));
      }
    }

    (EntityPayload::Category(o), EntityPayload::Category(n)) => {
      diff_key_sets(
        "parent", "/parents", &o.parents, &n.parents, change, entry, messages,
      );
      let old_props: Vec<EntityKey> =
        o.properties.iter().map(|p| p.property.clone()).collect();
      let new_props: Vec<EntityKey> =
        n.properties.iter().map(|p| p.property.clone()).collect();
      diff_key_sets(
        "property",
        "/properties",
        &old_props,
        &new_props,
        change,
        entry,
        messages,
      );
      diff_key_sets(
        "subobject",
        "/subobjects",
        &o.subobjects,
        &n.subobjects,
        change,
        entry,
        messages,
      );
    }

    (EntityPayload::Subobject(o), EntityPayload::Subobject(n)) => {
      let old_props: Vec<EntityKey> =
        o.properties.iter().map(|p| p.property.clone()).collect();
      let new_props: Vec<EntityKey> =
        n.properties.iter().map(|p| p.property.clone()).collect();
      diff_key_sets(
        "property",
        "/properties",
        &old_props,
        &new_props,
        change,
        entry,
        messages,
      );
    }

    (EntityPayload::Module(o), EntityPayload::Module(n)) => {
      let old_members: Vec<EntityKey> =
        o.members.iter().map(|m| m.entity_key.clone()).collect();
      let new_members: Vec<EntityKey> =
        n.members.iter().map(|m| m.entity_key.clone()).collect();
      diff_key_sets(
        "member", "/members", &old_members, &new_members, change, entry,
        messages,
      );
    }

    (EntityPayload::Bundle(o), EntityPayload::Bundle(n)) => {
      diff_key_sets(
        "module", "/modules", &o.modules, &n.modules, change, entry, messages,
      );
    }

    _ => {}
  }
}

/// Removals from a reference list are breaking; additions are minor.
fn diff_key_sets(
  noun: &str,
  field_path: &str,
  old: &[EntityKey],
  new: &[EntityKey],
  change: &DraftChange,
  entry: &mut Vec<(BumpLevel, String)>,
  messages: &mut Vec<ValidationMessage>,
) {
  let old_set: BTreeSet<&EntityKey> = old.iter().collect();
  let new_set: BTreeSet<&EntityKey> = new.iter().collect();

  for removed in old_set.difference(&new_set) {
    let reason = format!(
      "{noun} {removed} removed from {} {}",
      change.entity_type, change.entity_key
    );
    messages.push(warn(
      change,
      field_path,
      ValidationCode::MemberRemoved,
      reason.clone(),
    ));
    entry.push((BumpLevel::Major, reason));
  }
  for added in new_set.difference(&old_set) {
    entry.push((
      BumpLevel::Minor,
      format!(
        "{noun} {added} added to {} {}",
        change.entity_type, change.entity_key
      ),
    ));
  }
}

// ─── Semver aggregation ──────────────────────────────────────────────────────

/// Per effective module: the union of its own and its members' bump
/// contributions. Per bundle: its own plus those of its modules.
fn suggest_semver(
  world: &World,
  payloads: &Payloads,
  classes: &Classes,
) -> Vec<SemverSuggestion> {
  let mut suggestions = Vec::new();
  let mut per_module: BTreeMap<EntityKey, Vec<(BumpLevel, String)>> =
    BTreeMap::new();

  for ((entity_type, entity_key), payload) in payloads {
    if *entity_type != EntityType::Module {
      continue;
    }
    let wk = (EntityType::Module, entity_key.clone());
    if world.get(&wk).is_some_and(EffectiveEntity::is_deleted) {
      continue;
    }
    let EntityPayload::Module(spec) = payload else {
      continue;
    };

    let mut contributions: Vec<(BumpLevel, String)> = Vec::new();
    if let Some(own) = classes.get(&wk) {
      contributions.extend(own.iter().cloned());
    }
    for member in &spec.members {
      if let Some(c) = classes.get(&(member.entity_type, member.entity_key.clone()))
      {
        contributions.extend(c.iter().cloned());
      }
    }
    if contributions.is_empty() {
      continue;
    }

    per_module.insert(entity_key.clone(), contributions.clone());
    suggestions.push(build_suggestion(
      EntityType::Module,
      entity_key,
      spec.version.as_deref(),
      contributions,
    ));
  }

  for ((entity_type, entity_key), payload) in payloads {
    if *entity_type != EntityType::Bundle {
      continue;
    }
    let wk = (EntityType::Bundle, entity_key.clone());
    if world.get(&wk).is_some_and(EffectiveEntity::is_deleted) {
      continue;
    }
    let EntityPayload::Bundle(spec) = payload else {
      continue;
    };

    let mut contributions: Vec<(BumpLevel, String)> = Vec::new();
    if let Some(own) = classes.get(&wk) {
      contributions.extend(own.iter().cloned());
    }
    for module in &spec.modules {
      if let Some(c) = per_module.get(module) {
        contributions.extend(c.iter().cloned());
      }
    }
    if contributions.is_empty() {
      continue;
    }

    suggestions.push(build_suggestion(
      EntityType::Bundle,
      entity_key,
      spec.version.as_deref(),
      contributions,
    ));
  }

  suggestions
}

fn build_suggestion(
  entity_type: EntityType,
  entity_key: &EntityKey,
  current_version: Option<&str>,
  contributions: Vec<(BumpLevel, String)>,
) -> SemverSuggestion {
  let bump = contributions
    .iter()
    .map(|(b, _)| *b)
    .max()
    .unwrap_or(BumpLevel::Patch);

  let mut reasons = Vec::new();
  for (_, reason) in contributions {
    if !reasons.contains(&reason) {
      reasons.push(reason);
    }
  }

  SemverSuggestion {
    entity_type,
    entity_key: entity_key.clone(),
    bump,
    current_version: current_version.map(str::to_owned),
    suggested_version: current_version.and_then(|v| bumped(v, bump)),
    reasons,
  }
}

fn bumped(version: &str, bump: BumpLevel) -> Option<String> {
  let mut v = semver::Version::parse(version).ok()?;
  match bump {
    BumpLevel::Major => {
      v.major += 1;
      v.minor = 0;
      v.patch = 0;
    }
    BumpLevel::Minor => {
      v.minor += 1;
      v.patch = 0;
    }
    BumpLevel::Patch => {
      v.patch += 1;
    }
  }
  v.pre = semver::Prerelease::EMPTY;
  v.build = semver::BuildMetadata::EMPTY;
  Some(v.to_string())
}
