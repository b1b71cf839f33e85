//! Embedded temporal store.
//!
//! A labeled property graph held in concurrent maps: one record per entity
//! (identity + state chain + audit log), one version list per ordered edge
//! triple. Mutations serialize through a single write gate held across the
//! in-memory commit and the WAL append, so the log order always matches the
//! commit order; readers never block.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::error::{GraphError, GraphResult};
use crate::schema::{is_valid_identifier, ConstraintDef, ConstraintKind};
use crate::types::{
    AuditAction, AuditEntry, ChangeSummary, DirectedRelationship, Entity, EntityState,
    GraphSnapshot, PropMap, Relationship, RelationshipDirection,
};

use super::wal::{self, WalOp, WalWriter};
use super::{compare_json, OrderBy, SearchFilter, TemporalStore};

const WRITE_CONFLICT: &str = "write conflict";

/// Whether a storage error is a transient write conflict worth one retry.
pub(crate) fn is_write_conflict(err: &GraphError) -> bool {
    matches!(err, GraphError::Storage(msg) if msg.starts_with(WRITE_CONFLICT))
}

/// Everything the store knows about one entity.
#[derive(Debug, Clone)]
struct EntityRecord {
    entity: Entity,
    /// Ascending by version; the last element is the head (closed at the
    /// delete time once the entity is deleted)
    states: Vec<EntityState>,
    /// Ascending by timestamp
    audit: Vec<AuditEntry>,
}

impl EntityRecord {
    fn head(&self) -> Option<&EntityState> {
        self.states.last()
    }
}

type EdgeKey = (String, String, String);

/// The embedded [`TemporalStore`] implementation.
pub struct MemoryStore {
    records: DashMap<String, EntityRecord>,
    /// (from, type, to) → every version of that edge, ascending
    edges: DashMap<EdgeKey, Vec<Relationship>>,
    /// (label, property) → canonical value → entity id
    uniques: DashMap<(String, String), HashMap<String, String>>,
    /// Serializes mutations; held across commit + WAL append
    write_gate: tokio::sync::Mutex<()>,
    wal: Option<WalWriter>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entities", &self.records.len())
            .field("path", &self.path)
            .finish()
    }
}

impl MemoryStore {
    /// A volatile store with no persistence. The default for tests.
    pub fn in_memory() -> Self {
        Self {
            records: DashMap::new(),
            edges: DashMap::new(),
            uniques: DashMap::new(),
            write_gate: tokio::sync::Mutex::new(()),
            wal: None,
            path: None,
        }
    }

    /// Open a persistent store under `dir`, replaying any existing WAL.
    pub async fn open(dir: impl Into<PathBuf>) -> GraphResult<Self> {
        let dir = dir.into();
        let (ops, last_seq) = wal::replay(&dir).await?;
        let replayed = ops.len();
        let store = Self::in_memory();
        for op in ops {
            store.apply(op);
        }
        let writer = WalWriter::open(&dir, last_seq).await?;
        info!(path = %dir.display(), records = replayed, "store opened");
        Ok(Self {
            wal: Some(writer),
            path: Some(dir),
            ..store
        })
    }

    pub fn entity_count(&self) -> usize {
        self.records.len()
    }

    /// Apply one op to the in-memory maps. The single code path for live
    /// commits and WAL replay, so both always agree.
    fn apply(&self, op: WalOp) {
        match op {
            WalOp::CreateEntity {
                entity,
                state,
                audit,
            } => {
                let mut record =
                    self.records
                        .entry(entity.id.clone())
                        .or_insert_with(|| EntityRecord {
                            entity: entity.clone(),
                            states: Vec::new(),
                            audit: Vec::new(),
                        });
                record.entity = entity;
                record.states.push(state);
                record.audit.push(audit);
            }
            WalOp::UpdateEntity {
                state,
                closed_at,
                audit,
            } => {
                if let Some(mut record) = self.records.get_mut(&state.entity_id) {
                    if let Some(head) = record.states.last_mut() {
                        head.valid_to = Some(closed_at);
                    }
                    record.states.push(state);
                    record.audit.push(audit);
                }
            }
            WalOp::SoftDelete { id, at, by, audit } => {
                if let Some(mut record) = self.records.get_mut(&id) {
                    if let Some(head) = record.states.last_mut() {
                        head.valid_to = Some(at);
                    }
                    record.entity.deleted_at = Some(at);
                    record.entity.deleted_by = Some(by);
                    record.audit.push(audit);
                }
            }
            WalOp::CreateRelationship {
                relationship,
                audit,
            } => {
                let key = (
                    relationship.from_id.clone(),
                    relationship.rel_type.clone(),
                    relationship.to_id.clone(),
                );
                self.edges.entry(key).or_default().push(relationship.clone());
                if let Some(mut record) = self.records.get_mut(&relationship.from_id) {
                    record.audit.push(audit);
                }
            }
            WalOp::CloseRelationship {
                from_id,
                to_id,
                rel_type,
                at,
                audit,
            } => {
                let key = (from_id.clone(), rel_type, to_id);
                if let Some(mut versions) = self.edges.get_mut(&key) {
                    if let Some(active) = versions.iter_mut().rev().find(|r| r.is_active()) {
                        active.valid_to = Some(at);
                    }
                }
                if let Some(mut record) = self.records.get_mut(&from_id) {
                    record.audit.push(audit);
                }
            }
        }
    }

    async fn log(&self, op: &WalOp) -> GraphResult<()> {
        match &self.wal {
            Some(writer) => writer.append(op).await,
            None => Ok(()),
        }
    }

    fn ensure_ident(&self, kind: &str, s: &str) -> GraphResult<()> {
        if is_valid_identifier(s) {
            Ok(())
        } else {
            Err(GraphError::Storage(format!("illegal {kind} identifier '{s}'")))
        }
    }

    /// Unique-index keys that apply to a label.
    fn unique_keys_for(&self, label: &str) -> Vec<(String, String)> {
        self.uniques
            .iter()
            .filter(|entry| entry.key().0 == label)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Reserve unique-index slots for the given props; undo on conflict.
    fn claim_uniques(&self, label: &str, id: &str, props: &PropMap) -> GraphResult<()> {
        let mut claimed: Vec<((String, String), String)> = Vec::new();
        for key in self.unique_keys_for(label) {
            let Some(value) = props.get(&key.1) else {
                continue;
            };
            let slot = value.to_string();
            let conflict = {
                let Some(mut index) = self.uniques.get_mut(&key) else {
                    continue;
                };
                match index.get(&slot) {
                    Some(owner) if owner != id => true,
                    _ => {
                        index.insert(slot.clone(), id.to_string());
                        claimed.push((key.clone(), slot.clone()));
                        false
                    }
                }
            };
            if conflict {
                for (key, slot) in claimed {
                    if let Some(mut index) = self.uniques.get_mut(&key) {
                        index.remove(&slot);
                    }
                }
                return Err(GraphError::Storage(format!(
                    "unique constraint on {label}.{} violated by entity '{id}'",
                    key.1
                )));
            }
        }
        Ok(())
    }

    /// Drop unique-index slots owned by `id` for props no longer held.
    fn release_uniques(&self, label: &str, id: &str, old_props: &PropMap) {
        for key in self.unique_keys_for(label) {
            let Some(value) = old_props.get(&key.1) else {
                continue;
            };
            let slot = value.to_string();
            if let Some(mut index) = self.uniques.get_mut(&key) {
                if index.get(&slot).is_some_and(|owner| owner == id) {
                    index.remove(&slot);
                }
            }
        }
    }
}

#[async_trait]
impl TemporalStore for MemoryStore {
    async fn create_entity(
        &self,
        id: &str,
        label: &str,
        props: PropMap,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<EntityState> {
        self.ensure_ident("label", label)?;
        let _gate = self.write_gate.lock().await;

        // Revival of a soft-deleted entity continues its version chain;
        // a live entity is a conflict the pipeline resolves by retrying
        // as an update.
        let (entity, version) = match self.records.get(id) {
            Some(record) if !record.entity.is_deleted() => {
                return Err(GraphError::Storage(format!(
                    "{WRITE_CONFLICT}: entity '{id}' already exists"
                )));
            }
            Some(record) => {
                let mut entity = record.entity.clone();
                entity.deleted_at = None;
                entity.deleted_by = None;
                let version = record.head().map_or(1, |s| s.version + 1);
                (entity, version)
            }
            None => (
                Entity {
                    id: id.to_string(),
                    label: label.to_string(),
                    created_at: now,
                    deleted_at: None,
                    deleted_by: None,
                },
                1,
            ),
        };

        self.claim_uniques(label, id, &props)?;

        let state = EntityState {
            entity_id: id.to_string(),
            version,
            valid_from: now,
            valid_to: None,
            recorded_at: now,
            actor: actor.to_string(),
            props,
        };
        let audit = AuditEntry {
            id: audit_id.to_string(),
            entity_id: id.to_string(),
            entity_label: label.to_string(),
            action: AuditAction::Create,
            actor: actor.to_string(),
            timestamp: now,
            changes: None,
        };

        let op = WalOp::CreateEntity {
            entity,
            state: state.clone(),
            audit,
        };
        self.apply(op.clone());
        self.log(&op).await?;
        debug!(entity = id, label, version, "entity created");
        Ok(state)
    }

    async fn update_entity(
        &self,
        id: &str,
        props: PropMap,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
        changes: Option<String>,
    ) -> GraphResult<EntityState> {
        let _gate = self.write_gate.lock().await;

        let (label, old_props, version) = match self.records.get(id) {
            Some(record) if !record.entity.is_deleted() => {
                let head = record
                    .head()
                    .ok_or_else(|| GraphError::Storage(format!("entity '{id}' has no state")))?;
                (
                    record.entity.label.clone(),
                    head.props.clone(),
                    head.version + 1,
                )
            }
            _ => return Err(GraphError::NotFound(id.to_string())),
        };

        self.release_uniques(&label, id, &old_props);
        if let Err(e) = self.claim_uniques(&label, id, &props) {
            // Restore the released slots before surfacing the conflict.
            let _ = self.claim_uniques(&label, id, &old_props);
            return Err(e);
        }

        let state = EntityState {
            entity_id: id.to_string(),
            version,
            valid_from: now,
            valid_to: None,
            recorded_at: now,
            actor: actor.to_string(),
            props,
        };
        let audit = AuditEntry {
            id: audit_id.to_string(),
            entity_id: id.to_string(),
            entity_label: label,
            action: AuditAction::Update,
            actor: actor.to_string(),
            timestamp: now,
            changes,
        };

        let op = WalOp::UpdateEntity {
            state: state.clone(),
            closed_at: now,
            audit,
        };
        self.apply(op.clone());
        self.log(&op).await?;
        debug!(entity = id, version, "entity updated");
        Ok(state)
    }

    async fn soft_delete_entity(
        &self,
        id: &str,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<()> {
        let _gate = self.write_gate.lock().await;

        let (label, head_props) = match self.records.get(id) {
            None => return Err(GraphError::NotFound(id.to_string())),
            Some(record) if record.entity.is_deleted() => return Ok(()),
            Some(record) => (
                record.entity.label.clone(),
                record.head().map(|s| s.props.clone()).unwrap_or_default(),
            ),
        };

        self.release_uniques(&label, id, &head_props);

        let audit = AuditEntry {
            id: audit_id.to_string(),
            entity_id: id.to_string(),
            entity_label: label,
            action: AuditAction::Delete,
            actor: actor.to_string(),
            timestamp: now,
            changes: None,
        };
        let op = WalOp::SoftDelete {
            id: id.to_string(),
            at: now,
            by: actor.to_string(),
            audit,
        };
        self.apply(op.clone());
        self.log(&op).await?;
        debug!(entity = id, "entity soft-deleted");
        Ok(())
    }

    async fn create_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: PropMap,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<Relationship> {
        self.ensure_ident("relationship type", rel_type)?;
        let _gate = self.write_gate.lock().await;

        let from_label = match self.records.get(from_id) {
            Some(record) if !record.entity.is_deleted() => record.entity.label.clone(),
            _ => return Err(GraphError::NotFound(from_id.to_string())),
        };
        if !self
            .records
            .get(to_id)
            .is_some_and(|r| !r.entity.is_deleted())
        {
            return Err(GraphError::NotFound(to_id.to_string()));
        }

        let key = (
            from_id.to_string(),
            rel_type.to_string(),
            to_id.to_string(),
        );
        if self
            .edges
            .get(&key)
            .is_some_and(|versions| versions.iter().any(|r| r.is_active()))
        {
            return Err(GraphError::Storage(format!(
                "active {rel_type} edge already exists from '{from_id}' to '{to_id}'"
            )));
        }

        let relationship = Relationship {
            rel_type: rel_type.to_string(),
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            valid_from: now,
            valid_to: None,
            actor: actor.to_string(),
            props,
        };
        let audit = AuditEntry {
            id: audit_id.to_string(),
            entity_id: from_id.to_string(),
            entity_label: from_label,
            action: AuditAction::Relate,
            actor: actor.to_string(),
            timestamp: now,
            changes: Some(format!("{rel_type} -> {to_id}")),
        };
        let op = WalOp::CreateRelationship {
            relationship: relationship.clone(),
            audit,
        };
        self.apply(op.clone());
        self.log(&op).await?;
        debug!(from = from_id, to = to_id, rel_type, "relationship created");
        Ok(relationship)
    }

    async fn close_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<bool> {
        let _gate = self.write_gate.lock().await;

        let key = (
            from_id.to_string(),
            rel_type.to_string(),
            to_id.to_string(),
        );
        let has_active = self
            .edges
            .get(&key)
            .is_some_and(|versions| versions.iter().any(|r| r.is_active()));
        if !has_active {
            return Ok(false);
        }
        let from_label = self
            .records
            .get(from_id)
            .map(|r| r.entity.label.clone())
            .unwrap_or_default();

        let audit = AuditEntry {
            id: audit_id.to_string(),
            entity_id: from_id.to_string(),
            entity_label: from_label,
            action: AuditAction::Unrelate,
            actor: actor.to_string(),
            timestamp: now,
            changes: Some(format!("{rel_type} -> {to_id}")),
        };
        let op = WalOp::CloseRelationship {
            from_id: from_id.to_string(),
            to_id: to_id.to_string(),
            rel_type: rel_type.to_string(),
            at: now,
            audit,
        };
        self.apply(op.clone());
        self.log(&op).await?;
        debug!(from = from_id, to = to_id, rel_type, "relationship closed");
        Ok(true)
    }

    async fn get_current(&self, id: &str) -> GraphResult<Option<(Entity, EntityState)>> {
        Ok(self.records.get(id).and_then(|record| {
            if record.entity.is_deleted() {
                None
            } else {
                record
                    .head()
                    .map(|head| (record.entity.clone(), head.clone()))
            }
        }))
    }

    async fn get_at_time(
        &self,
        id: &str,
        t: DateTime<Utc>,
    ) -> GraphResult<Option<(Entity, EntityState)>> {
        Ok(self.records.get(id).and_then(|record| {
            record
                .states
                .iter()
                .rev()
                .find(|s| s.covers(t))
                .map(|state| (record.entity.clone(), state.clone()))
        }))
    }

    async fn get_history(&self, id: &str) -> GraphResult<Vec<EntityState>> {
        Ok(self.records.get(id).map_or_else(Vec::new, |record| {
            let mut states = record.states.clone();
            states.reverse();
            states
        }))
    }

    async fn query_by_label(&self, label: &str) -> GraphResult<Vec<(Entity, EntityState)>> {
        self.ensure_ident("label", label)?;
        let mut out: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.entity.label == label && !r.entity.is_deleted())
            .filter_map(|r| r.head().map(|head| (r.entity.clone(), head.clone())))
            .collect();
        out.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        Ok(out)
    }

    async fn get_relationships(&self, id: &str) -> GraphResult<Vec<DirectedRelationship>> {
        let mut out = Vec::new();
        for versions in self.edges.iter() {
            for rel in versions.iter().filter(|r| r.is_active()) {
                if rel.from_id == id {
                    out.push(DirectedRelationship {
                        direction: RelationshipDirection::Outgoing,
                        relationship: rel.clone(),
                    });
                } else if rel.to_id == id {
                    out.push(DirectedRelationship {
                        direction: RelationshipDirection::Incoming,
                        relationship: rel.clone(),
                    });
                }
            }
        }
        out.sort_by(|a, b| {
            (&a.relationship.rel_type, &a.relationship.to_id)
                .cmp(&(&b.relationship.rel_type, &b.relationship.to_id))
        });
        Ok(out)
    }

    async fn get_audit(&self, id: &str) -> GraphResult<Vec<AuditEntry>> {
        Ok(self
            .records
            .get(id)
            .map_or_else(Vec::new, |record| record.audit.clone()))
    }

    async fn changes_since(
        &self,
        t: DateTime<Utc>,
        labels: Option<&[String]>,
        actors: Option<&[String]>,
        limit: usize,
    ) -> GraphResult<Vec<ChangeSummary>> {
        let mut out = Vec::new();
        for record in self.records.iter() {
            if labels.is_some_and(|ls| !ls.contains(&record.entity.label)) {
                continue;
            }
            let recent: Vec<_> = record
                .audit
                .iter()
                .filter(|e| e.timestamp > t)
                .filter(|e| actors.map_or(true, |who| who.contains(&e.actor)))
                .collect();
            let Some(last) = recent.last() else { continue };
            out.push(ChangeSummary {
                entity_id: record.entity.id.clone(),
                label: record.entity.label.clone(),
                last_action: last.action,
                last_actor: last.actor.clone(),
                last_timestamp: last.timestamp,
                entry_count: recent.len(),
            });
        }
        out.sort_by(|a, b| b.last_timestamp.cmp(&a.last_timestamp));
        if limit > 0 {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn search(
        &self,
        label: &str,
        filters: &[SearchFilter],
        limit: usize,
        order_by: Option<&OrderBy>,
    ) -> GraphResult<Vec<(Entity, EntityState)>> {
        let mut out: Vec<_> = self
            .query_by_label(label)
            .await?
            .into_iter()
            .filter(|(_, state)| filters.iter().all(|f| f.matches(&state.props)))
            .collect();
        if let Some(order) = order_by {
            out.sort_by(|(_, a), (_, b)| {
                let ord = match (a.props.get(&order.property), b.props.get(&order.property)) {
                    (Some(x), Some(y)) => {
                        compare_json(x, y).unwrap_or(std::cmp::Ordering::Equal)
                    }
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if limit > 0 {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn snapshot_at(
        &self,
        t: DateTime<Utc>,
        labels: Option<&[String]>,
    ) -> GraphResult<GraphSnapshot> {
        let mut entities = Vec::new();
        for record in self.records.iter() {
            if labels.is_some_and(|ls| !ls.contains(&record.entity.label)) {
                continue;
            }
            if let Some(state) = record.states.iter().rev().find(|s| s.covers(t)) {
                entities.push((record.entity.clone(), state.clone()));
            }
        }
        entities.sort_by(|a, b| a.0.id.cmp(&b.0.id));

        let mut relationships: Vec<_> = self
            .edges
            .iter()
            .flat_map(|versions| {
                versions
                    .iter()
                    .filter(|r| r.covers(t))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        relationships.sort_by(|a, b| {
            (&a.from_id, &a.rel_type, &a.to_id).cmp(&(&b.from_id, &b.rel_type, &b.to_id))
        });

        Ok(GraphSnapshot {
            at: t,
            entities,
            relationships,
        })
    }

    async fn ensure_constraints(&self, constraints: &[ConstraintDef]) -> GraphResult<()> {
        let _gate = self.write_gate.lock().await;
        for constraint in constraints {
            match constraint.kind {
                ConstraintKind::Unique => {
                    let key = (constraint.label.clone(), constraint.property.clone());
                    let mut index = HashMap::new();
                    for record in self.records.iter() {
                        if record.entity.label != constraint.label || record.entity.is_deleted() {
                            continue;
                        }
                        let Some(value) = record
                            .head()
                            .and_then(|s| s.props.get(&constraint.property))
                        else {
                            continue;
                        };
                        if let Some(existing) =
                            index.insert(value.to_string(), record.entity.id.clone())
                        {
                            return Err(GraphError::Storage(format!(
                                "cannot create unique constraint on {}.{}: entities '{existing}' and '{}' share {value}",
                                constraint.label, constraint.property, record.entity.id
                            )));
                        }
                    }
                    self.uniques.insert(key, index);
                }
                // The embedded store answers every query by scan; a
                // secondary index has nothing to add.
                ConstraintKind::Index => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn props(value: serde_json::Value) -> PropMap {
        value.as_object().unwrap().clone()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::in_memory();
        store
            .create_entity(
                "svc-1",
                "Service",
                props(json!({"name": "Auth", "status": "active"})),
                "alice",
                Utc::now(),
                "a1",
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn create_then_get_current() {
        let store = seeded().await;
        let (entity, state) = store.get_current("svc-1").await.unwrap().unwrap();
        assert_eq!(entity.label, "Service");
        assert_eq!(state.version, 1);
        assert_eq!(state.props["name"], json!("Auth"));
        assert!(state.is_head());
    }

    #[tokio::test]
    async fn create_existing_is_write_conflict() {
        let store = seeded().await;
        let err = store
            .create_entity("svc-1", "Service", PropMap::new(), "bob", Utc::now(), "a2")
            .await
            .unwrap_err();
        assert!(is_write_conflict(&err));
    }

    #[tokio::test]
    async fn update_closes_head_and_links_chain() {
        let store = seeded().await;
        let v2 = store
            .update_entity(
                "svc-1",
                props(json!({"name": "Auth", "status": "deprecated"})),
                "bob",
                Utc::now(),
                "a2",
                None,
            )
            .await
            .unwrap();
        assert_eq!(v2.version, 2);

        let history = store.get_history("svc-1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].version, 2);
        assert!(history[0].is_head());
        assert_eq!(history[1].version, 1);
        assert_eq!(history[1].valid_to, Some(v2.valid_from));
    }

    #[tokio::test]
    async fn versions_stay_dense_under_concurrent_updates() {
        let store = Arc::new(seeded().await);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_entity(
                        "svc-1",
                        props(json!({"name": "Auth", "round": i})),
                        "racer",
                        Utc::now(),
                        &format!("r{i}"),
                        None,
                    )
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.get_history("svc-1").await.unwrap();
        assert_eq!(history.len(), 17);
        let versions: Vec<_> = history.iter().map(|s| s.version).collect();
        assert_eq!(versions, (1..=17).rev().collect::<Vec<u64>>());
        assert_eq!(history.iter().filter(|s| s.is_head()).count(), 1);
        assert_eq!(store.get_audit("svc-1").await.unwrap().len(), 17);
    }

    #[tokio::test]
    async fn soft_delete_hides_current_but_keeps_history() {
        let store = seeded().await;
        let before = Utc::now();
        store
            .soft_delete_entity("svc-1", "bob", Utc::now(), "a2")
            .await
            .unwrap();

        assert!(store.get_current("svc-1").await.unwrap().is_none());
        let history = store.get_history("svc-1").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].valid_to.is_some());

        // Point-in-time read before the delete still sees the state.
        let at = store.get_at_time("svc-1", before).await.unwrap();
        assert!(at.is_some());

        // Idempotent.
        store
            .soft_delete_entity("svc-1", "bob", Utc::now(), "a3")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn deleted_entity_can_be_revived_with_next_version() {
        let store = seeded().await;
        store
            .soft_delete_entity("svc-1", "bob", Utc::now(), "a2")
            .await
            .unwrap();
        let revived = store
            .create_entity(
                "svc-1",
                "Service",
                props(json!({"name": "Auth"})),
                "carol",
                Utc::now(),
                "a3",
            )
            .await
            .unwrap();
        assert_eq!(revived.version, 2);
        assert!(store.get_current("svc-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn point_in_time_walks_the_chain() {
        let store = seeded().await;
        let t1 = store.get_current("svc-1").await.unwrap().unwrap().1.valid_from;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let v2 = store
            .update_entity(
                "svc-1",
                props(json!({"name": "Auth", "status": "deprecated"})),
                "bob",
                Utc::now(),
                "a2",
                None,
            )
            .await
            .unwrap();

        let between = t1 + chrono::Duration::milliseconds(2);
        let (_, at_between) = store.get_at_time("svc-1", between).await.unwrap().unwrap();
        assert_eq!(at_between.props["status"], json!("active"));

        let (_, at_v2) = store.get_at_time("svc-1", v2.valid_from).await.unwrap().unwrap();
        assert_eq!(at_v2.props["status"], json!("deprecated"));

        let before_create = t1 - chrono::Duration::seconds(1);
        assert!(store
            .get_at_time("svc-1", before_create)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn relationships_are_direction_tagged_and_unique_while_active() {
        let store = seeded().await;
        store
            .create_entity("db-1", "Service", props(json!({"name": "DB"})), "alice", Utc::now(), "a2")
            .await
            .unwrap();

        store
            .create_relationship("svc-1", "db-1", "DEPENDS_ON", PropMap::new(), "alice", Utc::now(), "a3")
            .await
            .unwrap();

        // Second active edge of the same triple is refused.
        assert!(store
            .create_relationship("svc-1", "db-1", "DEPENDS_ON", PropMap::new(), "alice", Utc::now(), "a4")
            .await
            .is_err());

        let from_side = store.get_relationships("svc-1").await.unwrap();
        assert_eq!(from_side.len(), 1);
        assert_eq!(from_side[0].direction, RelationshipDirection::Outgoing);

        let to_side = store.get_relationships("db-1").await.unwrap();
        assert_eq!(to_side[0].direction, RelationshipDirection::Incoming);

        // Close, then a new edge of the same type may open.
        assert!(store
            .close_relationship("svc-1", "db-1", "DEPENDS_ON", "alice", Utc::now(), "a5")
            .await
            .unwrap());
        assert!(!store
            .close_relationship("svc-1", "db-1", "DEPENDS_ON", "alice", Utc::now(), "a6")
            .await
            .unwrap());
        assert!(store
            .create_relationship("svc-1", "db-1", "DEPENDS_ON", PropMap::new(), "alice", Utc::now(), "a7")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn reserved_edge_types_never_reach_user_queries() {
        let store = seeded().await;
        // The embedded store has no structural edges to leak, but the
        // identifier gate still rejects anything malformed.
        assert!(store
            .create_relationship("svc-1", "svc-1", "not valid", PropMap::new(), "x", Utc::now(), "a9")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn search_filters_and_orders() {
        let store = seeded().await;
        for (id, name, port) in [("svc-2", "Billing", 9000), ("svc-3", "Mail", 7000)] {
            store
                .create_entity(
                    id,
                    "Service",
                    props(json!({"name": name, "status": "active", "port": port})),
                    "alice",
                    Utc::now(),
                    id,
                )
                .await
                .unwrap();
        }

        let active = store
            .search(
                "Service",
                &[SearchFilter::new("status", super::super::FilterOp::Eq, "active")],
                0,
                None,
            )
            .await
            .unwrap();
        assert_eq!(active.len(), 3);

        let by_port = store
            .search(
                "Service",
                &[SearchFilter::new("port", super::super::FilterOp::Gt, 0)],
                1,
                Some(&OrderBy {
                    property: "port".to_string(),
                    descending: true,
                }),
            )
            .await
            .unwrap();
        assert_eq!(by_port.len(), 1);
        assert_eq!(by_port[0].1.props["name"], json!("Billing"));
    }

    #[tokio::test]
    async fn changes_since_filters_and_orders() {
        let store = seeded().await;
        let cutoff = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .update_entity("svc-1", props(json!({"name": "Auth2"})), "bob", Utc::now(), "a2", None)
            .await
            .unwrap();

        let changes = store.changes_since(cutoff, None, None, 10).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].last_action, AuditAction::Update);
        assert_eq!(changes[0].entry_count, 1);

        let none = store
            .changes_since(cutoff, None, Some(&["carol".to_string()]), 10)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn snapshot_includes_states_and_edges_at_t() {
        let store = seeded().await;
        store
            .create_entity("db-1", "Service", props(json!({"name": "DB"})), "alice", Utc::now(), "a2")
            .await
            .unwrap();
        store
            .create_relationship("svc-1", "db-1", "DEPENDS_ON", PropMap::new(), "alice", Utc::now(), "a3")
            .await
            .unwrap();
        let t = Utc::now();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store
            .close_relationship("svc-1", "db-1", "DEPENDS_ON", "alice", Utc::now(), "a4")
            .await
            .unwrap();

        let snapshot = store.snapshot_at(t, None).await.unwrap();
        assert_eq!(snapshot.entities.len(), 2);
        assert_eq!(snapshot.relationships.len(), 1);

        let after = store.snapshot_at(Utc::now(), None).await.unwrap();
        assert!(after.relationships.is_empty());
    }

    #[tokio::test]
    async fn unique_constraint_rejects_duplicates() {
        let store = seeded().await;
        store
            .ensure_constraints(&[ConstraintDef {
                label: "Service".to_string(),
                property: "name".to_string(),
                kind: ConstraintKind::Unique,
            }])
            .await
            .unwrap();

        let err = store
            .create_entity(
                "svc-2",
                "Service",
                props(json!({"name": "Auth"})),
                "bob",
                Utc::now(),
                "a2",
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unique constraint"));

        // A different value is fine, and the slot frees on delete.
        store
            .create_entity("svc-3", "Service", props(json!({"name": "Mail"})), "bob", Utc::now(), "a3")
            .await
            .unwrap();
        store
            .soft_delete_entity("svc-1", "bob", Utc::now(), "a4")
            .await
            .unwrap();
        store
            .create_entity("svc-4", "Service", props(json!({"name": "Auth"})), "bob", Utc::now(), "a5")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn wal_round_trip_restores_graph() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = MemoryStore::open(dir.path()).await.unwrap();
            store
                .create_entity(
                    "svc-1",
                    "Service",
                    props(json!({"name": "Auth"})),
                    "alice",
                    Utc::now(),
                    "a1",
                )
                .await
                .unwrap();
            store
                .update_entity("svc-1", props(json!({"name": "Auth2"})), "bob", Utc::now(), "a2", None)
                .await
                .unwrap();
            store
                .create_entity("db-1", "Service", props(json!({"name": "DB"})), "alice", Utc::now(), "a3")
                .await
                .unwrap();
            store
                .create_relationship("svc-1", "db-1", "DEPENDS_ON", PropMap::new(), "alice", Utc::now(), "a4")
                .await
                .unwrap();
        }

        let reopened = MemoryStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.entity_count(), 2);
        let (_, head) = reopened.get_current("svc-1").await.unwrap().unwrap();
        assert_eq!(head.version, 2);
        assert_eq!(head.props["name"], json!("Auth2"));
        assert_eq!(reopened.get_history("svc-1").await.unwrap().len(), 2);
        assert_eq!(reopened.get_relationships("db-1").await.unwrap().len(), 1);
        assert_eq!(reopened.get_audit("svc-1").await.unwrap().len(), 2);
    }
}
