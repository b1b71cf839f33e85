//! Temporal store: the only process → backend boundary.
//!
//! [`TemporalStore`] is the contract the rest of the crate programs
//! against. Every mutation primitive is a single transaction: it either
//! fully applies (state + chain links + audit entry) or fully aborts, and
//! per-entity mutations are linearizable. Readers hold no locks beyond
//! their own call.
//!
//! [`MemoryStore`](memory::MemoryStore) is the embedded implementation:
//! a labeled property graph held in concurrent maps, optionally persisted
//! through a write-ahead log.

mod memory;
mod wal;

pub use memory::MemoryStore;
pub(crate) use memory::is_write_conflict;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::cmp::Ordering;

use crate::error::GraphResult;
use crate::schema::ConstraintDef;
use crate::types::{
    AuditEntry, ChangeSummary, DirectedRelationship, Entity, EntityState, GraphSnapshot, PropMap,
    Relationship,
};

/// One conjunctive predicate for [`TemporalStore::search`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchFilter {
    pub property: String,
    pub op: FilterOp,
    pub value: JsonValue,
}

impl SearchFilter {
    pub fn new(property: impl Into<String>, op: FilterOp, value: impl Into<JsonValue>) -> Self {
        Self {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    /// Evaluate against a state's property map.
    pub fn matches(&self, props: &PropMap) -> bool {
        let actual = props.get(&self.property);
        match self.op {
            FilterOp::Eq => actual.is_some_and(|v| v == &self.value),
            FilterOp::Contains => actual.is_some_and(|v| json_contains(v, &self.value)),
            FilterOp::Gt => cmp_is(actual, &self.value, Ordering::Greater),
            FilterOp::Lt => cmp_is(actual, &self.value, Ordering::Less),
            FilterOp::Gte => {
                cmp_is(actual, &self.value, Ordering::Greater)
                    || cmp_is(actual, &self.value, Ordering::Equal)
            }
            FilterOp::Lte => {
                cmp_is(actual, &self.value, Ordering::Less)
                    || cmp_is(actual, &self.value, Ordering::Equal)
            }
            FilterOp::In => self
                .value
                .as_array()
                .is_some_and(|candidates| actual.is_some_and(|v| candidates.contains(v))),
        }
    }
}

/// Comparison operators supported by `search`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOp {
    Eq,
    Contains,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
}

/// Sort directive for `search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBy {
    pub property: String,
    #[serde(default)]
    pub descending: bool,
}

fn cmp_is(actual: Option<&JsonValue>, expected: &JsonValue, ordering: Ordering) -> bool {
    actual.is_some_and(|v| compare_json(v, expected) == Some(ordering))
}

/// Order two JSON values when they are comparable (both numbers or both
/// strings).
pub(crate) fn compare_json(a: &JsonValue, b: &JsonValue) -> Option<Ordering> {
    match (a, b) {
        (JsonValue::Number(x), JsonValue::Number(y)) => {
            x.as_f64().partial_cmp(&y.as_f64())
        }
        (JsonValue::String(x), JsonValue::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Substring match for strings, element match for lists.
fn json_contains(haystack: &JsonValue, needle: &JsonValue) -> bool {
    match haystack {
        JsonValue::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        JsonValue::Array(items) => items.contains(needle),
        _ => false,
    }
}

/// The labeled-property-graph backend contract.
///
/// Labels and relationship types passed to these operations must already
/// satisfy the identifier discipline (`[A-Za-z_][A-Za-z0-9_]*`); property
/// values are always carried as data, never interpolated.
#[async_trait]
pub trait TemporalStore: Send + Sync {
    /// Create an Entity and its first State (`version = 1`), link CURRENT,
    /// append the create audit entry. Fails with a write conflict if the
    /// id already exists.
    async fn create_entity(
        &self,
        id: &str,
        label: &str,
        props: PropMap,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<EntityState>;

    /// Close the head state at `now`, append a new head with the next
    /// version, link PREVIOUS, append the update audit entry.
    async fn update_entity(
        &self,
        id: &str,
        props: PropMap,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
        changes: Option<String>,
    ) -> GraphResult<EntityState>;

    /// Close the head state and mark the entity deleted. Idempotent.
    async fn soft_delete_entity(
        &self,
        id: &str,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<()>;

    /// Create a typed active edge. The embedded store installs the
    /// at-most-one-active-edge constraint per ordered (from, type, to)
    /// unconditionally.
    async fn create_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        props: PropMap,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<Relationship>;

    /// Close the unique active edge of this type between the pair.
    /// Returns `false` when none is active.
    async fn close_relationship(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        actor: &str,
        now: DateTime<Utc>,
        audit_id: &str,
    ) -> GraphResult<bool>;

    /// Current entity + head state; `None` if absent or soft-deleted.
    async fn get_current(&self, id: &str) -> GraphResult<Option<(Entity, EntityState)>>;

    /// The state whose validity interval covers `t`, if any.
    async fn get_at_time(
        &self,
        id: &str,
        t: DateTime<Utc>,
    ) -> GraphResult<Option<(Entity, EntityState)>>;

    /// All states, descending by version. Empty when the entity is unknown.
    async fn get_history(&self, id: &str) -> GraphResult<Vec<EntityState>>;

    /// All non-deleted entities of a label with their head states.
    async fn query_by_label(&self, label: &str) -> GraphResult<Vec<(Entity, EntityState)>>;

    /// Active edges touching the entity, direction-tagged. Reserved
    /// structural edges are never reported.
    async fn get_relationships(&self, id: &str) -> GraphResult<Vec<DirectedRelationship>>;

    /// The entity's audit log, ascending by timestamp.
    async fn get_audit(&self, id: &str) -> GraphResult<Vec<AuditEntry>>;

    /// Entities with audit activity after `t`, most recent first.
    async fn changes_since(
        &self,
        t: DateTime<Utc>,
        labels: Option<&[String]>,
        actors: Option<&[String]>,
        limit: usize,
    ) -> GraphResult<Vec<ChangeSummary>>;

    /// Conjunctive filter over current-head states of a label.
    async fn search(
        &self,
        label: &str,
        filters: &[SearchFilter],
        limit: usize,
        order_by: Option<&OrderBy>,
    ) -> GraphResult<Vec<(Entity, EntityState)>>;

    /// Every matching entity's state at `t` plus every edge active at `t`.
    async fn snapshot_at(
        &self,
        t: DateTime<Utc>,
        labels: Option<&[String]>,
    ) -> GraphResult<GraphSnapshot>;

    /// Install storage-level constraints and indexes.
    async fn ensure_constraints(&self, constraints: &[ConstraintDef]) -> GraphResult<()>;
}
