/// Common types used throughout mnemograph.
///
/// This module defines the core data model: entities as a stable identity
/// layer, versioned states hanging off them, an append-only audit log, and
/// typed temporal relationships. These types are simple, serializable, and
/// carry no in-memory back-pointers; the CURRENT/PREVIOUS chain lives in the
/// store and is traversed by queries.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// User property map. Insertion order is preserved so that rendered
/// documents and audit deltas keep the author's key order.
pub type PropMap = serde_json::Map<String, JsonValue>;

/// Relationship types reserved for the store's own structure.
///
/// User edge types must not collide with these; the schema registry
/// rejects them at compile time.
pub const RESERVED_EDGE_TYPES: [&str; 3] = ["CURRENT", "PREVIOUS", "AUDITED"];

/// An entity: immutable identity with a versioned state chain.
///
/// Entities are created on first upsert of an id and never destroyed, only
/// soft-deleted. All user-visible data lives on the entity's states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Globally unique, stable identifier
    pub id: String,
    /// Schema node label
    pub label: String,
    /// When the entity was first created
    pub created_at: DateTime<Utc>,
    /// Soft-delete time, if deleted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Who deleted it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_by: Option<String>,
}

impl Entity {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// One immutable snapshot of an entity's user properties.
///
/// States form a dense version chain starting at 1. Exactly one state per
/// live entity has `valid_to = None` (the head); a deleted entity's latest
/// state is closed at the delete time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    /// Back-reference to the owning entity
    pub entity_id: String,
    /// Monotonic version, starting at 1
    pub version: u64,
    /// Start of this state's validity interval
    pub valid_from: DateTime<Utc>,
    /// End of validity; `None` marks the head state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Transaction time: when the state was written
    pub recorded_at: DateTime<Utc>,
    /// Who wrote it
    pub actor: String,
    /// User-defined properties (schema-validated on ingress)
    pub props: PropMap,
}

impl EntityState {
    /// Whether this state covers the given instant.
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_to.map_or(true, |end| t < end)
    }

    /// Whether this is the head state.
    pub fn is_head(&self) -> bool {
        self.valid_to.is_none()
    }
}

/// Actions recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Relate,
    Unrelate,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Relate => "relate",
            Self::Unrelate => "unrelate",
        };
        write!(f, "{s}")
    }
}

/// Append-only record of a single mutation.
///
/// Created in the same transaction as the mutation it records; never
/// updated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id of this entry
    pub id: String,
    /// Entity the mutation applied to
    pub entity_id: String,
    /// The entity's label at mutation time
    pub entity_label: String,
    /// What happened
    pub action: AuditAction,
    /// Who did it
    pub actor: String,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Serialized property deltas, when the mutation carries them
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changes: Option<String>,
}

/// A typed, directional, temporal edge between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Schema-declared relationship type
    pub rel_type: String,
    /// Source entity id
    pub from_id: String,
    /// Target entity id
    pub to_id: String,
    /// Start of validity
    pub valid_from: DateTime<Utc>,
    /// End of validity; `None` marks an active edge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Who created the edge
    pub actor: String,
    /// Optional user properties
    #[serde(default, skip_serializing_if = "PropMap::is_empty")]
    pub props: PropMap,
}

impl Relationship {
    pub fn is_active(&self) -> bool {
        self.valid_to.is_none()
    }

    /// Whether this edge covers the given instant.
    pub fn covers(&self, t: DateTime<Utc>) -> bool {
        self.valid_from <= t && self.valid_to.map_or(true, |end| t < end)
    }
}

/// Direction of an edge relative to the queried entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirection {
    Outgoing,
    Incoming,
}

/// A relationship tagged with its direction relative to a query root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectedRelationship {
    pub direction: RelationshipDirection,
    #[serde(flatten)]
    pub relationship: Relationship,
}

/// Result of an upsert: the id written, the version produced, and whether
/// the entity was created on this call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertResult {
    pub id: String,
    pub version: u64,
    pub created: bool,
}

/// Summary row from `changes_since`: an entity plus its most recent
/// audit activity after the cutoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub entity_id: String,
    pub label: String,
    pub last_action: AuditAction,
    pub last_actor: String,
    pub last_timestamp: DateTime<Utc>,
    /// Number of audit entries after the cutoff
    pub entry_count: usize,
}

/// A full point-in-time snapshot: every matching entity's state at `t`
/// plus every edge active at `t`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub at: DateTime<Utc>,
    pub entities: Vec<(Entity, EntityState)>,
    pub relationships: Vec<Relationship>,
}
