//! Temporal reader: the query surface over the store.
//!
//! A thin projection that adds the derived operations (structural diffs
//! between states, per-entity changelogs) on top of the store's temporal
//! reads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

use crate::error::{GraphError, GraphResult};
use crate::store::{OrderBy, SearchFilter, TemporalStore};
use crate::types::{
    AuditEntry, ChangeSummary, DirectedRelationship, Entity, EntityState, GraphSnapshot,
};

/// One property delta. An absent side marks an add or a remove.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyChange {
    pub property: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<JsonValue>,
}

/// Set difference between two states' user properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub entity_id: String,
    pub from_version: u64,
    pub to_version: u64,
    pub changes: Vec<PropertyChange>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compare two states' user properties with deep structural equality.
///
/// Keys beginning with `_` are temporal metadata and never diffed.
pub fn diff_states(old: &EntityState, new: &EntityState) -> StateDiff {
    let mut changes = Vec::new();
    for (key, old_value) in &old.props {
        if key.starts_with('_') {
            continue;
        }
        match new.props.get(key) {
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => changes.push(PropertyChange {
                property: key.clone(),
                old: Some(old_value.clone()),
                new: Some(new_value.clone()),
            }),
            None => changes.push(PropertyChange {
                property: key.clone(),
                old: Some(old_value.clone()),
                new: None,
            }),
        }
    }
    for (key, new_value) in &new.props {
        if key.starts_with('_') || old.props.contains_key(key) {
            continue;
        }
        changes.push(PropertyChange {
            property: key.clone(),
            old: None,
            new: Some(new_value.clone()),
        });
    }
    StateDiff {
        entity_id: new.entity_id.clone(),
        from_version: old.version,
        to_version: new.version,
        changes,
    }
}

/// Read-only access to the graph, shared freely across tasks.
#[derive(Clone)]
pub struct TemporalReader {
    store: Arc<dyn TemporalStore>,
}

impl TemporalReader {
    pub fn new(store: Arc<dyn TemporalStore>) -> Self {
        Self { store }
    }

    /// Current entity + head state; `None` when absent or deleted.
    pub async fn get_current(&self, id: &str) -> GraphResult<Option<(Entity, EntityState)>> {
        self.store.get_current(id).await
    }

    /// The state valid at `t`, walking the version chain.
    pub async fn get_at_time(
        &self,
        id: &str,
        t: DateTime<Utc>,
    ) -> GraphResult<Option<(Entity, EntityState)>> {
        self.store.get_at_time(id, t).await
    }

    /// All states, newest first.
    pub async fn history(&self, id: &str) -> GraphResult<Vec<EntityState>> {
        self.store.get_history(id).await
    }

    pub async fn query_by_label(&self, label: &str) -> GraphResult<Vec<(Entity, EntityState)>> {
        self.store.query_by_label(label).await
    }

    pub async fn relationships(&self, id: &str) -> GraphResult<Vec<DirectedRelationship>> {
        self.store.get_relationships(id).await
    }

    pub async fn audit(&self, id: &str) -> GraphResult<Vec<AuditEntry>> {
        self.store.get_audit(id).await
    }

    pub async fn changes_since(
        &self,
        t: DateTime<Utc>,
        labels: Option<&[String]>,
        actors: Option<&[String]>,
        limit: usize,
    ) -> GraphResult<Vec<ChangeSummary>> {
        self.store.changes_since(t, labels, actors, limit).await
    }

    pub async fn search(
        &self,
        label: &str,
        filters: &[SearchFilter],
        limit: usize,
        order_by: Option<&OrderBy>,
    ) -> GraphResult<Vec<(Entity, EntityState)>> {
        self.store.search(label, filters, limit, order_by).await
    }

    pub async fn snapshot_at(
        &self,
        t: DateTime<Utc>,
        labels: Option<&[String]>,
    ) -> GraphResult<GraphSnapshot> {
        self.store.snapshot_at(t, labels).await
    }

    /// Diff two specific versions of one entity.
    pub async fn diff(
        &self,
        id: &str,
        from_version: u64,
        to_version: u64,
    ) -> GraphResult<StateDiff> {
        let history = self.store.get_history(id).await?;
        if history.is_empty() {
            return Err(GraphError::NotFound(id.to_string()));
        }
        let find = |version: u64| {
            history
                .iter()
                .find(|s| s.version == version)
                .ok_or_else(|| GraphError::NotFound(format!("{id}@v{version}")))
        };
        Ok(diff_states(find(from_version)?, find(to_version)?))
    }

    /// The entity's full change history: ascending pairwise diffs between
    /// adjacent versions.
    pub async fn changelog(&self, id: &str) -> GraphResult<Vec<StateDiff>> {
        let mut history = self.store.get_history(id).await?;
        if history.is_empty() {
            return Err(GraphError::NotFound(id.to_string()));
        }
        history.sort_by_key(|s| s.version);
        Ok(history
            .windows(2)
            .map(|pair| diff_states(&pair[0], &pair[1]))
            .collect())
    }
}
