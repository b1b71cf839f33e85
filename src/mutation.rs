//! Mutation pipeline: validate → version → audit.
//!
//! Every write enters the graph through this module. The pipeline looks up
//! the compiled validator, normalizes the properties, and forwards to the
//! store's transactional primitives. Nothing unvalidated ever reaches the
//! store.

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{GraphError, GraphResult};
use crate::schema::SchemaRegistry;
use crate::store::{MemoryStore, TemporalStore};
use crate::types::{PropMap, UpsertResult};

/// Attempts for the create/update race before giving up.
const UPSERT_RETRIES: usize = 3;

/// Outcome of a batch upsert: results and errors keep the input order by
/// index.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub results: Vec<UpsertResult>,
    pub errors: Vec<(usize, GraphError)>,
}

/// The write path shared by agents, the reconciliation engine, and the
/// scanner.
#[derive(Clone)]
pub struct MutationPipeline {
    registry: SchemaRegistry,
    store: Arc<dyn TemporalStore>,
}

impl MutationPipeline {
    pub fn new(registry: SchemaRegistry, store: Arc<dyn TemporalStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TemporalStore> {
        &self.store
    }

    /// Validate and write one entity. With no id, a fresh opaque id is
    /// generated; with an id, the entity is created or updated depending on
    /// whether a current head exists.
    ///
    /// Concurrent upserts of the same id are linearized by the store; the
    /// loser of a create race retries as an update (bounded).
    pub async fn upsert(
        &self,
        label: &str,
        id: Option<&str>,
        props: &PropMap,
        actor: &str,
    ) -> GraphResult<UpsertResult> {
        let validator = self.registry.node_validator(label)?;
        let normalized = validator.validate(props)?;
        let id = match id {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().to_string(),
        };

        let mut last_err = None;
        for _ in 0..UPSERT_RETRIES {
            let now = Utc::now();
            let audit_id = Uuid::new_v4().to_string();
            match self.store.get_current(&id).await? {
                None => {
                    match self
                        .store
                        .create_entity(&id, label, normalized.clone(), actor, now, &audit_id)
                        .await
                    {
                        Ok(state) => {
                            return Ok(UpsertResult {
                                id,
                                version: state.version,
                                created: true,
                            })
                        }
                        Err(e) if crate::store::is_write_conflict(&e) => {
                            debug!(entity = %id, "create lost the race, retrying as update");
                            last_err = Some(e);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Some((entity, head)) => {
                    if entity.label != label {
                        return Err(GraphError::validation(
                            label,
                            "label",
                            format!(
                                "entity '{id}' already exists with label '{}'",
                                entity.label
                            ),
                        ));
                    }
                    let changes = serialize_changes(&head.props, &normalized);
                    match self
                        .store
                        .update_entity(&id, normalized.clone(), actor, now, &audit_id, changes)
                        .await
                    {
                        Ok(state) => {
                            return Ok(UpsertResult {
                                id,
                                version: state.version,
                                created: false,
                            })
                        }
                        Err(GraphError::NotFound(_)) => {
                            debug!(entity = %id, "head vanished mid-upsert, retrying");
                            last_err = Some(GraphError::NotFound(id.clone()));
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            GraphError::Storage(format!("upsert of '{id}' exhausted retries"))
        }))
    }

    /// Validate every member first, then commit each in its own
    /// transaction. Individual failures accumulate; the batch never aborts.
    pub async fn upsert_many(
        &self,
        label: &str,
        items: &[(Option<String>, PropMap)],
        actor: &str,
    ) -> GraphResult<BatchResult> {
        let validator = self.registry.node_validator(label)?;
        let mut validated = Vec::with_capacity(items.len());
        let mut out = BatchResult::default();
        for (i, (id, props)) in items.iter().enumerate() {
            match validator.validate(props) {
                Ok(normalized) => validated.push((i, id.clone(), normalized)),
                Err(e) => out.errors.push((i, e)),
            }
        }
        for (i, id, normalized) in validated {
            match self.upsert(label, id.as_deref(), &normalized, actor).await {
                Ok(result) => out.results.push(result),
                Err(e) => {
                    warn!(index = i, error = %e, "batch member failed");
                    out.errors.push((i, e));
                }
            }
        }
        Ok(out)
    }

    /// Soft-delete. Idempotent when already deleted.
    pub async fn delete(&self, id: &str, actor: &str) -> GraphResult<()> {
        let audit_id = Uuid::new_v4().to_string();
        self.store
            .soft_delete_entity(id, actor, Utc::now(), &audit_id)
            .await
    }

    /// Create a typed edge after validating its properties against the
    /// `(from_label, type, to_label)` edge validator.
    #[allow(clippy::too_many_arguments)]
    pub async fn relate(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        from_label: &str,
        to_label: &str,
        props: Option<&PropMap>,
        actor: &str,
    ) -> GraphResult<()> {
        let validator = self.registry.edge_validator(from_label, rel_type, to_label)?;
        let empty = PropMap::new();
        let normalized = validator.validate(props.unwrap_or(&empty))?;
        let audit_id = Uuid::new_v4().to_string();
        self.store
            .create_relationship(from_id, to_id, rel_type, normalized, actor, Utc::now(), &audit_id)
            .await?;
        Ok(())
    }

    /// Close the active edge; silently tolerated when none is active.
    pub async fn unrelate(
        &self,
        from_id: &str,
        to_id: &str,
        rel_type: &str,
        actor: &str,
    ) -> GraphResult<()> {
        let audit_id = Uuid::new_v4().to_string();
        let closed = self
            .store
            .close_relationship(from_id, to_id, rel_type, actor, Utc::now(), &audit_id)
            .await?;
        if !closed {
            debug!(from = from_id, to = to_id, rel_type, "unrelate found nothing active");
        }
        Ok(())
    }
}

/// Convenience constructor for an in-memory pipeline; the usual entry
/// point in tests.
pub fn in_memory_pipeline(registry: SchemaRegistry) -> MutationPipeline {
    MutationPipeline::new(registry, Arc::new(MemoryStore::in_memory()))
}

/// Serialize property deltas for the audit log: `{key: [old, new]}` with
/// `null` standing in for an absent side.
fn serialize_changes(old: &PropMap, new: &PropMap) -> Option<String> {
    let mut delta = serde_json::Map::new();
    for (key, old_value) in old {
        match new.get(key) {
            Some(new_value) if new_value == old_value => {}
            other => {
                delta.insert(
                    key.clone(),
                    JsonValue::Array(vec![
                        old_value.clone(),
                        other.cloned().unwrap_or(JsonValue::Null),
                    ]),
                );
            }
        }
    }
    for (key, new_value) in new {
        if !old.contains_key(key) {
            delta.insert(
                key.clone(),
                JsonValue::Array(vec![JsonValue::Null, new_value.clone()]),
            );
        }
    }
    if delta.is_empty() {
        None
    } else {
        serde_json::to_string(&delta).ok()
    }
}
