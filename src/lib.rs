//! # mnemograph - a schema-enforced bitemporal memory graph
//!
//! Shared, versioned working memory for multiple concurrent agents.
//! Agents and humans read and write typed entities and relationships;
//! every mutation is schema-validated, versioned with a full predecessor
//! chain, and recorded in an audit log. A reconciliation engine keeps the
//! graph in two-way agreement with a directory of human-readable
//! documents, and a codebase scanner populates the graph from source
//! trees.
//!
//! ## Quick start
//!
//! ```ignore
//! use mnemograph::{Mnemograph, schema::SchemaDef};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let schema: SchemaDef = serde_yaml::from_str(SCHEMA_YAML)?;
//!     let graph = Mnemograph::in_memory(&schema).await?;
//!
//!     // Write through the validating pipeline
//!     let result = graph
//!         .pipeline()
//!         .upsert("Service", None, &props(json!({"name": "Auth"})), "alice")
//!         .await?;
//!
//!     // Read current state, history, or any point in time
//!     let current = graph.reader().get_current(&result.id).await?;
//!     let history = graph.reader().history(&result.id).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The crate is layered leaves-first:
//!
//! 1. **Schema registry** ([`schema`]) - compiles the declarative schema
//!    into per-label validators once, at startup.
//! 2. **Temporal store** ([`store`]) - the only process → backend
//!    boundary; entity/state/audit records with atomic mutation
//!    primitives and temporal reads, embedded with WAL persistence.
//! 3. **Mutation pipeline** ([`mutation`]) - validate → version → audit.
//! 4. **Temporal reader** ([`reader`]) - point-in-time reads, diffs,
//!    changelogs.
//! 5. **Document projection** ([`docs`]) - hash-stamped rendering to a
//!    file tree and parsing back.
//! 6. **Reconciliation** ([`reconcile`]) - two-way graph ↔ docs sync
//!    with pluggable conflict strategies.
//! 7. **Scanner** ([`scan`]) - incremental, content-addressed codebase
//!    ingestion.
//!
//! ## Thread safety
//!
//! Every handle is cheaply cloneable and shareable across tasks. For a
//! single entity, concurrent upserts are linearizable: version numbers
//! stay dense and the audit log matches their order.

mod core;
mod error;
mod mutation;
mod reader;
mod reconcile;
mod types;

pub mod config;
pub mod docs;
pub mod scan;
pub mod schema;
pub mod store;

// Public API exports
pub use crate::core::Mnemograph;
pub use error::{GraphError, GraphResult, ValidationIssue};
pub use mutation::{BatchResult, MutationPipeline};
pub use reader::{diff_states, PropertyChange, StateDiff, TemporalReader};
pub use reconcile::{ConflictRecord, ConflictStrategy, SyncEngine, SyncError, SyncResult};
pub use types::{
    AuditAction, AuditEntry, ChangeSummary, DirectedRelationship, Entity, EntityState,
    GraphSnapshot, PropMap, Relationship, RelationshipDirection, UpsertResult,
    RESERVED_EDGE_TYPES,
};

// Re-export commonly used external types for convenience
pub use chrono::{DateTime, Utc};
pub use serde_json::{json, Value as JsonValue};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::MnemoConfig;
    pub use crate::docs::{compute_sync_hash, DocumentProjector, FormatAdapter};
    pub use crate::error::{GraphError, GraphResult};
    pub use crate::reconcile::{ConflictStrategy, SyncResult};
    pub use crate::scan::{ScanOptions, ScanResult, Scanner};
    pub use crate::schema::{SchemaDef, SchemaRegistry};
    pub use crate::store::{FilterOp, OrderBy, SearchFilter, TemporalStore};
    pub use crate::types::{Entity, EntityState, PropMap, UpsertResult};
    pub use crate::Mnemograph;
    pub use chrono::{DateTime, Utc};
    pub use serde_json::{json, Value as JsonValue};
}

/// Initialize the logging system.
///
/// Call once at application startup; the library itself never installs a
/// subscriber. The log level is controlled by the `MNEMO_LOG` environment
/// variable (`error`, `warn`, `info`, `debug`, `trace`).
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("MNEMO_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
