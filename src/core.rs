//! The assembled graph: registry, store, pipeline, reader, and the
//! engines built on them.
//!
//! `Mnemograph` wires the components together from a configuration and is
//! the entry point for the CLI and for embedding. It is cheap to clone
//! and safe to share across tasks.
//!
//! # Example
//!
//! ```ignore
//! use mnemograph::{Mnemograph, config::MnemoConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MnemoConfig::load(Path::new("mnemo.yaml"))?;
//!     let graph = Mnemograph::from_config(&config).await?;
//!
//!     let result = graph
//!         .pipeline()
//!         .upsert("Service", None, &props, "alice")
//!         .await?;
//!     println!("created {} at v{}", result.id, result.version);
//!     Ok(())
//! }
//! ```

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::config::MnemoConfig;
use crate::error::GraphResult;
use crate::mutation::MutationPipeline;
use crate::reader::TemporalReader;
use crate::reconcile::{ConflictStrategy, SyncEngine, SyncResult};
use crate::scan::{ScanOptions, ScanResult, Scanner};
use crate::schema::{SchemaDef, SchemaRegistry};
use crate::store::{MemoryStore, TemporalStore};

/// One fully wired graph instance.
#[derive(Clone)]
pub struct Mnemograph {
    registry: SchemaRegistry,
    store: Arc<dyn TemporalStore>,
    pipeline: MutationPipeline,
    reader: TemporalReader,
}

impl Mnemograph {
    /// Compile the schema and open the store described by the config.
    pub async fn from_config(config: &MnemoConfig) -> GraphResult<Self> {
        match &config.storage.path {
            Some(path) => Self::open(&config.schema, path).await,
            None => Self::in_memory(&config.schema).await,
        }
    }

    /// A volatile instance, schema-compiled and constraint-installed.
    pub async fn in_memory(schema: &SchemaDef) -> GraphResult<Self> {
        let registry = SchemaRegistry::compile(schema)?;
        let store: Arc<dyn TemporalStore> = Arc::new(MemoryStore::in_memory());
        Self::assemble(registry, store).await
    }

    /// A persistent instance backed by the WAL under `path`.
    pub async fn open(schema: &SchemaDef, path: &Path) -> GraphResult<Self> {
        let registry = SchemaRegistry::compile(schema)?;
        let store: Arc<dyn TemporalStore> = Arc::new(MemoryStore::open(path).await?);
        Self::assemble(registry, store).await
    }

    async fn assemble(
        registry: SchemaRegistry,
        store: Arc<dyn TemporalStore>,
    ) -> GraphResult<Self> {
        store.ensure_constraints(&registry.constraints()).await?;
        info!(labels = registry.labels().len(), "graph assembled");
        Ok(Self {
            pipeline: MutationPipeline::new(registry.clone(), store.clone()),
            reader: TemporalReader::new(store.clone()),
            registry,
            store,
        })
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn TemporalStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &MutationPipeline {
        &self.pipeline
    }

    pub fn reader(&self) -> &TemporalReader {
        &self.reader
    }

    /// Reconcile the graph with a document tree.
    pub async fn sync(
        &self,
        docs_dir: &Path,
        format: &str,
        strategy: ConflictStrategy,
        actor: &str,
        labels: Option<&[String]>,
    ) -> GraphResult<SyncResult> {
        SyncEngine::new(self.pipeline.clone(), self.reader.clone())
            .sync(docs_dir, format, strategy, actor, labels)
            .await
    }

    /// Scan a codebase into the graph.
    pub async fn scan(
        &self,
        target: &str,
        options: &ScanOptions,
        actor: &str,
    ) -> GraphResult<ScanResult> {
        Scanner::new(self.pipeline.clone())
            .scan(target, options, actor)
            .await
    }
}
