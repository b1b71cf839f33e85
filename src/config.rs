//! Declarative configuration.
//!
//! One file supplies the schema, the storage location, the document
//! projection, the sync strategy, and the scanner setup. YAML and JSON
//! are both accepted, decided by extension.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{GraphError, GraphResult};
use crate::reconcile::ConflictStrategy;
use crate::scan::{Language, MappingRule, RemoteOptions, ScanOptions};
use crate::schema::SchemaDef;

/// Where the graph persists.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    /// Store directory; absent means in-memory only
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Document projection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocsConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Base format name (also the fallback adapter)
    #[serde(default = "default_format")]
    pub format: String,
    /// Framework adapter overriding the base format
    #[serde(default)]
    pub framework: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("docs/graph")
}

fn default_format() -> String {
    "markdown".to_string()
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            format: default_format(),
            framework: None,
        }
    }
}

impl DocsConfig {
    /// The adapter name to resolve: framework wins over format.
    pub fn adapter_name(&self) -> &str {
        self.framework.as_deref().unwrap_or(&self.format)
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    #[serde(default = "default_strategy")]
    pub conflict_strategy: ConflictStrategy,
}

fn default_strategy() -> ConflictStrategy {
    ConflictStrategy::GraphWins
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_strategy: default_strategy(),
        }
    }
}

/// Scanner settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanConfig {
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub languages: Option<Vec<Language>>,
    #[serde(default)]
    pub mappings: Vec<MappingRule>,
    #[serde(default)]
    pub remote: Option<RemoteOptions>,
}

impl ScanConfig {
    pub fn to_options(&self, dry_run: bool) -> ScanOptions {
        ScanOptions {
            include: self.include.clone(),
            exclude: self.exclude.clone(),
            languages: self.languages.clone(),
            mappings: self.mappings.clone(),
            dry_run,
            remote: self.remote.clone().unwrap_or_default(),
        }
    }
}

/// The whole configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MnemoConfig {
    pub schema: SchemaDef,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub docs: DocsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub scan: ScanConfig,
}

impl MnemoConfig {
    /// Load from a YAML or JSON file, decided by extension.
    pub fn load(path: &Path) -> GraphResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| GraphError::Config(format!("read {}: {e}", path.display())))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&raw)?,
            _ => serde_yaml::from_str(&raw)
                .map_err(|e| GraphError::Config(format!("{}: {e}", path.display())))?,
        };
        Ok(config)
    }
}
