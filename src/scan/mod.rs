//! Codebase scanner: discover → fingerprint → parse → map → ingest.
//!
//! The scanner turns a filesystem root (or a freshly shallow-cloned
//! remote repository) into schema-labeled entities and relationships.
//! Re-scans are incremental: only files whose content digest changed
//! since the previous fingerprint store are parsed again.

pub mod discover;
pub mod fingerprint;
pub mod ingest;
pub mod map;
pub mod parsers;

pub use discover::{default_includes, detect_language, DiscoveredFile};
pub use fingerprint::{FileFingerprint, FingerprintStore};
pub use ingest::{entity_id, IngestStats};
pub use map::{default_mappings, MapOutcome, MappedEntity, MappingRule, PropertyMapping};
pub use parsers::{
    ArtifactKind, ArtifactRef, Language, LanguageParser, ParserRegistry, RawArtifact, RefKind,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{GraphError, GraphResult};
use crate::mutation::MutationPipeline;

/// Wall-clock bound on a shallow clone.
const CLONE_TIMEOUT: Duration = Duration::from_secs(120);

/// Shallow-clone parameters for remote targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOptions {
    #[serde(default = "default_depth")]
    pub depth: u32,
    #[serde(default)]
    pub branch: Option<String>,
}

fn default_depth() -> u32 {
    1
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            branch: None,
        }
    }
}

/// Scanner configuration for one run.
#[derive(Clone, Default)]
pub struct ScanOptions {
    /// Include globs; empty means the default source + manifest set
    pub include: Vec<String>,
    /// User excludes, on top of the unconditional vendored set
    pub exclude: Vec<String>,
    /// Restrict parsing to these languages
    pub languages: Option<Vec<Language>>,
    /// Mapping rules; empty means the identity defaults
    pub mappings: Vec<MappingRule>,
    /// Analyze without writing to the graph or the fingerprint store
    pub dry_run: bool,
    pub remote: RemoteOptions,
}

/// Counters and failures from one scan.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanResult {
    pub files_discovered: usize,
    pub files_parsed: usize,
    pub files_removed: usize,
    pub artifacts: usize,
    pub entities_upserted: usize,
    pub entities_skipped: usize,
    pub entities_unmapped: usize,
    pub relationships_created: usize,
    pub errors: Vec<String>,
    pub dry_run: bool,
}

/// The scan pipeline.
pub struct Scanner {
    pipeline: MutationPipeline,
    parsers: ParserRegistry,
}

impl Scanner {
    pub fn new(pipeline: MutationPipeline) -> Self {
        Self {
            pipeline,
            parsers: ParserRegistry::builtin(),
        }
    }

    /// Register an extra parser; it overrides built-ins on its languages.
    pub fn with_parser(mut self, parser: Arc<dyn LanguageParser>) -> Self {
        self.parsers.register(parser);
        self
    }

    /// Scan a local path or a remote repository URL.
    pub async fn scan(
        &self,
        target: &str,
        options: &ScanOptions,
        actor: &str,
    ) -> GraphResult<ScanResult> {
        if is_remote(target) {
            // The temp dir is removed when `clone` drops, success or not.
            let clone = self.clone_remote(target, &options.remote).await?;
            let root = clone.path().to_path_buf();
            self.scan_local(&root, target, options, actor).await
        } else {
            let root = PathBuf::from(target);
            if !root.is_dir() {
                return Err(GraphError::Target(format!(
                    "'{target}' is not a directory"
                )));
            }
            self.scan_local(&root, target, options, actor).await
        }
    }

    async fn scan_local(
        &self,
        root: &Path,
        root_key: &str,
        options: &ScanOptions,
        actor: &str,
    ) -> GraphResult<ScanResult> {
        let mut result = ScanResult {
            dry_run: options.dry_run,
            ..Default::default()
        };

        // Discover.
        let includes = if options.include.is_empty() {
            default_includes()
        } else {
            options.include.clone()
        };
        let files = discover::discover(root, &includes, &options.exclude)?;
        result.files_discovered = files.len();

        let current_store: FingerprintStore = files
            .values()
            .map(|f| (f.relative_path.clone(), f.fingerprint()))
            .collect();

        // Incremental: restrict parsing to added ∪ changed.
        let previous = fingerprint::load(root)?;
        let eligible: Vec<&DiscoveredFile> = match &previous {
            Some(previous) => {
                let diff = fingerprint::diff(previous, &current_store);
                result.files_removed = diff.removed.len();
                files
                    .values()
                    .filter(|f| {
                        diff.added.contains(&f.relative_path)
                            || diff.changed.contains(&f.relative_path)
                    })
                    .collect()
            }
            None => files.values().collect(),
        };

        // Parse, language-filtered and fault-tolerant.
        let mut artifacts = Vec::new();
        for file in eligible {
            if options
                .languages
                .as_ref()
                .is_some_and(|langs| !langs.contains(&file.language))
            {
                continue;
            }
            let Some(parser) = self.parsers.resolve(file.language) else {
                continue;
            };
            match parser.parse(file) {
                Ok(mut parsed) => {
                    result.files_parsed += 1;
                    artifacts.append(&mut parsed);
                }
                Err(e) => {
                    warn!(path = %file.relative_path, error = %e, "parser failed, file skipped");
                }
            }
        }
        result.artifacts = artifacts.len();

        // Map.
        let rules = if options.mappings.is_empty() {
            default_mappings()
        } else {
            options.mappings.clone()
        };
        let outcome = map::map_artifacts(artifacts, &rules, self.pipeline.registry());
        result.entities_unmapped = outcome.unmapped.len();

        // Ingest, unless dry-run.
        if !options.dry_run {
            let stats = ingest::ingest(&self.pipeline, root_key, &outcome.mapped, actor).await?;
            result.entities_upserted = stats.entities_upserted;
            result.entities_skipped = stats.entities_skipped;
            result.relationships_created = stats.relationships_created;
            result.errors = stats.errors;

            fingerprint::save(root, &current_store)?;
        }

        info!(
            discovered = result.files_discovered,
            parsed = result.files_parsed,
            upserted = result.entities_upserted,
            skipped = result.entities_skipped,
            unmapped = result.entities_unmapped,
            relationships = result.relationships_created,
            dry_run = result.dry_run,
            "scan finished"
        );
        Ok(result)
    }

    /// Shallow-clone a remote repository into a scratch directory that is
    /// removed unconditionally when the returned guard drops.
    async fn clone_remote(
        &self,
        url: &str,
        remote: &RemoteOptions,
    ) -> GraphResult<tempfile::TempDir> {
        let dir = tempfile::tempdir()
            .map_err(|e| GraphError::Target(format!("scratch dir: {e}")))?;

        let mut command = tokio::process::Command::new("git");
        command
            .arg("clone")
            .arg("--depth")
            .arg(remote.depth.max(1).to_string());
        if let Some(branch) = &remote.branch {
            command.arg("--branch").arg(branch);
        }
        command.arg(url).arg(dir.path());

        info!(url, depth = remote.depth, "cloning remote target");
        let status = tokio::time::timeout(CLONE_TIMEOUT, command.status())
            .await
            .map_err(|_| GraphError::Target(format!("clone of '{url}' timed out")))?
            .map_err(|e| GraphError::Target(format!("git unavailable: {e}")))?;
        if !status.success() {
            return Err(GraphError::Target(format!(
                "clone of '{url}' failed with {status}"
            )));
        }
        Ok(dir)
    }
}

fn is_remote(target: &str) -> bool {
    target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("git@")
        || target.starts_with("ssh://")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::in_memory_pipeline;
    use crate::schema::{NodeDef, PropertyDef, PropertyKind, SchemaDef, SchemaRegistry};

    fn code_registry() -> SchemaRegistry {
        let node = |label: &str| NodeDef {
            label: label.to_string(),
            properties: [
                ("name".to_string(), PropertyDef::of(PropertyKind::String)),
                ("path".to_string(), PropertyDef::of(PropertyKind::String)),
                ("language".to_string(), PropertyDef::of(PropertyKind::String)),
            ]
            .into_iter()
            .collect(),
            unique_keys: vec![],
        };
        SchemaRegistry::compile(&SchemaDef {
            nodes: vec![node("file"), node("function")],
            edges: vec![],
            constraints: vec![],
        })
        .unwrap()
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://github.com/acme/api.git"));
        assert!(is_remote("git@github.com:acme/api.git"));
        assert!(!is_remote("/home/dev/api"));
        assert!(!is_remote("./api"));
    }

    #[tokio::test]
    async fn missing_local_target_is_fatal() {
        let scanner = Scanner::new(in_memory_pipeline(code_registry()));
        let err = scanner
            .scan("/no/such/path", &ScanOptions::default(), "scanner")
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Target(_)));
    }

    #[tokio::test]
    async fn dry_run_maps_but_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function f() {}\n").unwrap();

        let scanner = Scanner::new(in_memory_pipeline(code_registry()));
        let options = ScanOptions {
            dry_run: true,
            ..Default::default()
        };
        let result = scanner
            .scan(dir.path().to_str().unwrap(), &options, "scanner")
            .await
            .unwrap();

        assert_eq!(result.files_discovered, 1);
        assert_eq!(result.files_parsed, 1);
        assert_eq!(result.artifacts, 2);
        assert_eq!(result.entities_upserted, 0);
        assert!(!dir.path().join(".scanstate/fingerprints").exists());
    }

    #[tokio::test]
    async fn language_filter_restricts_parsing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "export function f() {}\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "def g():\n    pass\n").unwrap();

        let scanner = Scanner::new(in_memory_pipeline(code_registry()));
        let options = ScanOptions {
            languages: Some(vec![Language::Python]),
            dry_run: true,
            ..Default::default()
        };
        let result = scanner
            .scan(dir.path().to_str().unwrap(), &options, "scanner")
            .await
            .unwrap();
        assert_eq!(result.files_discovered, 2);
        assert_eq!(result.files_parsed, 1);
    }
}
