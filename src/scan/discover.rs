//! Discovery: expand globs, fingerprint content, detect language.
//!
//! Discovery walks the scan root once, prunes the standard vendored and
//! build directories unconditionally, matches the include/exclude globs
//! against relative paths, and emits a content-addressed fingerprint for
//! every surviving file.

use chrono::Utc;
use glob::Pattern;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{GraphError, GraphResult};

use super::fingerprint::FileFingerprint;
use super::parsers::Language;

/// Directories never scanned, regardless of user configuration.
const ALWAYS_EXCLUDED_DIRS: [&str; 14] = [
    "node_modules",
    ".git",
    "dist",
    "build",
    "out",
    "target",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    "coverage",
    ".next",
    ".cache",
    ".scanstate",
];

/// Default include globs: common source extensions plus generic manifests.
pub fn default_includes() -> Vec<String> {
    [
        "**/*.ts",
        "**/*.tsx",
        "**/*.js",
        "**/*.jsx",
        "**/*.mjs",
        "**/*.cjs",
        "**/*.py",
        "**/*.go",
        "**/package.json",
        "**/tsconfig.json",
        "**/go.mod",
        "**/Dockerfile",
        "**/.env",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// One discovered file with its content in memory.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub relative_path: String,
    pub size: u64,
    /// 256-bit content digest, lowercase hex
    pub hash: String,
    pub language: Language,
    pub content: String,
}

impl DiscoveredFile {
    pub fn fingerprint(&self) -> FileFingerprint {
        FileFingerprint {
            relative_path: self.relative_path.clone(),
            hash: self.hash.clone(),
            size: self.size,
            recorded_at: Utc::now(),
        }
    }
}

/// Detect language from the basename first, then the extension, falling
/// through to generic.
pub fn detect_language(relative_path: &str) -> Language {
    let basename = relative_path.rsplit('/').next().unwrap_or(relative_path);
    match basename {
        "go.mod" => return Language::Go,
        "package.json" | "tsconfig.json" | ".env" | "Dockerfile" => return Language::Generic,
        _ => {}
    }
    match basename.rsplit('.').next() {
        Some("ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs") => Language::TypeScript,
        Some("py" | "pyi") => Language::Python,
        Some("go") => Language::Go,
        _ => Language::Generic,
    }
}

fn compile_patterns(globs: &[String]) -> GraphResult<Vec<Pattern>> {
    globs
        .iter()
        .map(|g| {
            Pattern::new(g).map_err(|e| GraphError::Config(format!("bad glob '{g}': {e}")))
        })
        .collect()
}

/// Walk `root` and produce every matching file, keyed by relative path.
pub fn discover(
    root: &Path,
    includes: &[String],
    excludes: &[String],
) -> GraphResult<BTreeMap<String, DiscoveredFile>> {
    let include_patterns = compile_patterns(includes)?;
    let exclude_patterns = compile_patterns(excludes)?;

    let mut files = BTreeMap::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        // Prune the standard vendored set at directory level.
        if entry.file_type().is_dir() {
            let name = entry.file_name().to_string_lossy();
            !ALWAYS_EXCLUDED_DIRS.contains(&name.as_ref())
        } else {
            true
        }
    });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "unreadable entry, skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if !include_patterns.iter().any(|p| p.matches(&relative)) {
            continue;
        }
        if exclude_patterns.iter().any(|p| p.matches(&relative)) {
            continue;
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(content) => content,
            Err(e) => {
                // Binary or unreadable: not parseable source.
                debug!(path = %relative, error = %e, "skipping unreadable file");
                continue;
            }
        };
        let hash = hex::encode(Sha256::digest(content.as_bytes()));
        let size = entry.metadata().map(|m| m.len()).unwrap_or(content.len() as u64);
        let language = detect_language(&relative);

        files.insert(
            relative.clone(),
            DiscoveredFile {
                relative_path: relative,
                size,
                hash,
                language,
                content,
            },
        );
    }
    debug!(count = files.len(), root = %root.display(), "discovery complete");
    Ok(files)
}
