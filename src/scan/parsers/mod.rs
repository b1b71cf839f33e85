//! Language parsers: source files in, raw artifacts out.
//!
//! A parser is a capability over one or more languages. The registry
//! dispatches per language with later registrations winning, so callers
//! can override any built-in. Parsers are regex-based and forgiving: they
//! extract what they recognize and never fail the scan over one file.

mod generic;
mod golang;
mod python;
mod typescript;

pub use generic::GenericParser;
pub use golang::GoParser;
pub use python::PythonParser;
pub use typescript::TypeScriptParser;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GraphResult;
use crate::scan::discover::DiscoveredFile;
use crate::types::PropMap;

/// Languages the scanner distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    Python,
    Go,
    Generic,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::TypeScript => "typescript",
            Self::Python => "python",
            Self::Go => "go",
            Self::Generic => "generic",
        };
        write!(f, "{s}")
    }
}

/// The closed set of artifact kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    File,
    Module,
    Function,
    Class,
    Interface,
    Type,
    ApiEndpoint,
    Dependency,
    EnvVar,
    ConfigKey,
    Export,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Module => "module",
            Self::Function => "function",
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Type => "type",
            Self::ApiEndpoint => "api_endpoint",
            Self::Dependency => "dependency",
            Self::EnvVar => "env_var",
            Self::ConfigKey => "config_key",
            Self::Export => "export",
        };
        write!(f, "{s}")
    }
}

/// Typed pointer from one artifact to an external name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Imports,
    Extends,
    Implements,
    Calls,
    DependsOn,
    Configures,
}

impl RefKind {
    /// The declared relationship type this ref kind maps to during ingest.
    pub fn edge_type(&self) -> &'static str {
        match self {
            Self::Imports => "IMPORTS",
            Self::Extends => "EXTENDS",
            Self::Implements => "IMPLEMENTS",
            Self::Calls => "CALLS",
            Self::DependsOn => "DEPENDS_ON",
            Self::Configures => "CONFIGURES",
        }
    }
}

/// A typed reference to some external name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub kind: RefKind,
    pub target: String,
}

impl ArtifactRef {
    pub fn new(kind: RefKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
        }
    }
}

/// Language-agnostic description of one code element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArtifact {
    pub kind: ArtifactKind,
    pub name: String,
    pub file_path: String,
    pub language: Language,
    #[serde(default)]
    pub meta: PropMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<usize>,
    #[serde(default)]
    pub refs: Vec<ArtifactRef>,
}

impl RawArtifact {
    pub fn new(
        kind: ArtifactKind,
        name: impl Into<String>,
        file: &DiscoveredFile,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            file_path: file.relative_path.clone(),
            language: file.language,
            meta: PropMap::new(),
            location: None,
            refs: Vec::new(),
        }
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.location = Some(line);
        self
    }

    pub fn with_meta(mut self, key: &str, value: serde_json::Value) -> Self {
        self.meta.insert(key.to_string(), value);
        self
    }

    pub fn with_ref(mut self, kind: RefKind, target: impl Into<String>) -> Self {
        self.refs.push(ArtifactRef::new(kind, target));
        self
    }
}

/// The bare `file` artifact every parser emits first.
pub(crate) fn file_artifact(file: &DiscoveredFile) -> RawArtifact {
    let name = file
        .relative_path
        .rsplit('/')
        .next()
        .unwrap_or(&file.relative_path)
        .to_string();
    RawArtifact::new(ArtifactKind::File, name, file)
        .with_meta("path", serde_json::json!(file.relative_path))
        .with_meta("size", serde_json::json!(file.size))
        .with_meta("hash", serde_json::json!(file.hash))
}

/// A parser capability: which languages it covers, and how to parse.
pub trait LanguageParser: Send + Sync {
    fn languages(&self) -> &[Language];

    fn parse(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>>;
}

/// Per-language dispatch. Later registrations win.
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn LanguageParser>>,
}

impl ParserRegistry {
    /// The built-in set.
    pub fn builtin() -> Self {
        Self {
            parsers: vec![
                Arc::new(GenericParser),
                Arc::new(TypeScriptParser::new()),
                Arc::new(PythonParser::new()),
                Arc::new(GoParser::new()),
            ],
        }
    }

    /// Register a parser that overrides the built-ins on its languages.
    pub fn register(&mut self, parser: Arc<dyn LanguageParser>) {
        self.parsers.push(parser);
    }

    /// The winning parser for a language, if any.
    pub fn resolve(&self, language: Language) -> Option<&Arc<dyn LanguageParser>> {
        self.parsers
            .iter()
            .rev()
            .find(|p| p.languages().contains(&language))
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Stub(Vec<Language>);

    impl LanguageParser for Stub {
        fn languages(&self) -> &[Language] {
            &self.0
        }

        fn parse(&self, file: &DiscoveredFile) -> GraphResult<Vec<RawArtifact>> {
            Ok(vec![file_artifact(file)])
        }
    }

    #[test]
    fn later_registrations_win() {
        let mut registry = ParserRegistry::builtin();
        let custom: Arc<dyn LanguageParser> = Arc::new(Stub(vec![Language::Python]));
        registry.register(custom.clone());
        let resolved = registry.resolve(Language::Python).unwrap();
        assert!(Arc::ptr_eq(resolved, &custom));
        // Other languages still hit the built-ins.
        assert!(registry.resolve(Language::Go).is_some());
    }

    #[test]
    fn ref_kinds_map_to_declared_edge_types() {
        assert_eq!(RefKind::Imports.edge_type(), "IMPORTS");
        assert_eq!(RefKind::DependsOn.edge_type(), "DEPENDS_ON");
    }

    #[test]
    fn kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ArtifactKind::ApiEndpoint).unwrap(),
            "\"api_endpoint\""
        );
        assert_eq!(ArtifactKind::EnvVar.to_string(), "env_var");
    }
}
