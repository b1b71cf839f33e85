/// Error types for mnemograph operations.
///
/// This module provides the error taxonomy for the whole graph: schema
/// violations, unknown labels and edge types, missing entities, storage
/// failures, reconciliation conflicts, and scanner failures. All errors are
/// well-typed and can be pattern-matched for precise handling.
use thiserror::Error;

/// A single validation failure at one property path.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValidationIssue {
    /// Property path that failed (e.g. "status" or "tags[2]")
    pub path: String,
    /// Human-readable cause
    pub message: String,
}

impl ValidationIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// The main error type for mnemograph operations.
///
/// All fallible operations return `Result<T, GraphError>`. This provides a
/// unified error handling interface across the entire API.
#[derive(Error, Debug)]
pub enum GraphError {
    /// One or more properties violated the schema
    #[error("Validation failed for label '{label}': {}", issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
    Validation {
        /// The node or edge label being validated
        label: String,
        /// Per-path failures, machine-readable
        issues: Vec<ValidationIssue>,
    },

    /// The schema declares no node with this label
    #[error("Unknown label '{0}'")]
    UnknownLabel(String),

    /// The schema declares no edge for this (from, type, to) triple
    #[error("Unknown edge '{from}-[{edge_type}]->{to}'")]
    UnknownEdge {
        from: String,
        edge_type: String,
        to: String,
    },

    /// Entity or state missing where the contract requires one
    #[error("Entity '{0}' not found")]
    NotFound(String),

    /// Storage, transport, or serialization failure at the store boundary
    #[error("Storage error: {0}")]
    Storage(String),

    /// Reconciliation aborted under the `fail` strategy
    #[error("Sync conflict on entity '{entity_id}' ({label}): graph hash {graph_hash}, doc hash {doc_hash}")]
    Conflict {
        entity_id: String,
        label: String,
        graph_hash: String,
        doc_hash: String,
    },

    /// A document or source file could not be parsed
    #[error("Parse error in '{path}': {reason}")]
    Parse { path: String, reason: String },

    /// Scan target does not exist or cannot be reached
    #[error("Scan target error: {0}")]
    Target(String),

    /// Serialization error when converting data to/from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration file is missing or malformed
    #[error("Config error: {0}")]
    Config(String),
}

impl GraphError {
    /// Shorthand for a single-issue validation error.
    pub fn validation(
        label: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            label: label.into(),
            issues: vec![ValidationIssue::new(path, message)],
        }
    }
}

/// Result type alias for mnemograph operations.
pub type GraphResult<T> = Result<T, GraphError>;
