//! Typed error hierarchy for Conveyor.
//!
//! - `StoreError`: reading or writing the durable run state
//! - `PlanError`: a generated issue list that cannot drive a run
//!
//! Collaborator failures (`ToolError`) live in `conveyor-common` next to the
//! traits that produce them.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the persistent state store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("State file I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State file at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize run state: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors from turning generated output into a runnable issue list.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("No JSON array found in generated issue list")]
    MissingJson,

    #[error("Generated issue list is not valid: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Generated issue list is empty")]
    Empty,

    #[error("Issue '{title}' has phase 0; phases start at 1")]
    InvalidPhase { title: String },

    #[error("Duplicate issue title '{0}'")]
    DuplicateTitle(String),

    #[error("Issues with unresolvable dependencies: {}", .0.join(", "))]
    UnresolvedDependencies(Vec<String>),

    #[error(
        "issues.json does not match saved state at index {index}: expected '{expected}', found '{found}'"
    )]
    StateMismatch {
        index: usize,
        expected: String,
        found: String,
    },
}
