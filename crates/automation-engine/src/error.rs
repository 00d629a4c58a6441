//! Error types for the automation engine

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the automation engine
#[derive(Error, Debug)]
pub enum AutomationError {
    /// A required field is missing or malformed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The request would break a safety invariant
    #[error("Safety violation: {0}")]
    PolicyViolation(String),

    /// Unknown preset name
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    /// No rule at the given position
    #[error("Rule index {index} out of range ({len} rules)")]
    RuleIndexOutOfRange { index: usize, len: usize },

    /// Task not found
    #[error("Task not found: {0}")]
    TaskNotFound(String),

    /// No pending deletion for the given confirmation token
    #[error("Confirmation not found: {0}")]
    ConfirmationNotFound(String),

    /// Persisted state exists but cannot be parsed
    #[error("Corrupt state in {path:?}: {source}")]
    CorruptState {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// IO error (persistence)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AutomationError {
    /// Whether the error refers to something that does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AutomationError::PresetNotFound(_)
                | AutomationError::RuleIndexOutOfRange { .. }
                | AutomationError::TaskNotFound(_)
                | AutomationError::ConfirmationNotFound(_)
        )
    }
}
