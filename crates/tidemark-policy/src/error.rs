//! Error types for tidemark-policy.

use tidemark_core::{CoreError, EngineError, PolicyKind};

/// Result type alias using [`PolicyError`].
pub type PolicyResult<T> = Result<T, PolicyError>;

/// Errors that can occur while managing policies and compression.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// Both age thresholds were given; the engine accepts exactly one.
    #[error("{kind} policy takes either {after} or {created_before}, not both")]
    ConflictingThreshold {
        /// Policy being added.
        kind: PolicyKind,
        /// Name of the time-range threshold argument.
        after: &'static str,
        /// Name of the creation-time threshold argument.
        created_before: &'static str,
    },

    /// A compression column is not part of the table.
    #[error("unknown column {column} on table {table}")]
    UnknownColumn {
        /// Hypertable.
        table: String,
        /// Column that was referenced.
        column: String,
    },

    /// The engine returned something the manager cannot interpret.
    #[error("unexpected result from {operation}: {detail}")]
    UnexpectedResult {
        /// Operation that was running.
        operation: &'static str,
        /// What was returned.
        detail: String,
    },

    /// Invalid interval, identifier or expression.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The engine rejected a statement.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl PolicyError {
    /// Create an unexpected result error.
    #[must_use]
    pub fn unexpected(operation: &'static str, detail: impl Into<String>) -> Self {
        Self::UnexpectedResult {
            operation,
            detail: detail.into(),
        }
    }
}
