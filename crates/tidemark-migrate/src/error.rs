//! Error types for tidemark-migrate.

use tidemark_core::{CoreError, EngineError};

/// Result type alias using [`MigrationError`].
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Errors that can occur while migrating a table schema.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The table is already registered as a hypertable.
    #[error("table {0} is already a hypertable")]
    AlreadyHypertable(String),

    /// The table is not a hypertable.
    #[error("table {0} is not a hypertable")]
    NotHypertable(String),

    /// The requested schema change cannot be carried out.
    #[error("unsupported migration: {0}")]
    UnsupportedMigration(String),

    /// The declared schema is invalid.
    #[error("invalid schema definition: {0}")]
    Definition(String),

    /// The table is not in the schema registry.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// Invalid interval, identifier or expression.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The engine rejected a statement.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl MigrationError {
    /// Create an unsupported migration error.
    #[must_use]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedMigration(msg.into())
    }

    /// Create a definition error.
    #[must_use]
    pub fn definition(msg: impl Into<String>) -> Self {
        Self::Definition(msg.into())
    }
}
