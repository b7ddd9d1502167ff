//! Error types for tidemark-query.

use tidemark_core::{CoreError, EngineError};

/// Result type alias using [`QueryError`].
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors raised while composing or running a query pipeline.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The table declares no partitioned column.
    #[error("table {0} has no partitioned column")]
    NoPartitionField(String),

    /// The column is not declared on the table.
    #[error("unknown column {column} on table {table}")]
    UnknownColumn {
        /// Table being queried.
        table: String,
        /// Column that was referenced.
        column: String,
    },

    /// The operation does not apply to the pipeline in its current form.
    #[error("invalid pipeline: {0}")]
    InvalidShape(String),

    /// The engine returned something the pipeline cannot interpret.
    #[error("unexpected result: {0}")]
    UnexpectedResult(String),

    /// Invalid interval, identifier or expression.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The engine rejected the statement.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl QueryError {
    /// Create an invalid shape error.
    #[must_use]
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    /// Create an unexpected result error.
    #[must_use]
    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::UnexpectedResult(msg.into())
    }
}
