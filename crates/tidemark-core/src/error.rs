//! Error types for tidemark-core.

/// Result type alias using [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type alias using [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;

/// SQLSTATE raised by PostgreSQL when the current role lacks a privilege.
pub const SQLSTATE_INSUFFICIENT_PRIVILEGE: &str = "42501";

/// Errors raised while building values, identifiers and expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// The input could not be parsed as a duration.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    /// The identifier is not on the allow-list of safe SQL names.
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// An expression was nested under one that cannot accept its type.
    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Function or operator being built.
        context: &'static str,
        /// Type the context accepts.
        expected: &'static str,
        /// Type that was supplied.
        found: &'static str,
    },

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    /// Create an invalid interval error.
    #[must_use]
    pub fn invalid_interval(msg: impl Into<String>) -> Self {
        Self::InvalidInterval(msg.into())
    }

    /// Create an invalid identifier error.
    #[must_use]
    pub fn invalid_identifier(ident: impl Into<String>) -> Self {
        Self::InvalidIdentifier(ident.into())
    }
}

/// Errors surfaced by an [`Engine`](crate::Engine) implementation.
///
/// Database errors are passed through verbatim so callers can tell an engine
/// rejection apart from a local validation failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The engine rejected the statement.
    #[error("database error{}: {message}", code.as_deref().map(|c| format!(" [{c}]")).unwrap_or_default())]
    Database {
        /// SQLSTATE code, when the engine reported one.
        code: Option<String>,
        /// Engine message.
        message: String,
    },

    /// The connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// A result column could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The engine cannot evaluate this command.
    #[error("unsupported command: {0}")]
    Unsupported(String),
}

impl EngineError {
    /// Create a database error with an SQLSTATE code.
    #[must_use]
    pub fn database(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Database {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// SQLSTATE code of a database error.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Database { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Whether the engine refused the statement for lack of privileges.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.code() == Some(SQLSTATE_INSUFFICIENT_PRIVILEGE)
    }

    /// Whether the engine message contains `needle` (case-insensitive).
    #[must_use]
    pub fn message_contains(&self, needle: &str) -> bool {
        match self {
            Self::Database { message, .. } => {
                message.to_lowercase().contains(&needle.to_lowercase())
            }
            _ => false,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self::Database {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_owned(),
            },
            sqlx::Error::Io(e) => Self::Connection(e.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                Self::Connection(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::Decode(err.to_string())
            }
            other => Self::Connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_detected_by_sqlstate() {
        let err = EngineError::database("42501", "permission denied to create extension");
        assert!(err.is_permission_denied());

        let other = EngineError::database("42P01", "relation does not exist");
        assert!(!other.is_permission_denied());
        assert!(!EngineError::Connection("refused".into()).is_permission_denied());
    }

    #[test]
    fn database_error_display_includes_code() {
        let err = EngineError::database("TS100", "table is already a hypertable");
        assert_eq!(
            err.to_string(),
            "database error [TS100]: table is already a hypertable"
        );

        let uncoded = EngineError::Database {
            code: None,
            message: "boom".into(),
        };
        assert_eq!(uncoded.to_string(), "database error: boom");
    }

    #[test]
    fn message_match_ignores_case() {
        let err = EngineError::database("XX000", "Chunk is Already Compressed");
        assert!(err.message_contains("already compressed"));
    }
}
