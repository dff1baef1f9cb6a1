//! Error types for SQLite storage

use ownermeta_core::MetaError;
use rusqlite::ErrorCode;
use thiserror::Error;

/// SQLite storage error type
#[derive(Error, Debug)]
pub enum SqliteError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(String),

    /// Schema/migration error
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Error raised by metadata logic running inside a connection closure
    #[error(transparent)]
    Meta(#[from] MetaError),

    /// Underlying rusqlite error
    #[error("SQLite error: {0}")]
    Rusqlite(#[from] rusqlite::Error),
}

/// Result type for SQLite operations
pub type SqliteResult<T> = Result<T, SqliteError>;

impl SqliteError {
    /// True when the error is a UNIQUE/PRIMARY KEY constraint failure
    pub fn is_unique_violation(&self) -> bool {
        match self {
            SqliteError::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == ErrorCode::ConstraintViolation
                    && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
            }
            _ => false,
        }
    }
}

impl From<SqliteError> for MetaError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::Meta(e) => e,
            SqliteError::Connection(msg) => Self::Storage(msg),
            SqliteError::Query(msg) => Self::Storage(msg),
            SqliteError::Schema(msg) => Self::Storage(msg),
            SqliteError::Config(msg) => Self::Storage(format!("Config: {}", msg)),
            SqliteError::Rusqlite(e) => Self::Storage(e.to_string()),
        }
    }
}
