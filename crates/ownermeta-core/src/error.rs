//! Metadata Error Types
//!
//! Every failure the metadata layer can report to a caller. `AlreadyExists`,
//! `NotFound` and `InvalidOperator` are always surfaced as their own variants so
//! callers can match on them instead of parsing messages.

use thiserror::Error;

/// Error type for metadata operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetaError {
    /// `create_meta` on a key the owner already has
    #[error("Can't create meta (key: {key}). Meta already exists")]
    AlreadyExists { key: String },

    /// `update_meta` on a key the owner doesn't have
    #[error("Can't update meta (key: {key}). Meta doesn't exist")]
    NotFound { key: String },

    /// Comparison operator outside `=, !=, <>, <, <=, >, >=`
    #[error("Invalid operator '{0}'. Allowed: =, !=, <>, <, <=, >, >=")]
    InvalidOperator(String),

    /// Value could not be encoded, or a stored payload could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Lost a race on the unique (realm, owner_type, owner_id, key) tuple.
    ///
    /// Stores recover from this once per operation; callers only see it
    /// through [`MetaError::Storage`] when the retry fails as well.
    #[error("Constraint violation on meta (key: {key})")]
    ConstraintViolation { key: String },

    /// Owner identity can't be represented by the backing store
    #[error("Invalid owner: {0}")]
    InvalidOwner(String),

    /// Backing store failure
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for metadata operations
pub type MetaResult<T> = Result<T, MetaError>;

impl MetaError {
    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an encoding error
    pub fn encoding<S: Into<String>>(msg: S) -> Self {
        Self::Encoding(msg.into())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_invalid_operator(&self) -> bool {
        matches!(self, Self::InvalidOperator(_))
    }
}

impl From<serde_json::Error> for MetaError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(err.to_string())
    }
}
