//! SQLite backend configuration
//!
//! ```toml
//! path = "/var/lib/app/meta.db"
//! realm = "billing"
//! busy_timeout_ms = 10000
//! ```

use crate::error::{SqliteError, SqliteResult};
use ownermeta_core::DEFAULT_REALM;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MEMORY_PATH: &str = ":memory:";

/// Connection and realm settings for [`SqlitePool`](crate::SqlitePool) and
/// [`SqliteMetaStore`](crate::SqliteMetaStore)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    /// Enable write-ahead logging (ignored for in-memory databases)
    pub wal_mode: bool,
    pub foreign_keys: bool,
    pub busy_timeout_ms: u32,
    /// `PRAGMA cache_size`; negative values are KiB
    pub cache_size: i64,
    /// `PRAGMA mmap_size` in bytes, 0 disables
    pub mmap_size: i64,
    /// Realm metadata is written to
    pub realm: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("ownermeta.db"),
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_ms: 5000,
            cache_size: -8000,
            mmap_size: 0,
            realm: DEFAULT_REALM.to_string(),
        }
    }
}

impl SqliteConfig {
    /// Configuration for a database file
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Configuration for a private in-memory database
    pub fn memory() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            wal_mode: false,
            ..Self::default()
        }
    }

    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn with_busy_timeout_ms(mut self, ms: u32) -> Self {
        self.busy_timeout_ms = ms;
        self
    }

    pub fn is_memory(&self) -> bool {
        self.path.to_str() == Some(MEMORY_PATH)
    }

    /// Parse from TOML; missing fields take their defaults
    pub fn from_toml_str(s: &str) -> SqliteResult<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| SqliteError::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> SqliteResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SqliteError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> SqliteResult<()> {
        if self.realm.trim().is_empty() {
            return Err(SqliteError::Config("realm must not be empty".to_string()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(SqliteError::Config("path must not be empty".to_string()));
        }
        Ok(())
    }
}
