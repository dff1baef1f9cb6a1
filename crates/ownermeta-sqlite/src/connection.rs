//! Shared SQLite connection for the metadata store
//!
//! One connection behind an `Arc<Mutex<_>>`, cloned into every store that
//! uses it. Writers in other processes are serialised by SQLite's file lock
//! and the configured busy timeout; the unique index on `meta` settles the rest.

use crate::config::SqliteConfig;
use crate::error::{SqliteError, SqliteResult};
use crate::schema;
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction};
use std::sync::Arc;
use tracing::{debug, info};

/// Cloneable handle to the metadata database
#[derive(Clone)]
pub struct SqlitePool {
    conn: Arc<Mutex<Connection>>,
    config: SqliteConfig,
}

impl SqlitePool {
    /// Open the database described by `config` and bring `meta` up to date
    pub fn new(config: SqliteConfig) -> SqliteResult<Self> {
        config.validate()?;
        info!(path = ?config.path, realm = %config.realm, "Opening metadata database");

        let conn = open(&config)?;
        conn.execute_batch(&pragma_batch(&config))?;
        let version = schema::apply_migrations(&conn)?;
        debug!(version, "Metadata schema ready");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            config,
        })
    }

    /// In-memory database, mostly for tests
    pub fn memory() -> SqliteResult<Self> {
        Self::new(SqliteConfig::memory())
    }

    pub fn config(&self) -> &SqliteConfig {
        &self.config
    }

    /// Run `f` with the connection locked
    pub fn with_connection<F, T>(&self, f: F) -> SqliteResult<T>
    where
        F: FnOnce(&Connection) -> SqliteResult<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction
    ///
    /// Commits when `f` returns `Ok`; the transaction is rolled back on drop otherwise.
    pub fn with_transaction<F, T>(&self, f: F) -> SqliteResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> SqliteResult<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

fn open(config: &SqliteConfig) -> SqliteResult<Connection> {
    if config.is_memory() {
        return Ok(Connection::open_in_memory()?);
    }

    if let Some(dir) = config.path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| {
            SqliteError::Connection(format!("Can't create {}: {}", dir.display(), e))
        })?;
    }
    Ok(Connection::open(&config.path)?)
}

/// PRAGMA statements applied once per connection
fn pragma_batch(config: &SqliteConfig) -> String {
    let mut pragmas = Vec::new();

    // WAL is meaningless for in-memory databases
    if config.wal_mode && !config.is_memory() {
        pragmas.push("PRAGMA journal_mode = WAL;".to_string());
        pragmas.push("PRAGMA synchronous = NORMAL;".to_string());
    }
    if config.foreign_keys {
        pragmas.push("PRAGMA foreign_keys = ON;".to_string());
    }
    pragmas.push(format!("PRAGMA busy_timeout = {};", config.busy_timeout_ms));
    pragmas.push(format!("PRAGMA cache_size = {};", config.cache_size));
    if config.mmap_size > 0 {
        pragmas.push(format!("PRAGMA mmap_size = {};", config.mmap_size));
    }

    pragmas.join("\n")
}
