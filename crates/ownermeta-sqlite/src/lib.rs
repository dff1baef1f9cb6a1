//! SQLite storage backend for ownermeta
//!
//! This crate provides the SQLite implementation of [`MetaStore`], plus
//! collection queries that filter owner tables by their metadata.
//!
//! ## Features
//!
//! - **SqliteMetaStore**: realm-partitioned metadata rows with a unique
//!   `(realm, owner_type, owner_id, key)` index arbitrating concurrent writers
//! - **MetaQuery**: `where_meta` / `where_meta_key_exists` filters over any owner table
//! - **Cascade delete**: `delete_owner` removes an owner row and its metadata in one transaction
//! - **WAL Mode**: Optimized for concurrent read access with write-ahead logging
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ownermeta_core::HasMeta;
//! use ownermeta_sqlite::{MetaQuery, SqliteConfig, SqliteMetaStore, SqlitePool};
//!
//! let pool = SqlitePool::new(SqliteConfig::new("./app.db"))?;
//! let store = SqliteMetaStore::new(pool);
//!
//! user.meta(&store).set_meta("age", 25)?;
//! let adults = MetaQuery::<User>::new().where_meta("age", ">=", 18)?.fetch_ids(&store)?;
//! ```
//!
//! [`MetaStore`]: ownermeta_core::MetaStore

pub mod config;
pub mod connection;
pub mod error;
pub mod meta_store;
pub mod query;
pub mod schema;

// Re-exports
pub use config::SqliteConfig;
pub use connection::SqlitePool;
pub use error::{SqliteError, SqliteResult};
pub use meta_store::{OwnerDeletion, SqliteMetaStore};
pub use query::MetaQuery;
