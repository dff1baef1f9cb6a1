//! MetaStore implementation for SQLite
//!
//! Writes rely on the `UNIQUE (realm, owner_type, owner_id, key)` index as the
//! final arbiter between concurrent writers, including other processes sharing
//! the database file.

use crate::connection::SqlitePool;
use crate::error::{SqliteError, SqliteResult};
use crate::query::quote_ident;
use chrono::{DateTime, Utc};
use ownermeta_core::value::decode_tagged;
use ownermeta_core::{
    decode, encode, EncodedValue, MetaError, MetaRecord, MetaResult, MetaStore, MetaValue,
    OwnerKey, OwnerRef, OwnerTable, TypeTag,
};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// SQLite implementation of MetaStore
#[derive(Clone)]
pub struct SqliteMetaStore {
    pool: SqlitePool,
    realm: String,
}

/// Outcome of [`SqliteMetaStore::delete_owner`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OwnerDeletion {
    /// Whether the owner row existed
    pub owner_deleted: bool,
    /// Metadata records removed with it
    pub meta_purged: usize,
}

/// Row scope shared by every statement
struct Scope<'a> {
    realm: &'a str,
    owner_type: &'a str,
    owner_id: i64,
}

impl SqliteMetaStore {
    /// Create a store writing to the realm configured on the pool
    pub fn new(pool: SqlitePool) -> Self {
        let realm = pool.config().realm.clone();
        Self { pool, realm }
    }

    /// Use a different realm on the same database
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete an owner row and purge its metadata in one transaction
    ///
    /// Either both the row and its metadata are gone afterwards, or neither is.
    pub fn delete_owner<T: OwnerTable + OwnerRef>(&self, owner: &T) -> MetaResult<OwnerDeletion> {
        let owner_id = owner_id_param(owner)?;
        let realm = self.realm.as_str();
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(T::TABLE),
            quote_ident(T::ID_COLUMN)
        );

        let deletion = self.pool.with_transaction(|tx| {
            let rows = tx.execute(&sql, [owner_id])?;
            let meta_purged = purge_rows(
                tx,
                &Scope {
                    realm,
                    owner_type: owner.owner_type(),
                    owner_id,
                },
            )?;
            Ok(OwnerDeletion {
                owner_deleted: rows > 0,
                meta_purged,
            })
        })?;

        debug!(
            realm,
            owner_type = owner.owner_type(),
            owner_id,
            meta_purged = deletion.meta_purged,
            "Deleted owner with metadata"
        );
        Ok(deletion)
    }

    fn scope<'a>(&'a self, owner: &'a dyn OwnerRef) -> MetaResult<Scope<'a>> {
        Ok(Scope {
            realm: &self.realm,
            owner_type: owner.owner_type(),
            owner_id: owner_id_param(owner)?,
        })
    }
}

impl MetaStore for SqliteMetaStore {
    fn realm(&self) -> &str {
        &self.realm
    }

    fn upsert(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()> {
        let scope = self.scope(owner)?;
        let encoded = encode(value)?;

        self.pool
            .with_connection(|conn| upsert_row(conn, &scope, key, &encoded))?;

        debug!(
            realm = scope.realm,
            owner_type = scope.owner_type,
            owner_id = scope.owner_id,
            key,
            tag = %encoded.tag,
            "Set meta"
        );
        Ok(())
    }

    fn create_only(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()> {
        let scope = self.scope(owner)?;
        let encoded = encode(value)?;

        self.pool.with_connection(|conn| {
            if row_exists(conn, &scope, key)? {
                return Err(already_exists(key));
            }
            match insert_row(conn, &scope, key, &encoded) {
                Err(SqliteError::Meta(MetaError::ConstraintViolation { .. })) => {
                    Err(already_exists(key))
                }
                other => other,
            }
        })?;

        debug!(
            realm = scope.realm,
            owner_type = scope.owner_type,
            owner_id = scope.owner_id,
            key,
            "Created meta"
        );
        Ok(())
    }

    fn update_only(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()> {
        let scope = self.scope(owner)?;
        let encoded = encode(value)?;

        self.pool.with_connection(|conn| {
            if update_row(conn, &scope, key, &encoded)? == 0 {
                return Err(SqliteError::Meta(MetaError::NotFound {
                    key: key.to_string(),
                }));
            }
            Ok(())
        })?;

        debug!(
            realm = scope.realm,
            owner_type = scope.owner_type,
            owner_id = scope.owner_id,
            key,
            "Updated meta"
        );
        Ok(())
    }

    fn find(&self, owner: &dyn OwnerRef, key: &str) -> MetaResult<Option<MetaValue>> {
        let scope = self.scope(owner)?;

        let stored: Option<(String, Option<String>)> = self.pool.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value, type FROM meta
                     WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3 AND key = ?4",
                    params![scope.realm, scope.owner_type, scope.owner_id, key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?)
        })?;

        stored
            .map(|(text, tag)| decode(&text, tag.as_deref()))
            .transpose()
    }

    fn exists(&self, owner: &dyn OwnerRef, key: &str) -> MetaResult<bool> {
        let scope = self.scope(owner)?;
        Ok(self
            .pool
            .with_connection(|conn| row_exists(conn, &scope, key))?)
    }

    fn count(&self, owner: &dyn OwnerRef) -> MetaResult<usize> {
        let scope = self.scope(owner)?;
        let count: i64 = self.pool.with_connection(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM meta WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3",
                params![scope.realm, scope.owner_type, scope.owner_id],
                |row| row.get(0),
            )?)
        })?;
        Ok(count as usize)
    }

    fn list_all(&self, owner: &dyn OwnerRef) -> MetaResult<BTreeMap<String, MetaValue>> {
        Ok(self
            .records(owner)?
            .into_iter()
            .map(|record| (record.key, record.value))
            .collect())
    }

    fn list_keys(&self, owner: &dyn OwnerRef) -> MetaResult<Vec<String>> {
        let scope = self.scope(owner)?;
        Ok(self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key FROM meta
                 WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3
                 ORDER BY id",
            )?;
            let keys = stmt
                .query_map(
                    params![scope.realm, scope.owner_type, scope.owner_id],
                    |row| row.get(0),
                )?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })?)
    }

    fn records(&self, owner: &dyn OwnerRef) -> MetaResult<Vec<MetaRecord>> {
        let scope = self.scope(owner)?;
        let rows: Vec<StoredRow> = self.pool.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value, type, created_at, updated_at FROM meta
                 WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3
                 ORDER BY id",
            )?;
            let rows = stmt
                .query_map(
                    params![scope.realm, scope.owner_type, scope.owner_id],
                    row_to_stored,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let owner_key = owner.owner_key();
        rows.into_iter()
            .map(|row| row.into_record(&self.realm, &owner_key))
            .collect()
    }

    fn remove(&self, owner: &dyn OwnerRef, keys: &[String]) -> MetaResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let scope = self.scope(owner)?;

        let placeholders = vec!["?"; keys.len()].join(", ");
        let sql = format!(
            "DELETE FROM meta WHERE realm = ? AND owner_type = ? AND owner_id = ? AND key IN ({})",
            placeholders
        );

        let mut values: Vec<rusqlite::types::Value> = vec![
            scope.realm.to_string().into(),
            scope.owner_type.to_string().into(),
            scope.owner_id.into(),
        ];
        values.extend(keys.iter().map(|k| k.clone().into()));

        let removed = self
            .pool
            .with_connection(|conn| Ok(conn.execute(&sql, params_from_iter(values))?))?;

        debug!(
            realm = scope.realm,
            owner_type = scope.owner_type,
            owner_id = scope.owner_id,
            requested = keys.len(),
            removed,
            "Removed meta"
        );
        Ok(removed)
    }

    fn purge_all(&self, owner: &dyn OwnerRef) -> MetaResult<usize> {
        let scope = self.scope(owner)?;
        let purged = self.pool.with_connection(|conn| purge_rows(conn, &scope))?;

        debug!(
            realm = scope.realm,
            owner_type = scope.owner_type,
            owner_id = scope.owner_id,
            purged,
            "Purged meta"
        );
        Ok(purged)
    }

    /// All entries are written in one transaction
    fn set_many(&self, owner: &dyn OwnerRef, entries: &[(String, MetaValue)]) -> MetaResult<usize> {
        let scope = self.scope(owner)?;
        let encoded = entries
            .iter()
            .map(|(key, value)| Ok((key.as_str(), encode(value)?)))
            .collect::<MetaResult<Vec<_>>>()?;

        self.pool.with_transaction(|tx| {
            for (key, value) in &encoded {
                upsert_row(tx, &scope, key, value)?;
            }
            Ok(())
        })?;

        debug!(
            realm = scope.realm,
            owner_type = scope.owner_type,
            owner_id = scope.owner_id,
            count = encoded.len(),
            "Set meta batch"
        );
        Ok(encoded.len())
    }
}

fn owner_id_param(owner: &dyn OwnerRef) -> MetaResult<i64> {
    i64::try_from(owner.owner_id()).map_err(|_| {
        MetaError::InvalidOwner(format!(
            "{}:{} exceeds the storable id range",
            owner.owner_type(),
            owner.owner_id()
        ))
    })
}

fn already_exists(key: &str) -> SqliteError {
    SqliteError::Meta(MetaError::AlreadyExists {
        key: key.to_string(),
    })
}

/// Update in place, or insert
fn upsert_row(conn: &Connection, scope: &Scope, key: &str, value: &EncodedValue) -> SqliteResult<()> {
    if update_row(conn, scope, key, value)? > 0 {
        return Ok(());
    }
    insert_or_retry_update(conn, scope, key, value)
}

/// Insert; losing the unique tuple to a concurrent writer is retried once as an update
fn insert_or_retry_update(
    conn: &Connection,
    scope: &Scope,
    key: &str,
    value: &EncodedValue,
) -> SqliteResult<()> {
    let violation = match insert_row(conn, scope, key, value) {
        Err(SqliteError::Meta(violation @ MetaError::ConstraintViolation { .. })) => violation,
        other => return other,
    };

    warn!(
        realm = scope.realm,
        owner_type = scope.owner_type,
        owner_id = scope.owner_id,
        key,
        "Concurrent insert won the race, retrying as update"
    );
    if update_row(conn, scope, key, value)? > 0 {
        return Ok(());
    }

    Err(SqliteError::Meta(MetaError::Storage(format!(
        "Can't set meta (key: {}). {} and the retried update matched no record",
        key, violation
    ))))
}

/// Insert a new row; a taken unique tuple is reported as [`MetaError::ConstraintViolation`]
fn insert_row(conn: &Connection, scope: &Scope, key: &str, value: &EncodedValue) -> SqliteResult<()> {
    let now = Utc::now().to_rfc3339();
    let inserted = conn.execute(
        "INSERT INTO meta (realm, owner_type, owner_id, key, value, type, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            scope.realm,
            scope.owner_type,
            scope.owner_id,
            key,
            value.value,
            value.tag.as_str(),
            now,
        ],
    );

    match inserted.map_err(SqliteError::from) {
        Ok(_) => Ok(()),
        Err(e) if e.is_unique_violation() => Err(SqliteError::Meta(MetaError::ConstraintViolation {
            key: key.to_string(),
        })),
        Err(e) => Err(e),
    }
}

fn update_row(
    conn: &Connection,
    scope: &Scope,
    key: &str,
    value: &EncodedValue,
) -> SqliteResult<usize> {
    Ok(conn.execute(
        "UPDATE meta SET value = ?5, type = ?6, updated_at = ?7
         WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3 AND key = ?4",
        params![
            scope.realm,
            scope.owner_type,
            scope.owner_id,
            key,
            value.value,
            value.tag.as_str(),
            Utc::now().to_rfc3339(),
        ],
    )?)
}

fn row_exists(conn: &Connection, scope: &Scope, key: &str) -> SqliteResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM meta
         WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3 AND key = ?4)",
        params![scope.realm, scope.owner_type, scope.owner_id, key],
        |row| row.get(0),
    )?)
}

fn purge_rows(conn: &Connection, scope: &Scope) -> SqliteResult<usize> {
    Ok(conn.execute(
        "DELETE FROM meta WHERE realm = ?1 AND owner_type = ?2 AND owner_id = ?3",
        params![scope.realm, scope.owner_type, scope.owner_id],
    )?)
}

/// Raw columns of one row, decoded after the connection is released
struct StoredRow {
    key: String,
    value: String,
    tag: Option<String>,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn into_record(self, realm: &str, owner: &OwnerKey) -> MetaResult<MetaRecord> {
        let type_tag = self.tag.as_deref().map(str::parse::<TypeTag>).transpose()?;
        let value = decode_tagged(&self.value, type_tag.unwrap_or(TypeTag::String))?;

        Ok(MetaRecord {
            realm: realm.to_string(),
            owner: owner.clone(),
            key: self.key,
            value,
            type_tag,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        })
    }
}

fn row_to_stored(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        key: row.get(0)?,
        value: row.get(1)?,
        tag: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
