//! Schema management and migrations

use crate::error::{SqliteError, SqliteResult};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

/// Ordered migrations; the version of each is its 1-based position
const MIGRATIONS: &[(&str, &str)] = &[
    ("initial meta table", SCHEMA_V1),
    ("typed values", SCHEMA_V2),
];

/// Schema version - the number of migrations
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Apply all pending migrations, returning the resulting schema version
pub fn apply_migrations(conn: &Connection) -> SqliteResult<i32> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version = current_version(conn)?;
    debug!(current_version, target_version = SCHEMA_VERSION, "Checking migrations");

    if current_version < SCHEMA_VERSION {
        info!(
            from = current_version,
            to = SCHEMA_VERSION,
            "Applying schema migrations"
        );
    }

    for (index, (name, sql)) in MIGRATIONS.iter().enumerate() {
        let version = index as i32 + 1;
        if version <= current_version {
            continue;
        }
        apply_migration(conn, version, name, sql)?;
    }

    Ok(current_version.max(SCHEMA_VERSION))
}

/// Get current schema version
pub fn current_version(conn: &Connection) -> SqliteResult<i32> {
    let version: Option<i32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();

    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &Connection, version: i32, name: &str, sql: &str) -> SqliteResult<()> {
    debug!(version, name, "Applying migration");

    conn.execute_batch(sql).map_err(|e| {
        SqliteError::Schema(format!("Failed to apply v{} ({}): {}", version, name, e))
    })?;

    conn.execute(
        "INSERT INTO schema_migrations (version) VALUES (?)",
        [version],
    )?;
    info!(version, name, "Migration applied successfully");
    Ok(())
}

/// Metadata rows, one per (realm, owner_type, owner_id, key)
///
/// No foreign key to owner tables: owners can live in any table, so removal
/// of an owner's rows is the job of the deletion hook.
const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    realm TEXT NOT NULL,
    owner_type TEXT NOT NULL,  -- up to 128 chars recommended
    owner_id INTEGER NOT NULL CHECK (owner_id >= 0),
    key TEXT NOT NULL,
    value TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (realm, owner_type, owner_id, key)
);

CREATE INDEX IF NOT EXISTS idx_meta_realm_type_key ON meta(realm, owner_type, key);
"#;

/// Type tag column; NULL for rows written before it existed
const SCHEMA_V2: &str = r#"
ALTER TABLE meta ADD COLUMN type TEXT
    CHECK (type IS NULL OR type IN ('string', 'int', 'float', 'boolean', 'null', 'array'));
"#;
