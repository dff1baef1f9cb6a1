//! Integration tests for owner metadata
//!
//! Exercises the store, the per-owner facade and collection queries against a
//! real SQLite database with an owner table next to `meta`.

use ownermeta_core::{HasMeta, MetaError, MetaStore, MetaValue, OwnerKey, OwnerRef, OwnerTable};
use ownermeta_sqlite::{MetaQuery, SqliteConfig, SqliteMetaStore, SqlitePool};
use serde_json::json;
use std::collections::BTreeMap;
use std::thread;
use tempfile::TempDir;

#[derive(Debug, Clone, PartialEq)]
struct User {
    id: u64,
}

impl OwnerTable for User {
    const OWNER_TYPE: &'static str = "user";
    const TABLE: &'static str = "users";
}

impl OwnerRef for User {
    fn owner_type(&self) -> &str {
        Self::OWNER_TYPE
    }

    fn owner_id(&self) -> u64 {
        self.id
    }
}

/// Second owner type sharing ids with `User`
struct Team {
    id: u64,
}

impl OwnerTable for Team {
    const OWNER_TYPE: &'static str = "team";
    const TABLE: &'static str = "teams";
    const ID_COLUMN: &'static str = "team_id";
}

impl OwnerRef for Team {
    fn owner_type(&self) -> &str {
        Self::OWNER_TYPE
    }

    fn owner_id(&self) -> u64 {
        self.id
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_ansi(false)
        .without_time()
        .try_init();
}

/// Setup helper: owner tables on an in-memory database
fn setup() -> SqliteMetaStore {
    init_tracing();
    let pool = SqlitePool::memory().unwrap();
    create_owner_tables(&pool);
    SqliteMetaStore::new(pool)
}

fn create_owner_tables(pool: &SqlitePool) {
    pool.with_connection(|conn| {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS teams (
                team_id INTEGER PRIMARY KEY
            );
            "#,
        )?;
        Ok(())
    })
    .unwrap();
}

fn create_user(store: &SqliteMetaStore, id: u64, name: &str) -> User {
    store
        .pool()
        .with_connection(|conn| {
            conn.execute(
                "INSERT INTO users (id, name) VALUES (?1, ?2)",
                rusqlite::params![id as i64, name],
            )?;
            Ok(())
        })
        .unwrap();
    User { id }
}

#[test]
fn test_full_facade_lifecycle() {
    let store = setup();
    let user = create_user(&store, 1, "alice");
    let meta = user.meta(&store);

    meta.set_meta("age", 30).unwrap();
    meta.create_meta("verified", true).unwrap();
    meta.update_meta("age", 31).unwrap();
    meta.set_meta("tags", MetaValue::Array(json!(["admin", "ops"])))
        .unwrap();

    assert!(meta.meta_exists("verified").unwrap());
    assert_eq!(meta.count_meta().unwrap(), 3);
    assert_eq!(meta.get_meta("age").unwrap(), Some(MetaValue::Int(31)));

    let mut expected = BTreeMap::new();
    expected.insert("age".to_string(), MetaValue::Int(31));
    expected.insert("tags".to_string(), MetaValue::Array(json!(["admin", "ops"])));
    expected.insert("verified".to_string(), MetaValue::Bool(true));
    assert_eq!(meta.all_meta().unwrap(), expected);

    let mut keys = meta.meta_keys().unwrap();
    keys.sort();
    assert_eq!(keys, vec!["age", "tags", "verified"]);

    let records = meta.meta_records().unwrap();
    assert!(records.iter().all(|r| r.owner == user.owner_key()));
    assert!(records.iter().all(|r| r.realm == "owner-metadata"));
}

#[test]
fn test_default_fallback() {
    let store = setup();
    let user = create_user(&store, 1, "alice");

    assert_eq!(
        user.meta(&store).get_meta_or("missingKey", "fallback").unwrap(),
        MetaValue::from("fallback")
    );

    user.meta(&store).set_meta("missingKey", "present").unwrap();
    assert_eq!(
        user.meta(&store).get_meta_or("missingKey", "fallback").unwrap(),
        MetaValue::from("present")
    );
}

#[test]
fn test_removal() {
    let store = setup();
    let user = create_user(&store, 1, "alice");

    user.meta(&store).set_meta("k", "v").unwrap();
    assert_eq!(user.meta(&store).remove_meta(["k"]).unwrap(), 1);

    assert!(!user.meta(&store).meta_exists("k").unwrap());
    assert_eq!(user.meta(&store).count_meta().unwrap(), 0);
}

#[test]
fn test_remove_many_and_purge() {
    let store = setup();
    let user = create_user(&store, 1, "alice");
    let other = create_user(&store, 2, "bob");

    user.meta(&store)
        .set_meta_many([("a", 1), ("b", 2), ("c", 3)])
        .unwrap();
    other.meta(&store).set_meta("a", 1).unwrap();

    assert_eq!(user.meta(&store).remove_meta(vec!["a", "b", "nope"]).unwrap(), 2);
    assert_eq!(user.meta(&store).purge_meta().unwrap(), 1);
    assert_eq!(user.meta(&store).count_meta().unwrap(), 0);
    assert_eq!(other.meta(&store).count_meta().unwrap(), 1);
}

#[test]
fn test_create_and_update_guards() {
    let store = setup();
    let user = create_user(&store, 1, "alice");

    user.meta(&store).create_meta("plan", "free").unwrap();
    let err = user.meta(&store).create_meta("plan", "pro").unwrap_err();
    assert!(err.is_already_exists());
    assert!(err.to_string().contains("plan"));
    assert_eq!(
        user.meta(&store).get_meta("plan").unwrap(),
        Some(MetaValue::from("free"))
    );

    let err = user.meta(&store).update_meta("quota", 10).unwrap_err();
    assert_eq!(
        err,
        MetaError::NotFound {
            key: "quota".to_string()
        }
    );
    assert!(!user.meta(&store).meta_exists("quota").unwrap());
}

#[test]
fn test_owner_types_do_not_collide() {
    let store = setup();
    let user = create_user(&store, 1, "alice");
    let team = Team { id: 1 };

    user.meta(&store).set_meta("color", "red").unwrap();
    team.meta(&store).set_meta("color", "blue").unwrap();

    assert_eq!(
        user.meta(&store).get_meta("color").unwrap(),
        Some(MetaValue::from("red"))
    );
    assert_eq!(
        team.meta(&store).get_meta("color").unwrap(),
        Some(MetaValue::from("blue"))
    );
}

#[test]
fn test_cascade_on_owner_delete() {
    let store = setup();
    let user = create_user(&store, 1, "alice");
    let survivor = create_user(&store, 2, "bob");

    for i in 0..5 {
        user.meta(&store).set_meta(&format!("k{}", i), i).unwrap();
    }
    survivor.meta(&store).set_meta("k0", 0).unwrap();

    let deletion = store.delete_owner(&user).unwrap();
    assert!(deletion.owner_deleted);
    assert_eq!(deletion.meta_purged, 5);

    assert_eq!(user.meta(&store).count_meta().unwrap(), 0);
    assert_eq!(user.meta(&store).get_meta("k0").unwrap(), None);
    assert_eq!(survivor.meta(&store).count_meta().unwrap(), 1);
    assert_eq!(MetaQuery::<User>::new().fetch_ids(&store).unwrap(), vec![2]);
}

#[test]
fn test_owner_deleted_hook() {
    let store = setup();
    let user = create_user(&store, 1, "alice");
    user.meta(&store).set_meta_many([("a", 1), ("b", 2)]).unwrap();

    // Entity layer deletes the row itself, then notifies the store
    store
        .pool()
        .with_connection(|conn| {
            conn.execute("DELETE FROM users WHERE id = 1", [])?;
            Ok(())
        })
        .unwrap();
    assert_eq!(store.on_owner_deleted(&user).unwrap(), 2);
    assert_eq!(user.meta(&store).count_meta().unwrap(), 0);
}

#[test]
fn test_query_filters() {
    let store = setup();
    let a = create_user(&store, 1, "a");
    let b = create_user(&store, 2, "b");
    let c = create_user(&store, 3, "c");

    a.meta(&store).set_meta("age", 25).unwrap();
    b.meta(&store).set_meta("age", 15).unwrap();
    c.meta(&store).set_meta("city", "Oslo").unwrap();

    let adults = MetaQuery::<User>::new()
        .where_meta("age", ">=", 18)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(adults, vec![a.id]);

    let with_age = MetaQuery::<User>::new()
        .where_meta_key_exists(["age"])
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(with_age, vec![a.id, b.id]);

    let any_of = MetaQuery::<User>::new()
        .where_meta_key_exists(vec!["age", "city"])
        .count(&store)
        .unwrap();
    assert_eq!(any_of, 3);

    let err = MetaQuery::<User>::new()
        .where_meta("foo", "><", "bar")
        .unwrap_err();
    assert!(err.is_invalid_operator());
}

#[test]
fn test_ordering_is_numeric_not_lexical() {
    let store = setup();
    let small = create_user(&store, 1, "small");
    let big = create_user(&store, 2, "big");

    small.meta(&store).set_meta("score", 9).unwrap();
    big.meta(&store).set_meta("score", 10.5).unwrap();

    // Lexically "9" > "10.5"; numerically it isn't
    let over_ten = MetaQuery::<User>::new()
        .where_meta("score", ">", 10)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(over_ten, vec![big.id]);

    let at_most_nine = MetaQuery::<User>::new()
        .where_meta("score", "<=", "9")
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(at_most_nine, vec![small.id]);
}

#[test]
fn test_ordering_keeps_integer_precision() {
    let store = setup();
    let above = create_user(&store, 1, "above");
    let at = create_user(&store, 2, "at");

    // 2^53 + 1 and 2^53 are the same f64
    above.meta(&store).set_meta("n", 9_007_199_254_740_993_i64).unwrap();
    at.meta(&store).set_meta("n", 9_007_199_254_740_992_i64).unwrap();

    let greater = MetaQuery::<User>::new()
        .where_meta("n", ">", 9_007_199_254_740_992_i64)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(greater, vec![above.id]);

    let at_most = MetaQuery::<User>::new()
        .where_meta("n", "<=", 9_007_199_254_740_992_i64)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(at_most, vec![at.id]);

    let mixed = MetaQuery::<User>::new()
        .where_meta("n", ">", 9.0e15)
        .unwrap()
        .count(&store)
        .unwrap();
    assert_eq!(mixed, 2);
}

#[test]
fn test_ordering_on_non_numeric_text() {
    let store = setup();
    let word = create_user(&store, 1, "word");
    let prefixed = create_user(&store, 2, "prefixed");

    word.meta(&store).set_meta("label", "abc").unwrap();
    prefixed.meta(&store).set_meta("label", "12 apples").unwrap();

    // Text without a numeric prefix casts to 0
    let below_one = MetaQuery::<User>::new()
        .where_meta("label", "<", 1)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(below_one, vec![word.id]);

    // Otherwise the leading number is used
    let above_ten = MetaQuery::<User>::new()
        .where_meta("label", ">", 10)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(above_ten, vec![prefixed.id]);
}

#[test]
fn test_equality_uses_stored_encoding() {
    let store = setup();
    let a = create_user(&store, 1, "a");
    let b = create_user(&store, 2, "b");

    a.meta(&store).set_meta("roles", vec!["admin", "ops"]).unwrap();
    b.meta(&store).set_meta("roles", vec!["ops"]).unwrap();
    a.meta(&store).set_meta("active", true).unwrap();
    b.meta(&store).set_meta("active", false).unwrap();

    let admins = MetaQuery::<User>::new()
        .where_meta_eq("roles", vec!["admin", "ops"])
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(admins, vec![a.id]);

    let inactive = MetaQuery::<User>::new()
        .where_meta("active", "!=", true)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(inactive, vec![b.id]);

    let inactive_alt = MetaQuery::<User>::new()
        .where_meta("active", "<>", true)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(inactive_alt, inactive);

    let active = MetaQuery::<User>::new()
        .where_meta_eq("active", true)
        .unwrap()
        .where_meta_key_exists(["roles"])
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(active, vec![a.id]);
}

#[test]
fn test_query_respects_realm_and_owner_type() {
    let store = setup();
    let user = create_user(&store, 1, "alice");
    let team = Team { id: 2 };
    let other_realm = store.clone().with_realm("elsewhere");

    other_realm.upsert(&user, "age", &MetaValue::Int(40)).unwrap();
    // Metadata for a team whose id matches a user must not leak into user queries
    store.upsert(&OwnerKey::new("team", 1), "age", &MetaValue::Int(40)).unwrap();
    team.meta(&store).set_meta("age", 40).unwrap();

    let found = MetaQuery::<User>::new()
        .where_meta_key_exists(["age"])
        .fetch_ids(&store)
        .unwrap();
    assert!(found.is_empty());

    let found = MetaQuery::<User>::new()
        .where_meta_key_exists(["age"])
        .fetch_ids(&other_realm)
        .unwrap();
    assert_eq!(found, vec![user.id]);
}

#[test]
fn test_custom_id_column() {
    let store = setup();
    store
        .pool()
        .with_connection(|conn| {
            conn.execute("INSERT INTO teams (team_id) VALUES (7), (8)", [])?;
            Ok(())
        })
        .unwrap();
    Team { id: 8 }.meta(&store).set_meta("size", 12).unwrap();

    let ids = MetaQuery::<Team>::new()
        .where_meta("size", ">", 10)
        .unwrap()
        .fetch_ids(&store)
        .unwrap();
    assert_eq!(ids, vec![8]);

    let deletion = store.delete_owner(&Team { id: 8 }).unwrap();
    assert_eq!(deletion.meta_purged, 1);
}

#[test]
fn test_persists_across_reopen() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("meta.db");
    let owner = OwnerKey::new("user", 5);

    {
        let store = SqliteMetaStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap());
        owner.meta(&store).set_meta("pi", 1.625).unwrap();
    }

    let store = SqliteMetaStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap());
    assert_eq!(
        owner.meta(&store).get_meta("pi").unwrap(),
        Some(MetaValue::Float(1.625))
    );
}

#[test]
fn test_concurrent_upserts_keep_one_record() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("race.db");

    // Open sequentially so migrations don't race; writes then go through
    // separate connections, like separate processes would
    let stores: Vec<SqliteMetaStore> = (0..8)
        .map(|_| SqliteMetaStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap()))
        .collect();

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(i, store)| {
            thread::spawn(move || {
                let owner = OwnerKey::new("user", 1);
                for round in 0..20 {
                    store
                        .upsert(&owner, "counter", &MetaValue::Int((i * 100 + round) as i64))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let store = SqliteMetaStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap());
    let owner = OwnerKey::new("user", 1);
    assert_eq!(store.count(&owner).unwrap(), 1);
    assert!(matches!(
        store.find(&owner, "counter").unwrap(),
        Some(MetaValue::Int(_))
    ));
}

#[test]
fn test_concurrent_creates_have_one_winner() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("create.db");

    let stores: Vec<SqliteMetaStore> = (0..6)
        .map(|_| SqliteMetaStore::new(SqlitePool::new(SqliteConfig::new(&path)).unwrap()))
        .collect();

    let handles: Vec<_> = stores
        .into_iter()
        .enumerate()
        .map(|(i, store)| {
            thread::spawn(move || {
                store.create_only(&OwnerKey::new("user", 1), "owner", &MetaValue::Int(i as i64))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(MetaError::is_already_exists));
}
