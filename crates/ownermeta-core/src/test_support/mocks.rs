//! Mock Implementations for Testing
//!
//! [`MockMetaStore`] keeps records in a `BTreeMap` behind a mutex. Values go
//! through the real codec so tests observe the same round-trip behaviour as a
//! database-backed store.
//!
//! ```rust
//! use ownermeta_core::test_support::mocks::MockMetaStore;
//! use ownermeta_core::{HasMeta, OwnerKey};
//!
//! let store = MockMetaStore::new();
//! let owner = OwnerKey::new("user", 1);
//! owner.meta(&store).set_meta("theme", "dark").unwrap();
//! assert_eq!(store.stats().upserts, 1);
//! ```

use crate::error::{MetaError, MetaResult};
use crate::owner::{OwnerKey, OwnerRef};
use crate::record::MetaRecord;
use crate::store::{MetaStore, DEFAULT_REALM};
use crate::value::{decode_tagged, encode, EncodedValue, MetaValue};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredRow {
    encoded: EncodedValue,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

type RowKey = (OwnerKey, String);

/// Operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockStats {
    pub upserts: usize,
    pub creates: usize,
    pub updates: usize,
    pub reads: usize,
    pub deletes: usize,
}

/// In-memory [`MetaStore`]
#[derive(Debug)]
pub struct MockMetaStore {
    realm: String,
    rows: Mutex<BTreeMap<RowKey, StoredRow>>,
    stats: Mutex<MockStats>,
    fail_purges: AtomicBool,
}

impl Default for MockMetaStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMetaStore {
    pub fn new() -> Self {
        Self::with_realm(DEFAULT_REALM)
    }

    pub fn with_realm(realm: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            rows: Mutex::new(BTreeMap::new()),
            stats: Mutex::new(MockStats::default()),
            fail_purges: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> MockStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Make `purge_all` fail with a storage error
    pub fn fail_purges(&self, fail: bool) {
        self.fail_purges.store(fail, Ordering::SeqCst);
    }

    fn rows(&self) -> MetaResult<std::sync::MutexGuard<'_, BTreeMap<RowKey, StoredRow>>> {
        self.rows
            .lock()
            .map_err(|_| MetaError::storage("mock store poisoned"))
    }

    fn track(&self, f: impl FnOnce(&mut MockStats)) {
        if let Ok(mut stats) = self.stats.lock() {
            f(&mut stats);
        }
    }

    fn write(
        rows: &mut BTreeMap<RowKey, StoredRow>,
        row_key: RowKey,
        value: &MetaValue,
    ) -> MetaResult<()> {
        let encoded = encode(value)?;
        let now = Utc::now();
        rows.entry(row_key)
            .and_modify(|row| {
                row.encoded = encoded.clone();
                row.updated_at = now;
            })
            .or_insert_with(|| StoredRow {
                encoded,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    fn owned_rows<'r>(
        rows: &'r BTreeMap<RowKey, StoredRow>,
        owner: &'r OwnerKey,
    ) -> impl Iterator<Item = (&'r String, &'r StoredRow)> + 'r {
        rows.iter()
            .filter(move |((o, _), _)| o == owner)
            .map(|((_, key), row)| (key, row))
    }
}

impl MetaStore for MockMetaStore {
    fn realm(&self) -> &str {
        &self.realm
    }

    fn upsert(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()> {
        self.track(|s| s.upserts += 1);
        let mut rows = self.rows()?;
        Self::write(&mut rows, (owner.owner_key(), key.to_string()), value)
    }

    fn create_only(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()> {
        self.track(|s| s.creates += 1);
        let mut rows = self.rows()?;
        let row_key = (owner.owner_key(), key.to_string());
        if rows.contains_key(&row_key) {
            return Err(MetaError::AlreadyExists {
                key: key.to_string(),
            });
        }
        Self::write(&mut rows, row_key, value)
    }

    fn update_only(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()> {
        self.track(|s| s.updates += 1);
        let mut rows = self.rows()?;
        let row_key = (owner.owner_key(), key.to_string());
        if !rows.contains_key(&row_key) {
            return Err(MetaError::NotFound {
                key: key.to_string(),
            });
        }
        Self::write(&mut rows, row_key, value)
    }

    fn find(&self, owner: &dyn OwnerRef, key: &str) -> MetaResult<Option<MetaValue>> {
        self.track(|s| s.reads += 1);
        let rows = self.rows()?;
        rows.get(&(owner.owner_key(), key.to_string()))
            .map(|row| decode_tagged(&row.encoded.value, row.encoded.tag))
            .transpose()
    }

    fn exists(&self, owner: &dyn OwnerRef, key: &str) -> MetaResult<bool> {
        self.track(|s| s.reads += 1);
        Ok(self
            .rows()?
            .contains_key(&(owner.owner_key(), key.to_string())))
    }

    fn count(&self, owner: &dyn OwnerRef) -> MetaResult<usize> {
        self.track(|s| s.reads += 1);
        let owner = owner.owner_key();
        Ok(Self::owned_rows(&*self.rows()?, &owner).count())
    }

    fn list_all(&self, owner: &dyn OwnerRef) -> MetaResult<BTreeMap<String, MetaValue>> {
        self.track(|s| s.reads += 1);
        let owner = owner.owner_key();
        let rows = self.rows()?;
        Self::owned_rows(&rows, &owner)
            .map(|(key, row)| {
                decode_tagged(&row.encoded.value, row.encoded.tag).map(|v| (key.clone(), v))
            })
            .collect()
    }

    fn list_keys(&self, owner: &dyn OwnerRef) -> MetaResult<Vec<String>> {
        self.track(|s| s.reads += 1);
        let owner = owner.owner_key();
        let rows = self.rows()?;
        Ok(Self::owned_rows(&rows, &owner)
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn records(&self, owner: &dyn OwnerRef) -> MetaResult<Vec<MetaRecord>> {
        self.track(|s| s.reads += 1);
        let owner = owner.owner_key();
        let rows = self.rows()?;
        Self::owned_rows(&rows, &owner)
            .map(|(key, row)| {
                Ok(MetaRecord {
                    realm: self.realm.clone(),
                    owner: owner.clone(),
                    key: key.clone(),
                    value: decode_tagged(&row.encoded.value, row.encoded.tag)?,
                    type_tag: Some(row.encoded.tag),
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    fn remove(&self, owner: &dyn OwnerRef, keys: &[String]) -> MetaResult<usize> {
        self.track(|s| s.deletes += 1);
        let owner = owner.owner_key();
        let mut rows = self.rows()?;
        let removed = keys
            .iter()
            .filter(|key| rows.remove(&(owner.clone(), (*key).clone())).is_some())
            .count();
        Ok(removed)
    }

    fn purge_all(&self, owner: &dyn OwnerRef) -> MetaResult<usize> {
        self.track(|s| s.deletes += 1);
        if self.fail_purges.load(Ordering::SeqCst) {
            return Err(MetaError::storage("injected purge failure"));
        }
        let owner = owner.owner_key();
        let mut rows = self.rows()?;
        let before = rows.len();
        rows.retain(|(o, _), _| *o != owner);
        Ok(before - rows.len())
    }
}
