//! Per-owner metadata facade
//!
//! [`HasMeta`] is implemented for every [`OwnerRef`], so any entity that can
//! name its type and id gets the full set of metadata operations:
//!
//! ```rust,ignore
//! use ownermeta_core::HasMeta;
//!
//! user.meta(&store).set_meta("theme", "dark")?;
//! let theme = user.meta(&store).get_meta_or("theme", "light")?;
//! ```

use crate::error::MetaResult;
use crate::owner::OwnerRef;
use crate::record::MetaRecord;
use crate::store::MetaStore;
use crate::value::MetaValue;
use std::collections::BTreeMap;

/// Metadata operations bound to one owner instance
pub struct OwnerMeta<'a, S: MetaStore + ?Sized> {
    store: &'a S,
    owner: &'a dyn OwnerRef,
}

impl<'a, S: MetaStore + ?Sized> OwnerMeta<'a, S> {
    pub fn new(store: &'a S, owner: &'a dyn OwnerRef) -> Self {
        Self { store, owner }
    }

    /// Set meta at the given key, overwriting any existing value
    pub fn set_meta(&self, key: &str, value: impl Into<MetaValue>) -> MetaResult<()> {
        self.store.upsert(self.owner, key, &value.into())
    }

    /// Create meta at the given key
    ///
    /// Fails with `AlreadyExists` if the key is already set.
    pub fn create_meta(&self, key: &str, value: impl Into<MetaValue>) -> MetaResult<()> {
        self.store.create_only(self.owner, key, &value.into())
    }

    /// Update meta at the given key
    ///
    /// Fails with `NotFound` if the key isn't set.
    pub fn update_meta(&self, key: &str, value: impl Into<MetaValue>) -> MetaResult<()> {
        self.store.update_only(self.owner, key, &value.into())
    }

    pub fn get_meta(&self, key: &str) -> MetaResult<Option<MetaValue>> {
        self.store.find(self.owner, key)
    }

    /// Value at `key`, or `default` when the key isn't set
    pub fn get_meta_or(&self, key: &str, default: impl Into<MetaValue>) -> MetaResult<MetaValue> {
        Ok(self
            .store
            .find(self.owner, key)?
            .unwrap_or_else(|| default.into()))
    }

    pub fn meta_exists(&self, key: &str) -> MetaResult<bool> {
        self.store.exists(self.owner, key)
    }

    pub fn count_meta(&self) -> MetaResult<usize> {
        self.store.count(self.owner)
    }

    pub fn all_meta(&self) -> MetaResult<BTreeMap<String, MetaValue>> {
        self.store.list_all(self.owner)
    }

    pub fn meta_keys(&self) -> MetaResult<Vec<String>> {
        self.store.list_keys(self.owner)
    }

    pub fn meta_records(&self) -> MetaResult<Vec<MetaRecord>> {
        self.store.records(self.owner)
    }

    /// Set several keys at once
    pub fn set_meta_many<I, K, V>(&self, entries: I) -> MetaResult<usize>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<MetaValue>,
    {
        let entries: Vec<(String, MetaValue)> = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.store.set_many(self.owner, &entries)
    }

    /// Remove one or many keys, returning the number of records deleted
    ///
    /// ```rust,ignore
    /// user.meta(&store).remove_meta(["a"])?;
    /// user.meta(&store).remove_meta(vec!["a", "b"])?;
    /// ```
    pub fn remove_meta<I, K>(&self, keys: I) -> MetaResult<usize>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.store.remove(self.owner, &keys)
    }

    /// Remove every key of the owner
    pub fn purge_meta(&self) -> MetaResult<usize> {
        self.store.purge_all(self.owner)
    }
}

/// Metadata accessor available on every owner
pub trait HasMeta: OwnerRef {
    fn meta<'a, S: MetaStore + ?Sized>(&'a self, store: &'a S) -> OwnerMeta<'a, S>;
}

impl<T: OwnerRef> HasMeta for T {
    fn meta<'a, S: MetaStore + ?Sized>(&'a self, store: &'a S) -> OwnerMeta<'a, S> {
        OwnerMeta::new(store, self)
    }
}
