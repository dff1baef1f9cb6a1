//! Metadata Record Store trait
//!
//! CRUD over metadata rows keyed by `(realm, owner_type, owner_id, key)`. The
//! realm is fixed per store instance; every operation is scoped to one owner.
//!
//! ## Uniqueness
//!
//! At most one record exists per `(realm, owner_type, owner_id, key)`.
//! Implementations must let the backing store's unique constraint arbitrate
//! concurrent writers: a lost insert race in [`MetaStore::upsert`] is retried
//! once as an update, and in [`MetaStore::create_only`] it is reported as
//! [`MetaError::AlreadyExists`](crate::MetaError::AlreadyExists). Check-then-act is only an optimisation.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use ownermeta_core::{MetaResult, MetaStore, MetaValue, OwnerKey};
//!
//! fn tag_user<S: MetaStore>(store: &S) -> MetaResult<()> {
//!     let owner = OwnerKey::new("user", 1);
//!     store.upsert(&owner, "theme", &MetaValue::from("dark"))?;
//!     assert!(store.exists(&owner, "theme")?);
//!     Ok(())
//! }
//! ```

use crate::error::MetaResult;
use crate::owner::OwnerRef;
use crate::record::MetaRecord;
use crate::value::MetaValue;
use std::collections::BTreeMap;
use tracing::warn;

/// Realm used when none is configured
pub const DEFAULT_REALM: &str = "owner-metadata";

/// Record store scoped by realm and owner
pub trait MetaStore: Send + Sync {
    /// Realm every record of this store is written to
    fn realm(&self) -> &str;

    /// Insert the key, or overwrite its value and type tag if present
    fn upsert(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()>;

    /// Insert the key
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::AlreadyExists`](crate::MetaError::AlreadyExists) and changes nothing if the owner
    /// already has a record for `key`.
    fn create_only(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()>;

    /// Overwrite an existing key
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::NotFound`](crate::MetaError::NotFound) and changes nothing if the owner has no
    /// record for `key`.
    fn update_only(&self, owner: &dyn OwnerRef, key: &str, value: &MetaValue) -> MetaResult<()>;

    /// Decoded value for `key`, if any
    fn find(&self, owner: &dyn OwnerRef, key: &str) -> MetaResult<Option<MetaValue>>;

    fn exists(&self, owner: &dyn OwnerRef, key: &str) -> MetaResult<bool>;

    /// Number of records the owner has
    fn count(&self, owner: &dyn OwnerRef) -> MetaResult<usize>;

    /// Every key of the owner with its decoded value
    fn list_all(&self, owner: &dyn OwnerRef) -> MetaResult<BTreeMap<String, MetaValue>>;

    /// Keys of the owner, in the backend's scan order
    fn list_keys(&self, owner: &dyn OwnerRef) -> MetaResult<Vec<String>>;

    /// Full records of the owner, in the backend's scan order
    fn records(&self, owner: &dyn OwnerRef) -> MetaResult<Vec<MetaRecord>>;

    /// Delete the given keys, returning how many records were removed
    fn remove(&self, owner: &dyn OwnerRef, keys: &[String]) -> MetaResult<usize>;

    /// Delete every record of the owner, returning how many were removed
    fn purge_all(&self, owner: &dyn OwnerRef) -> MetaResult<usize>;

    /// Upsert several keys
    ///
    /// Backends that support transactions should apply all entries atomically.
    fn set_many(&self, owner: &dyn OwnerRef, entries: &[(String, MetaValue)]) -> MetaResult<usize> {
        for (key, value) in entries {
            self.upsert(owner, key, value)?;
        }
        Ok(entries.len())
    }

    /// Deletion hook, called by the entity layer once an owner is destroyed
    ///
    /// Purges the owner's metadata. A failure is logged and returned; it does
    /// not undo the entity deletion that already happened.
    fn on_owner_deleted(&self, owner: &dyn OwnerRef) -> MetaResult<usize> {
        self.purge_all(owner).map_err(|e| {
            warn!(
                realm = self.realm(),
                owner_type = owner.owner_type(),
                owner_id = owner.owner_id(),
                error = %e,
                "Failed to purge metadata of deleted owner"
            );
            e
        })
    }
}
