//! Owner identity
//!
//! Metadata is attached to an owner by `(owner_type, owner_id)`. The store never
//! sees any other field of the owning entity.

use std::fmt;

/// Identity of one owner instance
pub trait OwnerRef {
    /// Stable identifier of the owner's concrete type (e.g. `"user"`)
    fn owner_type(&self) -> &str;

    /// Primary key of the owner
    fn owner_id(&self) -> u64;

    fn owner_key(&self) -> OwnerKey {
        OwnerKey::new(self.owner_type(), self.owner_id())
    }
}

impl<T: OwnerRef + ?Sized> OwnerRef for &T {
    fn owner_type(&self) -> &str {
        (**self).owner_type()
    }

    fn owner_id(&self) -> u64 {
        (**self).owner_id()
    }
}

/// Registration of an owner type that lives in its own table
///
/// Used by collection queries, which need to know where owners are stored and
/// which type id their metadata rows carry.
pub trait OwnerTable {
    /// Value written to `owner_type` for every instance of this type
    const OWNER_TYPE: &'static str;

    /// Table holding the owners
    const TABLE: &'static str;

    /// Primary key column of [`Self::TABLE`]
    const ID_COLUMN: &'static str = "id";
}

/// Owned `(owner_type, owner_id)` pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerKey {
    pub owner_type: String,
    pub owner_id: u64,
}

impl OwnerKey {
    pub fn new(owner_type: impl Into<String>, owner_id: u64) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id,
        }
    }

    /// Key for an instance of a registered owner type
    pub fn of<T: OwnerTable>(owner_id: u64) -> Self {
        Self::new(T::OWNER_TYPE, owner_id)
    }
}

impl OwnerRef for OwnerKey {
    fn owner_type(&self) -> &str {
        &self.owner_type
    }

    fn owner_id(&self) -> u64 {
        self.owner_id
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner_type, self.owner_id)
    }
}
