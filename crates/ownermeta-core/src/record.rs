//! Materialised metadata rows

use crate::owner::OwnerKey;
use crate::value::{MetaValue, TypeTag};
use chrono::{DateTime, Utc};

/// One metadata record, decoded
#[derive(Debug, Clone, PartialEq)]
pub struct MetaRecord {
    pub realm: String,
    pub owner: OwnerKey,
    pub key: String,
    pub value: MetaValue,
    /// `None` for rows written before values were tagged
    pub type_tag: Option<TypeTag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
