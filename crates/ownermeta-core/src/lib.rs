//! Typed key-value metadata for arbitrary owner entities
//!
//! Any row in any table can carry metadata, addressed by the owner's type id and
//! primary key. This crate holds the backend-agnostic pieces; storage backends
//! implement [`MetaStore`].
//!
//! ## Layers
//!
//! - **value**: codec turning [`MetaValue`]s into stored text plus a type tag
//! - **store**: the [`MetaStore`] record store contract
//! - **handle**: [`HasMeta`], the per-owner facade (`user.meta(&store).set_meta(..)`)
//! - **filter**: [`MetaFilter`] predicates used by collection queries
//!
//! ## Usage
//!
//! ```rust
//! use ownermeta_core::test_support::mocks::MockMetaStore;
//! use ownermeta_core::{HasMeta, MetaValue, OwnerKey};
//!
//! let store = MockMetaStore::new();
//! let user = OwnerKey::new("user", 42);
//!
//! user.meta(&store).set_meta("age", 25).unwrap();
//! assert_eq!(user.meta(&store).get_meta("age").unwrap(), Some(MetaValue::Int(25)));
//! ```

pub mod error;
pub mod filter;
pub mod handle;
pub mod owner;
pub mod record;
pub mod store;
pub mod test_support;
pub mod value;

pub use error::{MetaError, MetaResult};
pub use filter::{MetaFilter, Operator};
pub use handle::{HasMeta, OwnerMeta};
pub use owner::{OwnerKey, OwnerRef, OwnerTable};
pub use record::MetaRecord;
pub use store::{MetaStore, DEFAULT_REALM};
pub use value::{decode, encode, EncodedValue, MetaValue, TypeTag};
