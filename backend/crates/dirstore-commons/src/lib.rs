//! # dirstore-commons
//!
//! Shared types used across the dirstore crates.
//!
//! ## Type-Safe Wrappers
//!
//! - `EntryId`: server-assigned, monotonically increasing entry identifier
//! - `Dn` / `Rdn`: distinguished names with a normalized, order-preserving form
//! - `TreeName`: identifies one ordered key-value tree (base DN + index id)
//! - `Entry`: a directory entry (DN plus attribute values)
//!
//! ## Example Usage
//!
//! ```rust
//! use dirstore_commons::{Dn, EntryId, TreeName};
//!
//! let base = Dn::parse("dc=example,dc=com").unwrap();
//! let people = Dn::parse("ou=People,dc=example,dc=com").unwrap();
//! assert!(base.is_superior_or_equal_to(&people));
//!
//! let id = EntryId::new(42);
//! assert_eq!(EntryId::from_bytes(&id.to_bytes()).unwrap(), id);
//!
//! let dn2id = TreeName::new(base.to_normalized_string(), "dn2id");
//! assert_eq!(dn2id.storage_name(), "dc=example,dc=com/dn2id");
//! ```

pub mod dn;
pub mod entry;
pub mod errors;
pub mod ids;
pub mod serialization;
pub mod tree_name;

pub use dn::{Dn, Rdn};
pub use entry::Entry;
pub use errors::{CommonError, Result};
pub use ids::EntryId;
pub use serialization::KSerializable;
pub use tree_name::TreeName;
