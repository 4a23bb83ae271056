//! # dirstore-pluggable
//!
//! Directory backend logic built on the ordered store of `dirstore-store`.
//!
//! ## Architecture
//!
//! ```text
//! RootContainer                     one per storage, owns the entry ID counter
//!   └── EntryContainer              one per base DN
//!         ├── Dn2Id                 DN → entry ID, children/subtree cursors
//!         ├── Id2Entry              entry ID → entry
//!         │     └── CompressedSchema  attribute / object class tokens
//!         ├── Index (id2children, id2subtree, attribute indexes)
//!         ├── VlvIndex              sorted entry lists
//!         └── State                 per-index trust/encoding flags
//! ```
//!
//! Online writes go through [`IndexBuffer`] so each index key is touched once
//! per transaction. Bulk loads go through [`import`].

pub mod attribute_index;
pub mod codec;
pub mod compressed_schema;
pub mod dn2id;
pub mod dn_key;
pub mod entry_container;
pub mod entry_id_set;
pub mod error;
pub mod id2entry;
pub mod import;
pub mod index;
pub mod index_buffer;
pub mod root_container;
pub mod state;
pub mod vlv_index;

pub use attribute_index::AttributeIndex;
pub use codec::CodecVersion;
pub use compressed_schema::{CompressedEntry, CompressedSchema};
pub use dn2id::{ChildrenCursor, Dn2Id, SubtreeCursor};
pub use entry_container::{EntryContainer, IndexStatus};
pub use entry_id_set::EntryIdSet;
pub use error::{DirectoryError, Result, ResultCode};
pub use id2entry::{EntryRecord, Id2Entry};
pub use import::{import_ldif, import_ldif_file, ImportConfig, LdifImportResult};
pub use index::{DefaultIndex, ImportIdSet, Index, NullIndex, TrustState};
pub use index_buffer::IndexBuffer;
pub use root_container::{EntryIdSequence, RootContainer};
pub use state::{IndexFlags, State};
pub use vlv_index::VlvIndex;
