//! # dirstore-store
//!
//! Ordered key-value store abstraction used by the directory backend.
//! This crate isolates all direct RocksDB interactions, so the pluggable
//! backend only ever sees trees, cursors and transactions.
//!
//! ## Architecture
//!
//! ```text
//! dirstore-pluggable (DN2ID, indexes, import)
//!     ↓
//! dirstore-store (trees, cursors, transactions)
//!     ↓
//! RocksDB / in-memory
//! ```

pub mod cursor;
pub mod memory_impl;
pub mod rocksdb_impl;
pub mod rocksdb_init;
pub mod storage_trait;
pub mod tree;
pub mod typed_tree;

pub use cursor::{Cursor, CursorTransformer, RawCursor, SequentialCursor, VecCursor};
pub use memory_impl::InMemoryStorage;
pub use rocksdb_impl::RocksDbStorage;
pub use rocksdb_init::RocksDbInit;
pub use storage_trait::{
    Importer, ReadableTransaction, Result, Storage, StorageError, StorageExt, StorageStatus,
    UpdateFn, WriteableTransaction,
};
pub use tree::{count_records, Tree};
pub use typed_tree::{TreeKey, TypedCursor, TypedTree};

// Make test_utils available for testing in dependent crates
pub mod test_utils;
