//! Transactional ordered key-value store abstraction.
//!
//! Every piece of directory data lives in a named, byte-ordered tree
//! ([`TreeName`]). Engines expose those trees through three access paths:
//!
//! - [`ReadableTransaction`]: point reads, cursors and record counts
//! - [`WriteableTransaction`]: tree lifecycle, writes, read-modify-write and
//!   commit/rollback. A transaction always sees its own prior writes.
//! - [`Importer`]: non-transactional bulk access used by LDIF import
//!
//! ## Engine Model
//!
//! - **RocksDB**: tree = column family, transaction = `TransactionDB` transaction
//! - **In-memory**: tree = `BTreeMap`, transaction = exclusive lock + undo log
//!
//! ## Example Usage
//!
//! ```rust
//! use dirstore_commons::TreeName;
//! use dirstore_store::{InMemoryStorage, StorageExt};
//!
//! let storage = InMemoryStorage::new();
//! let tree = TreeName::new("dc=example,dc=com", "dn2id");
//!
//! storage
//!     .write(|txn| {
//!         txn.open_tree(&tree, true)?;
//!         txn.put(&tree, b"key", b"value")
//!     })
//!     .unwrap();
//!
//! let value = storage.read(|txn| txn.read(&tree, b"key")).unwrap();
//! assert_eq!(value, Some(b"value".to_vec()));
//! ```

use crate::cursor::RawCursor;
use dirstore_commons::{CommonError, TreeName};
use std::any::Any;
use std::fmt;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// The tree was never opened or has been deleted
    #[error("Tree not found: {0}")]
    TreeNotFound(TreeName),

    /// Failure reported by the underlying engine
    #[error("I/O error: {0}")]
    Io(String),

    /// Stored bytes are not what the reader expects
    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A cursor transform failed; carries the untransformed record
    #[error("Unable to transform record (key: {key}, value: {value}): {reason}")]
    Transformation {
        key: String,
        value: String,
        reason: String,
    },

    /// `key()`/`value()` called on a cursor that is not on a record
    #[error("Cursor is not positioned on a record")]
    CursorNotPositioned,

    /// The storage is locked down and refuses writes
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    /// An internal consistency rule was broken; not recoverable locally
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Storage error: {0}")]
    Other(String),
}

impl StorageError {
    pub fn io(err: impl fmt::Display) -> Self {
        Self::Io(err.to_string())
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}

impl From<CommonError> for StorageError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Serialization(msg) => StorageError::Serialization(msg),
            other => StorageError::Other(other.to_string()),
        }
    }
}

/// Health of the storage, consulted before accepting new writes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StorageStatus {
    /// Fully usable
    #[default]
    Working,
    /// Still accepts writes but is running short of resources
    LowSpace(String),
    /// Rejects all writes
    LockedDown(String),
}

impl StorageStatus {
    pub fn is_working(&self) -> bool {
        matches!(self, StorageStatus::Working)
    }

    pub fn can_write(&self) -> bool {
        !matches!(self, StorageStatus::LockedDown(_))
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            StorageStatus::Working => None,
            StorageStatus::LowSpace(reason) | StorageStatus::LockedDown(reason) => Some(reason),
        }
    }
}

/// Read access to trees.
pub trait ReadableTransaction {
    /// Point read. `Ok(None)` if the key is absent.
    fn read(&self, tree: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Opens an unpositioned cursor over the whole tree.
    fn open_cursor(&self, tree: &TreeName) -> Result<RawCursor<'_>>;

    /// Exact number of records, or `None` when the engine cannot count
    /// without scanning.
    fn record_count(&self, tree: &TreeName) -> Result<Option<u64>>;
}

/// Read-modify-write callback: receives the current value and returns the
/// new one. `None` deletes the key.
pub type UpdateFn<'f> = dyn FnMut(Option<&[u8]>) -> Result<Option<Vec<u8>>> + 'f;

/// Read/write access to trees.
///
/// Dropping a transaction without calling [`WriteableTransaction::commit`]
/// rolls it back.
pub trait WriteableTransaction: ReadableTransaction {
    /// Opens a tree, creating it when `create_on_demand` is set.
    /// Returns `true` if the tree was created by this call.
    fn open_tree(&mut self, tree: &TreeName, create_on_demand: bool) -> Result<bool>;

    /// Removes a tree and all of its content. Deleting a missing tree is a no-op.
    fn delete_tree(&mut self, tree: &TreeName) -> Result<()>;

    fn put(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<()>;

    /// Inserts only if the key is absent. Returns `true` if a write happened.
    fn put_if_absent(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<bool> {
        if self.read(tree, key)?.is_some() {
            return Ok(false);
        }
        self.put(tree, key, value)?;
        Ok(true)
    }

    /// Atomic read-modify-write of one key.
    ///
    /// Returning the unchanged value performs no write. Returns `true` if the
    /// key was written or deleted.
    fn update(&mut self, tree: &TreeName, key: &[u8], f: &mut UpdateFn<'_>) -> Result<bool> {
        let old = self.read(tree, key)?;
        let new = f(old.as_deref())?;
        match (old, new) {
            (old, Some(new)) if old.as_deref() == Some(new.as_slice()) => Ok(false),
            (_, Some(new)) => {
                self.put(tree, key, &new)?;
                Ok(true)
            }
            (Some(_), None) => self.delete(tree, key),
            (None, None) => Ok(false),
        }
    }

    /// Deletes a key. Returns `true` if it existed.
    fn delete(&mut self, tree: &TreeName, key: &[u8]) -> Result<bool>;

    fn commit(self: Box<Self>) -> Result<()>;

    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Non-transactional bulk access for the initial load.
///
/// Implementations are shared by the import worker threads.
pub trait Importer: Send + Sync {
    /// Empties a tree, creating it if needed.
    fn clear_tree(&self, tree: &TreeName) -> Result<()>;

    fn put(&self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<()>;

    fn read(&self, tree: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn delete(&self, tree: &TreeName, key: &[u8]) -> Result<bool>;

    /// Flushes whatever the engine buffered.
    fn close(self: Box<Self>) -> Result<()>;
}

/// A storage engine holding a set of trees.
pub trait Storage: Send + Sync {
    fn begin_read(&self) -> Result<Box<dyn ReadableTransaction + '_>>;

    /// Fails with [`StorageError::Unavailable`] when the storage is locked down.
    fn begin_write(&self) -> Result<Box<dyn WriteableTransaction + '_>>;

    fn start_import(&self) -> Result<Box<dyn Importer + '_>>;

    fn list_trees(&self) -> Result<Vec<TreeName>>;

    fn status(&self) -> StorageStatus;

    fn close(&self) -> Result<()>;

    /// Downcast support for callers that need the concrete engine.
    fn as_any(&self) -> &dyn Any;
}

/// Closure-scoped transactions.
pub trait StorageExt: Storage {
    /// Runs `f` inside a read transaction.
    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&dyn ReadableTransaction) -> Result<T>,
    {
        let txn = self.begin_read()?;
        f(txn.as_ref())
    }

    /// Runs `f` inside a write transaction; commits on `Ok`, rolls back on `Err`.
    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn WriteableTransaction) -> Result<T>,
    {
        let mut txn = self.begin_write()?;
        match f(txn.as_mut()) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = txn.rollback() {
                    log::warn!("Rollback after '{}' failed: {}", err, rollback_err);
                }
                Err(err)
            }
        }
    }
}

impl<S: Storage + ?Sized> StorageExt for S {}
