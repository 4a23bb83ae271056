//! Typed record access on top of raw trees.
//!
//! ```text
//! TypedTree<K, V>        ← typed put/get/delete/cursor (this file)
//!     ↓
//! WriteableTransaction   ← raw byte operations (storage_trait.rs)
//!     ↓
//! RocksDB / in-memory
//! ```
//!
//! Values go through [`KSerializable`] (bincode by default); keys through
//! [`TreeKey`], which must preserve ordering.

use crate::cursor::{CursorTransformer, RawCursor};
use crate::storage_trait::{ReadableTransaction, Result, WriteableTransaction};
use dirstore_commons::{EntryId, KSerializable, TreeName};

/// Key types that can be stored as tree keys.
///
/// Byte order of the encoded form must match the order of the keys.
pub trait TreeKey: Sized {
    fn to_key_bytes(&self) -> Vec<u8>;
    fn from_key_bytes(bytes: &[u8]) -> Result<Self>;
}

impl TreeKey for EntryId {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.to_bytes().to_vec()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(EntryId::from_bytes(bytes)?)
    }
}

impl TreeKey for Vec<u8> {
    fn to_key_bytes(&self) -> Vec<u8> {
        self.clone()
    }

    fn from_key_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// Typed cursor produced by [`TypedTree::open_typed_cursor`].
pub type TypedCursor<'t, K, V> = CursorTransformer<'static, RawCursor<'t>, K, V>;

/// Typed view of one tree.
///
/// ## Example
///
/// ```rust
/// use dirstore_commons::{EntryId, TreeName};
/// use dirstore_store::{InMemoryStorage, Storage, StorageExt, TypedTree};
///
/// struct Names(TreeName);
///
/// impl TypedTree<EntryId, String> for Names {
///     fn tree_name(&self) -> &TreeName {
///         &self.0
///     }
/// }
///
/// let storage = InMemoryStorage::new();
/// let names = Names(TreeName::new("o=test", "names"));
/// storage
///     .write(|txn| {
///         txn.open_tree(names.tree_name(), true)?;
///         names.put(txn, &EntryId::new(1), &"root".to_string())
///     })
///     .unwrap();
///
/// let txn = storage.begin_read().unwrap();
/// assert_eq!(names.get(txn.as_ref(), &EntryId::new(1)).unwrap(), Some("root".to_string()));
/// ```
pub trait TypedTree<K, V>
where
    K: TreeKey + Clone + std::fmt::Debug + 'static,
    V: KSerializable + Clone + 'static,
{
    fn tree_name(&self) -> &TreeName;

    fn put(&self, txn: &mut dyn WriteableTransaction, key: &K, value: &V) -> Result<()> {
        txn.put(self.tree_name(), &key.to_key_bytes(), &value.encode()?)
    }

    fn get<T>(&self, txn: &T, key: &K) -> Result<Option<V>>
    where
        T: ReadableTransaction + ?Sized,
        Self: Sized,
    {
        match txn.read(self.tree_name(), &key.to_key_bytes())? {
            Some(bytes) => Ok(Some(V::decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Returns `true` if the key existed.
    fn delete(&self, txn: &mut dyn WriteableTransaction, key: &K) -> Result<bool> {
        txn.delete(self.tree_name(), &key.to_key_bytes())
    }

    /// Cursor decoding keys and values on access.
    fn open_typed_cursor<'t, T>(&self, txn: &'t T) -> Result<TypedCursor<'t, K, V>>
    where
        T: ReadableTransaction + ?Sized,
        Self: Sized,
    {
        let raw = txn.open_cursor(self.tree_name())?;
        Ok(CursorTransformer::transform_keys_and_values(
            raw,
            |key: &Vec<u8>| K::from_key_bytes(key),
            |_key: &Vec<u8>, value: &Vec<u8>| Ok(V::decode(value)?),
        ))
    }
}
