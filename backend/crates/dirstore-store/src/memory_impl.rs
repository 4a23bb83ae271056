//! In-memory implementation of the [`Storage`] trait.
//!
//! Trees are `BTreeMap`s behind one `parking_lot::RwLock`. Read transactions
//! share the lock, a write transaction holds it exclusively for its whole
//! lifetime and records an undo log that is replayed if the transaction is
//! dropped without being committed.

use crate::cursor::{Cursor, RawCursor, SequentialCursor};
use crate::storage_trait::{
    Importer, ReadableTransaction, Result, Storage, StorageError, StorageStatus,
    WriteableTransaction,
};
use dirstore_commons::TreeName;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::any::Any;
use std::collections::BTreeMap;
use std::ops::Bound;

type TreeData = BTreeMap<Vec<u8>, Vec<u8>>;
type Trees = BTreeMap<TreeName, TreeData>;

/// In-memory ordered store.
///
/// ## Example
///
/// ```rust
/// use dirstore_commons::TreeName;
/// use dirstore_store::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::new();
/// let tree = TreeName::new("o=test", "id2entry");
/// let mut txn = storage.begin_write().unwrap();
/// txn.open_tree(&tree, true).unwrap();
/// txn.put(&tree, b"k", b"v").unwrap();
/// txn.commit().unwrap();
///
/// assert_eq!(storage.list_trees().unwrap(), vec![tree]);
/// ```
pub struct InMemoryStorage {
    trees: RwLock<Trees>,
    fast_count: bool,
    status: RwLock<StorageStatus>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            trees: RwLock::new(BTreeMap::new()),
            fast_count: true,
            status: RwLock::new(StorageStatus::Working),
        }
    }

    /// Disables exact record counts so callers take the cursor-scan path.
    pub fn without_fast_count() -> Self {
        Self {
            fast_count: false,
            ..Self::new()
        }
    }

    pub fn set_status(&self, status: StorageStatus) {
        *self.status.write() = status;
    }

    fn ensure_writable(&self) -> Result<()> {
        match &*self.status.read() {
            StorageStatus::LockedDown(reason) => Err(StorageError::Unavailable(reason.clone())),
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn tree<'t>(trees: &'t Trees, name: &TreeName) -> Result<&'t TreeData> {
    trees
        .get(name)
        .ok_or_else(|| StorageError::TreeNotFound(name.clone()))
}

fn tree_mut<'t>(trees: &'t mut Trees, name: &TreeName) -> Result<&'t mut TreeData> {
    trees
        .get_mut(name)
        .ok_or_else(|| StorageError::TreeNotFound(name.clone()))
}

impl Storage for InMemoryStorage {
    fn begin_read(&self) -> Result<Box<dyn ReadableTransaction + '_>> {
        Ok(Box::new(MemoryReadTransaction {
            trees: self.trees.read(),
            fast_count: self.fast_count,
        }))
    }

    fn begin_write(&self) -> Result<Box<dyn WriteableTransaction + '_>> {
        self.ensure_writable()?;
        Ok(Box::new(MemoryWriteTransaction {
            trees: self.trees.write(),
            undo: Vec::new(),
            fast_count: self.fast_count,
            finished: false,
        }))
    }

    fn start_import(&self) -> Result<Box<dyn Importer + '_>> {
        self.ensure_writable()?;
        Ok(Box::new(MemoryImporter { storage: self }))
    }

    fn list_trees(&self) -> Result<Vec<TreeName>> {
        Ok(self.trees.read().keys().cloned().collect())
    }

    fn status(&self) -> StorageStatus {
        self.status.read().clone()
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct MemoryReadTransaction<'a> {
    trees: RwLockReadGuard<'a, Trees>,
    fast_count: bool,
}

impl ReadableTransaction for MemoryReadTransaction<'_> {
    fn read(&self, name: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(tree(&self.trees, name)?.get(key).cloned())
    }

    fn open_cursor(&self, name: &TreeName) -> Result<RawCursor<'_>> {
        Ok(Box::new(MemoryCursor::new(tree(&self.trees, name)?)))
    }

    fn record_count(&self, name: &TreeName) -> Result<Option<u64>> {
        let data = tree(&self.trees, name)?;
        Ok(self.fast_count.then_some(data.len() as u64))
    }
}

enum Undo {
    Put {
        tree: TreeName,
        key: Vec<u8>,
        previous: Option<Vec<u8>>,
    },
    CreateTree(TreeName),
    DeleteTree(TreeName, TreeData),
}

struct MemoryWriteTransaction<'a> {
    trees: RwLockWriteGuard<'a, Trees>,
    undo: Vec<Undo>,
    fast_count: bool,
    finished: bool,
}

impl MemoryWriteTransaction<'_> {
    fn undo_all(&mut self) {
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Put {
                    tree,
                    key,
                    previous,
                } => {
                    if let Some(data) = self.trees.get_mut(&tree) {
                        match previous {
                            Some(value) => {
                                data.insert(key, value);
                            }
                            None => {
                                data.remove(&key);
                            }
                        }
                    }
                }
                Undo::CreateTree(tree) => {
                    self.trees.remove(&tree);
                }
                Undo::DeleteTree(tree, data) => {
                    self.trees.insert(tree, data);
                }
            }
        }
    }
}

impl Drop for MemoryWriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.undo_all();
        }
    }
}

impl ReadableTransaction for MemoryWriteTransaction<'_> {
    fn read(&self, name: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(tree(&self.trees, name)?.get(key).cloned())
    }

    fn open_cursor(&self, name: &TreeName) -> Result<RawCursor<'_>> {
        Ok(Box::new(MemoryCursor::new(tree(&self.trees, name)?)))
    }

    fn record_count(&self, name: &TreeName) -> Result<Option<u64>> {
        let data = tree(&self.trees, name)?;
        Ok(self.fast_count.then_some(data.len() as u64))
    }
}

impl WriteableTransaction for MemoryWriteTransaction<'_> {
    fn open_tree(&mut self, name: &TreeName, create_on_demand: bool) -> Result<bool> {
        if self.trees.contains_key(name) {
            return Ok(false);
        }
        if !create_on_demand {
            return Err(StorageError::TreeNotFound(name.clone()));
        }
        self.trees.insert(name.clone(), BTreeMap::new());
        self.undo.push(Undo::CreateTree(name.clone()));
        Ok(true)
    }

    fn delete_tree(&mut self, name: &TreeName) -> Result<()> {
        if let Some(data) = self.trees.remove(name) {
            self.undo.push(Undo::DeleteTree(name.clone(), data));
        }
        Ok(())
    }

    fn put(&mut self, name: &TreeName, key: &[u8], value: &[u8]) -> Result<()> {
        let previous = tree_mut(&mut self.trees, name)?.insert(key.to_vec(), value.to_vec());
        self.undo.push(Undo::Put {
            tree: name.clone(),
            key: key.to_vec(),
            previous,
        });
        Ok(())
    }

    fn delete(&mut self, name: &TreeName, key: &[u8]) -> Result<bool> {
        let previous = tree_mut(&mut self.trees, name)?.remove(key);
        let existed = previous.is_some();
        if existed {
            self.undo.push(Undo::Put {
                tree: name.clone(),
                key: key.to_vec(),
                previous,
            });
        }
        Ok(existed)
    }

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.undo.clear();
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.undo_all();
        self.finished = true;
        Ok(())
    }
}

struct MemoryImporter<'a> {
    storage: &'a InMemoryStorage,
}

impl Importer for MemoryImporter<'_> {
    fn clear_tree(&self, name: &TreeName) -> Result<()> {
        self.storage
            .trees
            .write()
            .insert(name.clone(), BTreeMap::new());
        Ok(())
    }

    fn put(&self, name: &TreeName, key: &[u8], value: &[u8]) -> Result<()> {
        let mut trees = self.storage.trees.write();
        tree_mut(&mut trees, name)?.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn read(&self, name: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let trees = self.storage.trees.read();
        Ok(tree(&trees, name)?.get(key).cloned())
    }

    fn delete(&self, name: &TreeName, key: &[u8]) -> Result<bool> {
        let mut trees = self.storage.trees.write();
        Ok(tree_mut(&mut trees, name)?.remove(key).is_some())
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

enum Position<'a> {
    Unpositioned,
    On(&'a Vec<u8>, &'a Vec<u8>),
    Exhausted,
}

/// Cursor borrowing a tree held by a transaction.
struct MemoryCursor<'a> {
    data: &'a TreeData,
    position: Position<'a>,
}

impl<'a> MemoryCursor<'a> {
    fn new(data: &'a TreeData) -> Self {
        Self {
            data,
            position: Position::Unpositioned,
        }
    }

    fn set(&mut self, record: Option<(&'a Vec<u8>, &'a Vec<u8>)>) -> bool {
        self.position = match record {
            Some((k, v)) => Position::On(k, v),
            None => Position::Exhausted,
        };
        matches!(self.position, Position::On(..))
    }
}

impl SequentialCursor for MemoryCursor<'_> {
    type Key = Vec<u8>;
    type Value = Vec<u8>;

    fn next(&mut self) -> Result<bool> {
        let data = self.data;
        let next = match self.position {
            Position::Unpositioned => data.iter().next(),
            Position::On(key, _) => data
                .range::<[u8], _>((Bound::Excluded(key.as_slice()), Bound::Unbounded))
                .next(),
            Position::Exhausted => return Ok(false),
        };
        Ok(self.set(next))
    }

    fn is_defined(&self) -> bool {
        matches!(self.position, Position::On(..))
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        match self.position {
            Position::On(key, _) => Ok(key.clone()),
            _ => Err(StorageError::CursorNotPositioned),
        }
    }

    fn value(&mut self) -> Result<Vec<u8>> {
        match self.position {
            Position::On(_, value) => Ok(value.clone()),
            _ => Err(StorageError::CursorNotPositioned),
        }
    }
}

impl Cursor for MemoryCursor<'_> {
    fn position_to_key(&mut self, key: &[u8]) -> Result<bool> {
        let record = self.data.get_key_value(key);
        Ok(self.set(record))
    }

    fn position_to_key_or_next(&mut self, key: &[u8]) -> Result<bool> {
        let record = self
            .data
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next();
        Ok(self.set(record))
    }

    fn position_to_last_key(&mut self) -> Result<bool> {
        let record = self.data.iter().next_back();
        Ok(self.set(record))
    }

    fn position_to_index(&mut self, index: usize) -> Result<bool> {
        let record = self.data.iter().nth(index);
        Ok(self.set(record))
    }
}
