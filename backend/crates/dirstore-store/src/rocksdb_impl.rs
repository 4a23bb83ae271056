//! RocksDB implementation of the [`Storage`] trait.
//!
//! Each tree is a column family named after [`TreeName::storage_name`].
//! Write transactions are `TransactionDB` transactions, so reads and cursors
//! opened on a transaction see its uncommitted writes. RocksDB cannot count
//! records cheaply, so `record_count` always reports `None`.

use crate::cursor::{Cursor, RawCursor, SequentialCursor};
use crate::storage_trait::{
    Importer, ReadableTransaction, Result, Storage, StorageError, StorageStatus, UpdateFn,
    WriteableTransaction,
};
use dirstore_commons::TreeName;
use parking_lot::RwLock;
use rocksdb::{
    BoundColumnFamily, DBAccess, DBRawIteratorWithThreadMode, MultiThreaded, Options,
    Transaction, TransactionDB, TransactionOptions, WriteOptions,
};
use std::any::Any;
use std::collections::BTreeSet;
use std::sync::Arc;

type Db = TransactionDB<MultiThreaded>;

/// RocksDB-backed ordered store.
pub struct RocksDbStorage {
    db: Db,
    trees: RwLock<BTreeSet<TreeName>>,
    cf_options: Options,
    sync_writes: bool,
    status: RwLock<StorageStatus>,
}

impl RocksDbStorage {
    /// Wraps an open database. `column_families` lists the families opened
    /// with it; names that are not tree names (such as `default`) are ignored.
    pub fn new(db: Db, column_families: &[String], cf_options: Options, sync_writes: bool) -> Self {
        let trees = column_families
            .iter()
            .filter(|name| name.as_str() != "default")
            .filter_map(|name| TreeName::from_storage_name(name))
            .collect();
        Self {
            db,
            trees: RwLock::new(trees),
            cf_options,
            sync_writes,
            status: RwLock::new(StorageStatus::Working),
        }
    }

    /// Returns a reference to the underlying database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    pub fn set_status(&self, status: StorageStatus) {
        *self.status.write() = status;
    }

    fn cf(&self, tree: &TreeName) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(&tree.storage_name())
            .ok_or_else(|| StorageError::TreeNotFound(tree.clone()))
    }

    fn create_tree(&self, tree: &TreeName) -> Result<bool> {
        let mut trees = self.trees.write();
        if trees.contains(tree) {
            return Ok(false);
        }
        self.db
            .create_cf(tree.storage_name(), &self.cf_options)
            .map_err(StorageError::io)?;
        trees.insert(tree.clone());
        log::debug!("Created column family {}", tree);
        Ok(true)
    }

    fn drop_tree(&self, tree: &TreeName) -> Result<()> {
        let mut trees = self.trees.write();
        if trees.remove(tree) {
            self.db
                .drop_cf(&tree.storage_name())
                .map_err(StorageError::io)?;
            log::debug!("Dropped column family {}", tree);
        }
        Ok(())
    }

    fn transaction(&self) -> Transaction<'_, Db> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db.transaction_opt(&write_opts, &TransactionOptions::default())
    }

    fn ensure_writable(&self) -> Result<()> {
        match &*self.status.read() {
            StorageStatus::LockedDown(reason) => Err(StorageError::Unavailable(reason.clone())),
            _ => Ok(()),
        }
    }
}

impl Storage for RocksDbStorage {
    fn begin_read(&self) -> Result<Box<dyn ReadableTransaction + '_>> {
        Ok(Box::new(RocksTransaction {
            storage: self,
            txn: self.transaction(),
        }))
    }

    fn begin_write(&self) -> Result<Box<dyn WriteableTransaction + '_>> {
        self.ensure_writable()?;
        Ok(Box::new(RocksTransaction {
            storage: self,
            txn: self.transaction(),
        }))
    }

    fn start_import(&self) -> Result<Box<dyn Importer + '_>> {
        self.ensure_writable()?;
        Ok(Box::new(RocksImporter { storage: self }))
    }

    fn list_trees(&self) -> Result<Vec<TreeName>> {
        Ok(self.trees.read().iter().cloned().collect())
    }

    fn status(&self) -> StorageStatus {
        self.status.read().clone()
    }

    fn close(&self) -> Result<()> {
        log::debug!("Closing RocksDB storage with {} trees", self.trees.read().len());
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RocksTransaction<'a> {
    storage: &'a RocksDbStorage,
    txn: Transaction<'a, Db>,
}

impl ReadableTransaction for RocksTransaction<'_> {
    fn read(&self, tree: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.storage.cf(tree)?;
        self.txn.get_cf(&cf, key).map_err(StorageError::io)
    }

    fn open_cursor(&self, tree: &TreeName) -> Result<RawCursor<'_>> {
        let cf = self.storage.cf(tree)?;
        Ok(Box::new(RocksCursor::new(self.txn.raw_iterator_cf(&cf))))
    }

    fn record_count(&self, tree: &TreeName) -> Result<Option<u64>> {
        self.storage.cf(tree)?;
        Ok(None)
    }
}

impl WriteableTransaction for RocksTransaction<'_> {
    fn open_tree(&mut self, tree: &TreeName, create_on_demand: bool) -> Result<bool> {
        if self.storage.trees.read().contains(tree) {
            return Ok(false);
        }
        if !create_on_demand {
            return Err(StorageError::TreeNotFound(tree.clone()));
        }
        self.storage.create_tree(tree)
    }

    fn delete_tree(&mut self, tree: &TreeName) -> Result<()> {
        self.storage.drop_tree(tree)
    }

    fn put(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.storage.cf(tree)?;
        self.txn.put_cf(&cf, key, value).map_err(StorageError::io)
    }

    fn put_if_absent(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<bool> {
        let cf = self.storage.cf(tree)?;
        let existing = self
            .txn
            .get_for_update_cf(&cf, key, true)
            .map_err(StorageError::io)?;
        if existing.is_some() {
            return Ok(false);
        }
        self.txn.put_cf(&cf, key, value).map_err(StorageError::io)?;
        Ok(true)
    }

    fn update(&mut self, tree: &TreeName, key: &[u8], f: &mut UpdateFn<'_>) -> Result<bool> {
        let cf = self.storage.cf(tree)?;
        let old = self
            .txn
            .get_for_update_cf(&cf, key, true)
            .map_err(StorageError::io)?;
        match (old.as_deref(), f(old.as_deref())?) {
            (old, Some(new)) if old == Some(new.as_slice()) => Ok(false),
            (_, Some(new)) => {
                self.txn.put_cf(&cf, key, new).map_err(StorageError::io)?;
                Ok(true)
            }
            (Some(_), None) => {
                self.txn.delete_cf(&cf, key).map_err(StorageError::io)?;
                Ok(true)
            }
            (None, None) => Ok(false),
        }
    }

    fn delete(&mut self, tree: &TreeName, key: &[u8]) -> Result<bool> {
        let cf = self.storage.cf(tree)?;
        let existed = self
            .txn
            .get_for_update_cf(&cf, key, true)
            .map_err(StorageError::io)?
            .is_some();
        if existed {
            self.txn.delete_cf(&cf, key).map_err(StorageError::io)?;
        }
        Ok(existed)
    }

    fn commit(self: Box<Self>) -> Result<()> {
        self.txn.commit().map_err(StorageError::io)
    }

    fn rollback(self: Box<Self>) -> Result<()> {
        self.txn.rollback().map_err(StorageError::io)
    }
}

struct RocksImporter<'a> {
    storage: &'a RocksDbStorage,
}

impl Importer for RocksImporter<'_> {
    fn clear_tree(&self, tree: &TreeName) -> Result<()> {
        self.storage.drop_tree(tree)?;
        self.storage.create_tree(tree)?;
        Ok(())
    }

    fn put(&self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.storage.cf(tree)?;
        self.storage
            .db
            .put_cf(&cf, key, value)
            .map_err(StorageError::io)
    }

    fn read(&self, tree: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.storage.cf(tree)?;
        self.storage.db.get_cf(&cf, key).map_err(StorageError::io)
    }

    fn delete(&self, tree: &TreeName, key: &[u8]) -> Result<bool> {
        let cf = self.storage.cf(tree)?;
        let existed = self
            .storage
            .db
            .get_cf(&cf, key)
            .map_err(StorageError::io)?
            .is_some();
        if existed {
            self.storage
                .db
                .delete_cf(&cf, key)
                .map_err(StorageError::io)?;
        }
        Ok(existed)
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Position {
    Unpositioned,
    On,
    Exhausted,
}

/// Cursor over a RocksDB raw iterator.
struct RocksCursor<'b, D: DBAccess> {
    iter: DBRawIteratorWithThreadMode<'b, D>,
    position: Position,
}

impl<'b, D: DBAccess> RocksCursor<'b, D> {
    fn new(iter: DBRawIteratorWithThreadMode<'b, D>) -> Self {
        Self {
            iter,
            position: Position::Unpositioned,
        }
    }

    fn settle(&mut self) -> Result<bool> {
        if self.iter.valid() {
            self.position = Position::On;
            return Ok(true);
        }
        self.position = Position::Exhausted;
        self.iter.status().map_err(StorageError::io)?;
        Ok(false)
    }
}

impl<D: DBAccess> SequentialCursor for RocksCursor<'_, D> {
    type Key = Vec<u8>;
    type Value = Vec<u8>;

    fn next(&mut self) -> Result<bool> {
        match self.position {
            Position::Unpositioned => self.iter.seek_to_first(),
            Position::On => self.iter.next(),
            Position::Exhausted => return Ok(false),
        }
        self.settle()
    }

    fn is_defined(&self) -> bool {
        self.position == Position::On
    }

    fn key(&mut self) -> Result<Vec<u8>> {
        match self.position {
            Position::On => self
                .iter
                .key()
                .map(<[u8]>::to_vec)
                .ok_or(StorageError::CursorNotPositioned),
            _ => Err(StorageError::CursorNotPositioned),
        }
    }

    fn value(&mut self) -> Result<Vec<u8>> {
        match self.position {
            Position::On => self
                .iter
                .value()
                .map(<[u8]>::to_vec)
                .ok_or(StorageError::CursorNotPositioned),
            _ => Err(StorageError::CursorNotPositioned),
        }
    }
}

impl<D: DBAccess> Cursor for RocksCursor<'_, D> {
    fn position_to_key(&mut self, key: &[u8]) -> Result<bool> {
        self.iter.seek(key);
        if self.settle()? && self.iter.key() != Some(key) {
            self.position = Position::Exhausted;
            return Ok(false);
        }
        Ok(self.is_defined())
    }

    fn position_to_key_or_next(&mut self, key: &[u8]) -> Result<bool> {
        self.iter.seek(key);
        self.settle()
    }

    fn position_to_last_key(&mut self) -> Result<bool> {
        self.iter.seek_to_last();
        self.settle()
    }

    fn position_to_index(&mut self, index: usize) -> Result<bool> {
        self.iter.seek_to_first();
        for _ in 0..index {
            if !self.iter.valid() {
                break;
            }
            self.iter.next();
        }
        self.settle()
    }
}
