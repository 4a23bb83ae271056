//! Entry ID set indexes.
//!
//! [`Index`] is what containers hold: either a maintained [`DefaultIndex`] or
//! a [`NullIndex`] when maintenance is turned off.

pub mod default_index;
pub mod import_id_set;
pub mod null_index;

pub use default_index::{DefaultIndex, TrustState};
pub use import_id_set::ImportIdSet;
pub use null_index::NullIndex;

use crate::entry_id_set::EntryIdSet;
use dirstore_commons::TreeName;
use dirstore_store::{
    CursorTransformer, Importer, RawCursor, ReadableTransaction, Result, Tree,
    WriteableTransaction,
};

/// Cursor over an index: raw keys, decoded sets.
pub type IndexCursor<'t> = CursorTransformer<'static, RawCursor<'t>, Vec<u8>, EntryIdSet>;

pub enum Index {
    Active(DefaultIndex),
    Disabled(NullIndex),
}

impl Index {
    pub fn is_active(&self) -> bool {
        matches!(self, Index::Active(_))
    }

    pub fn get<T>(&self, txn: &T, key: &[u8]) -> EntryIdSet
    where
        T: ReadableTransaction + ?Sized,
    {
        match self {
            Index::Active(index) => index.get(txn, key),
            Index::Disabled(index) => index.get(key),
        }
    }

    pub fn update(
        &self,
        txn: &mut dyn WriteableTransaction,
        key: &[u8],
        deleted: Option<&EntryIdSet>,
        added: Option<&EntryIdSet>,
    ) -> Result<()> {
        match self {
            Index::Active(index) => index.update(txn, key, deleted, added),
            Index::Disabled(index) => index.update(txn, key, deleted, added),
        }
    }

    pub fn import_put(&self, importer: &dyn Importer, ids: &ImportIdSet) -> Result<()> {
        match self {
            Index::Active(index) => index.import_put(importer, ids),
            Index::Disabled(index) => index.import_put(importer, ids),
        }
    }

    pub fn import_remove(&self, importer: &dyn Importer, ids: &ImportIdSet) -> Result<()> {
        match self {
            Index::Active(index) => index.import_remove(importer, ids),
            Index::Disabled(index) => index.import_remove(importer, ids),
        }
    }

    /// 0 for a disabled index.
    pub fn index_entry_limit(&self) -> usize {
        match self {
            Index::Active(index) => index.index_entry_limit(),
            Index::Disabled(_) => 0,
        }
    }

    pub fn set_index_entry_limit(&self, limit: usize) -> bool {
        match self {
            Index::Active(index) => index.set_index_entry_limit(limit),
            Index::Disabled(_) => false,
        }
    }

    /// A disabled index is always trusted.
    pub fn is_trusted(&self) -> bool {
        match self {
            Index::Active(index) => index.is_trusted(),
            Index::Disabled(_) => true,
        }
    }

    pub fn set_trusted(&self, txn: &mut dyn WriteableTransaction, trusted: bool) -> Result<()> {
        match self {
            Index::Active(index) => index.set_trusted(txn, trusted),
            Index::Disabled(_) => Ok(()),
        }
    }

    pub fn entry_limit_exceeded_count(&self) -> u64 {
        match self {
            Index::Active(index) => index.entry_limit_exceeded_count(),
            Index::Disabled(_) => 0,
        }
    }

    pub fn open_cursor<'t, T>(&self, txn: &'t T) -> Result<IndexCursor<'t>>
    where
        T: ReadableTransaction + ?Sized,
    {
        match self {
            Index::Active(index) => index.open_cursor(txn),
            Index::Disabled(index) => Ok(index.open_cursor()),
        }
    }
}

impl Tree for Index {
    fn name(&self) -> &TreeName {
        match self {
            Index::Active(index) => index.name(),
            Index::Disabled(index) => index.name(),
        }
    }

    fn open(&self, txn: &mut dyn WriteableTransaction, create_on_demand: bool) -> Result<()> {
        match self {
            Index::Active(index) => index.open(txn, create_on_demand),
            Index::Disabled(_) => Ok(()),
        }
    }

    fn delete(&self, txn: &mut dyn WriteableTransaction) -> Result<()> {
        match self {
            Index::Active(index) => index.delete(txn),
            Index::Disabled(_) => Ok(()),
        }
    }

    fn record_count<T>(&self, txn: &T) -> Result<u64>
    where
        T: ReadableTransaction + ?Sized,
        Self: Sized,
    {
        match self {
            Index::Active(index) => index.record_count(txn),
            Index::Disabled(_) => Ok(0),
        }
    }
}
