//! Stand-in for an index whose maintenance is disabled.

use super::import_id_set::ImportIdSet;
use super::IndexCursor;
use crate::entry_id_set::EntryIdSet;
use dirstore_commons::TreeName;
use dirstore_store::{
    CursorTransformer, Importer, RawCursor, Result, VecCursor, WriteableTransaction,
};

/// Writes are dropped, reads are undefined, and no tree is ever created.
#[derive(Debug, Clone)]
pub struct NullIndex {
    name: TreeName,
}

impl NullIndex {
    pub fn new(name: TreeName) -> Self {
        Self { name }
    }

    pub fn name(&self) -> &TreeName {
        &self.name
    }

    pub fn get(&self, key: &[u8]) -> EntryIdSet {
        EntryIdSet::undefined(key)
    }

    pub fn update(
        &self,
        _txn: &mut dyn WriteableTransaction,
        _key: &[u8],
        _deleted: Option<&EntryIdSet>,
        _added: Option<&EntryIdSet>,
    ) -> Result<()> {
        Ok(())
    }

    pub fn import_put(&self, _importer: &dyn Importer, _ids: &ImportIdSet) -> Result<()> {
        Ok(())
    }

    pub fn import_remove(&self, _importer: &dyn Importer, _ids: &ImportIdSet) -> Result<()> {
        Ok(())
    }

    pub fn open_cursor<'t>(&self) -> IndexCursor<'t> {
        let empty: RawCursor<'t> = Box::new(VecCursor::new(Vec::new()));
        CursorTransformer::transform_values(empty, |key: &Vec<u8>, _value: &Vec<u8>| {
            Ok(EntryIdSet::undefined(key.clone()))
        })
    }
}
