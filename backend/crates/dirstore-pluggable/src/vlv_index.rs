//! Sorted (VLV) indexes.
//!
//! Keys are the entry's sort values followed by its ID, values are empty.
//! Iterating the tree yields entry IDs in sort order, and
//! [`VlvIndex::read_page`] jumps straight to an offset.
//!
//! ```text
//! key := (value 0x00 | 0xff 0x00)*  entry-id(8 bytes BE)
//! ```
//!
//! An attribute missing from the entry encodes as `0xff`, which sorts after
//! any UTF-8 value.

use crate::attribute_index::normalize_value;
use dirstore_commons::{Entry, EntryId, TreeName};
use dirstore_store::{
    Cursor, Importer, ReadableTransaction, Result, SequentialCursor, StorageError, Tree,
    WriteableTransaction,
};
use std::collections::BTreeSet;

const MISSING_VALUE: u8 = 0xff;
const VALUE_SEPARATOR: u8 = 0x00;

#[derive(Debug, Clone)]
pub struct VlvIndex {
    name: TreeName,
    sort_attributes: Vec<String>,
}

impl VlvIndex {
    pub fn new(name: TreeName, sort_attributes: Vec<String>) -> Self {
        Self {
            name,
            sort_attributes: sort_attributes
                .into_iter()
                .map(|a| a.to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn sort_attributes(&self) -> &[String] {
        &self.sort_attributes
    }

    /// Sort key of `entry`. Multi-valued attributes sort on their smallest value.
    pub fn encode_sort_key(&self, entry: &Entry, id: EntryId) -> Vec<u8> {
        let mut key = Vec::new();
        for attribute in &self.sort_attributes {
            let smallest = entry
                .attribute(attribute)
                .unwrap_or(&[])
                .iter()
                .map(|v| normalize_value(v))
                .min();
            match smallest {
                Some(value) => key.extend_from_slice(value.as_bytes()),
                None => key.push(MISSING_VALUE),
            }
            key.push(VALUE_SEPARATOR);
        }
        key.extend_from_slice(&id.to_bytes());
        key
    }

    /// Entry ID at the end of a sort key.
    pub fn entry_id_of(key: &[u8]) -> Result<EntryId> {
        if key.len() < EntryId::SIZE {
            return Err(StorageError::corruption(format!("VLV key {:?} is too short", key)));
        }
        Ok(EntryId::from_bytes(&key[key.len() - EntryId::SIZE..])?)
    }

    /// Applies buffered changes in key order.
    pub fn update_index(
        &self,
        txn: &mut dyn WriteableTransaction,
        added: &BTreeSet<Vec<u8>>,
        deleted: &BTreeSet<Vec<u8>>,
    ) -> Result<()> {
        let mut adds = added.iter().peekable();
        let mut deletes = deleted.iter().peekable();
        loop {
            match (adds.peek(), deletes.peek()) {
                (Some(add), Some(delete)) if delete <= add => {
                    txn.delete(&self.name, delete)?;
                    deletes.next();
                }
                (Some(add), _) => {
                    txn.put(&self.name, add, &[])?;
                    adds.next();
                }
                (None, Some(delete)) => {
                    txn.delete(&self.name, delete)?;
                    deletes.next();
                }
                (None, None) => return Ok(()),
            }
        }
    }

    pub fn import_put(&self, importer: &dyn Importer, sort_key: &[u8]) -> Result<()> {
        importer.put(&self.name, sort_key, &[])
    }

    pub fn import_remove(&self, importer: &dyn Importer, sort_key: &[u8]) -> Result<bool> {
        importer.delete(&self.name, sort_key)
    }

    /// Up to `count` entry IDs starting at sort position `offset`.
    pub fn read_page<T>(&self, txn: &T, offset: usize, count: usize) -> Result<Vec<EntryId>>
    where
        T: ReadableTransaction + ?Sized,
    {
        let mut ids = Vec::with_capacity(count);
        if count == 0 {
            return Ok(ids);
        }
        let mut cursor = txn.open_cursor(&self.name)?;
        let mut found = cursor.position_to_index(offset)?;
        while found && ids.len() < count {
            ids.push(Self::entry_id_of(&cursor.key()?)?);
            found = cursor.next()?;
        }
        Ok(ids)
    }
}

impl Tree for VlvIndex {
    fn name(&self) -> &TreeName {
        &self.name
    }
}
