//! Persistent per-index flags.
//!
//! One record per index tree: key = storage name of the index tree, value =
//! one flag byte. Missing records read as no flags.

use dirstore_commons::TreeName;
use dirstore_store::{ReadableTransaction, Result, Tree, WriteableTransaction};
use std::fmt;

/// Flag set stored in the state tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct IndexFlags(u8);

impl IndexFlags {
    pub const NONE: IndexFlags = IndexFlags(0);
    /// The index content can be relied upon.
    pub const TRUSTED: IndexFlags = IndexFlags(0x01);
    /// Values use the compacted (V2) encoding.
    pub const COMPACTED: IndexFlags = IndexFlags(0x02);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: IndexFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn union(self, other: IndexFlags) -> Self {
        Self(self.0 | other.0)
    }

    pub fn difference(self, other: IndexFlags) -> Self {
        Self(self.0 & !other.0)
    }
}

impl fmt::Display for IndexFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Self::TRUSTED) {
            names.push("trusted");
        }
        if self.contains(Self::COMPACTED) {
            names.push("compacted");
        }
        write!(f, "[{}]", names.join(","))
    }
}

#[derive(Debug, Clone)]
pub struct State {
    name: TreeName,
}

impl State {
    pub fn new(name: TreeName) -> Self {
        Self { name }
    }

    fn key(index: &TreeName) -> Vec<u8> {
        index.storage_name().into_bytes()
    }

    fn decode(value: Option<&[u8]>) -> IndexFlags {
        value
            .and_then(|bytes| bytes.first())
            .map(|bits| IndexFlags::from_bits(*bits))
            .unwrap_or_default()
    }

    pub fn get_index_flags<T>(&self, txn: &T, index: &TreeName) -> Result<IndexFlags>
    where
        T: ReadableTransaction + ?Sized,
    {
        let value = txn.read(&self.name, &Self::key(index))?;
        Ok(Self::decode(value.as_deref()))
    }

    /// Returns `true` if the stored flags changed.
    pub fn add_flags_to_index(
        &self,
        txn: &mut dyn WriteableTransaction,
        index: &TreeName,
        flags: IndexFlags,
    ) -> Result<bool> {
        txn.update(&self.name, &Self::key(index), &mut |old| {
            Ok(Some(vec![Self::decode(old).union(flags).bits()]))
        })
    }

    /// Returns `true` if the stored flags changed.
    pub fn remove_flags_from_index(
        &self,
        txn: &mut dyn WriteableTransaction,
        index: &TreeName,
        flags: IndexFlags,
    ) -> Result<bool> {
        txn.update(&self.name, &Self::key(index), &mut |old| {
            Ok(Some(vec![Self::decode(old).difference(flags).bits()]))
        })
    }

    /// Forgets everything about `index`. Returns `true` if a record existed.
    pub fn delete_record(&self, txn: &mut dyn WriteableTransaction, index: &TreeName) -> Result<bool> {
        txn.delete(&self.name, &Self::key(index))
    }
}

impl Tree for State {
    fn name(&self) -> &TreeName {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstore_store::{InMemoryStorage, Storage, StorageExt};

    #[test]
    fn test_flags_lifecycle() {
        let storage = InMemoryStorage::new();
        let state = State::new(TreeName::new("o=test", "state"));
        let index = TreeName::new("o=test", "cn.equality");

        storage.write(|txn| state.open(txn, true)).unwrap();
        {
            let txn = storage.begin_read().unwrap();
            assert_eq!(state.get_index_flags(txn.as_ref(), &index).unwrap(), IndexFlags::NONE);
        }

        let changed = storage
            .write(|txn| {
                state.add_flags_to_index(txn, &index, IndexFlags::TRUSTED)?;
                state.add_flags_to_index(txn, &index, IndexFlags::COMPACTED)?;
                state.add_flags_to_index(txn, &index, IndexFlags::TRUSTED)
            })
            .unwrap();
        assert!(!changed);

        storage
            .write(|txn| state.remove_flags_from_index(txn, &index, IndexFlags::TRUSTED))
            .unwrap();
        let txn = storage.begin_read().unwrap();
        let flags = state.get_index_flags(txn.as_ref(), &index).unwrap();
        assert!(flags.contains(IndexFlags::COMPACTED));
        assert!(!flags.contains(IndexFlags::TRUSTED));
        assert_eq!(flags.to_string(), "[compacted]");
        drop(txn);

        assert!(storage.write(|txn| state.delete_record(txn, &index)).unwrap());
    }
}
