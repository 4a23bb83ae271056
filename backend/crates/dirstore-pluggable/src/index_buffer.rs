//! Per-operation buffer of index changes.
//!
//! Changes to the same (index, key) are folded into one net added/deleted
//! pair; an ID added then removed (or the reverse) leaves no trace. Flushing
//! walks indexes by tree name and keys in byte order so that concurrent
//! transactions always lock records in the same order.

use crate::entry_id_set::EntryIdSet;
use crate::index::Index;
use crate::vlv_index::VlvIndex;
use dirstore_commons::{EntryId, TreeName};
use dirstore_store::{Result, Tree, WriteableTransaction};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

#[derive(Debug, Default)]
struct BufferedIndexValues {
    added: Option<EntryIdSet>,
    deleted: Option<EntryIdSet>,
}

impl BufferedIndexValues {
    fn add(&mut self, key: &[u8], id: EntryId) {
        if let Some(deleted) = &mut self.deleted {
            if deleted.remove(id) {
                return;
            }
        }
        self.added
            .get_or_insert_with(|| EntryIdSet::empty(key))
            .add(id);
    }

    fn delete(&mut self, key: &[u8], id: EntryId) {
        if let Some(added) = &mut self.added {
            if added.remove(id) {
                return;
            }
        }
        self.deleted
            .get_or_insert_with(|| EntryIdSet::empty(key))
            .add(id);
    }
}

#[derive(Debug, Default)]
struct BufferedVlvValues {
    added: BTreeSet<Vec<u8>>,
    deleted: BTreeSet<Vec<u8>>,
}

struct IndexChanges {
    index: Arc<Index>,
    keys: BTreeMap<Vec<u8>, BufferedIndexValues>,
}

struct VlvChanges {
    index: Arc<VlvIndex>,
    values: BufferedVlvValues,
}

#[derive(Default)]
pub struct IndexBuffer {
    indexes: BTreeMap<TreeName, IndexChanges>,
    vlv_indexes: BTreeMap<TreeName, VlvChanges>,
}

impl IndexBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn values(&mut self, index: &Arc<Index>, key: &[u8]) -> &mut BufferedIndexValues {
        self.indexes
            .entry(index.name().clone())
            .or_insert_with(|| IndexChanges {
                index: Arc::clone(index),
                keys: BTreeMap::new(),
            })
            .keys
            .entry(key.to_vec())
            .or_default()
    }

    fn vlv_values(&mut self, index: &Arc<VlvIndex>) -> &mut BufferedVlvValues {
        &mut self
            .vlv_indexes
            .entry(index.name().clone())
            .or_insert_with(|| VlvChanges {
                index: Arc::clone(index),
                values: BufferedVlvValues::default(),
            })
            .values
    }

    /// Records that `id` now has `key` in `index`.
    pub fn put(&mut self, index: &Arc<Index>, key: &[u8], id: EntryId) {
        self.values(index, key).add(key, id);
    }

    /// Records that `id` no longer has `key` in `index`.
    pub fn remove(&mut self, index: &Arc<Index>, key: &[u8], id: EntryId) {
        self.values(index, key).delete(key, id);
    }

    pub fn put_vlv(&mut self, index: &Arc<VlvIndex>, sort_key: Vec<u8>) {
        let values = self.vlv_values(index);
        if !values.deleted.remove(&sort_key) {
            values.added.insert(sort_key);
        }
    }

    pub fn remove_vlv(&mut self, index: &Arc<VlvIndex>, sort_key: Vec<u8>) {
        let values = self.vlv_values(index);
        if !values.added.remove(&sort_key) {
            values.deleted.insert(sort_key);
        }
    }

    /// Number of buffered (index, key) pairs, VLV indexes included.
    pub fn len(&self) -> usize {
        self.indexes.values().map(|c| c.keys.len()).sum::<usize>() + self.vlv_indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Writes every buffered change through `txn`.
    pub fn flush(self, txn: &mut dyn WriteableTransaction) -> Result<()> {
        for (name, changes) in self.indexes {
            log::trace!("Flushing {} keys of index {}", changes.keys.len(), name);
            for (key, values) in changes.keys {
                changes
                    .index
                    .update(txn, &key, values.deleted.as_ref(), values.added.as_ref())?;
            }
        }
        for (_, changes) in self.vlv_indexes {
            changes
                .index
                .update_index(txn, &changes.values.added, &changes.values.deleted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id2entry::Id2Entry;
    use crate::index::DefaultIndex;
    use crate::state::State;
    use dirstore_store::{InMemoryStorage, ReadableTransaction, Storage, StorageExt};

    fn active_index(index_id: &str, state: &State) -> Arc<Index> {
        Arc::new(Index::Active(DefaultIndex::new(
            TreeName::new("o=test", index_id),
            state.clone(),
            Id2Entry::new(TreeName::new("o=test", "id2entry")),
            100,
            true,
        )))
    }

    fn setup() -> (InMemoryStorage, Arc<Index>) {
        let storage = InMemoryStorage::new();
        let state = State::new(TreeName::new("o=test", "state"));
        let index = active_index("cn.equality", &state);
        storage
            .write(|txn| {
                state.open(txn, true)?;
                index.open(txn, true)
            })
            .unwrap();
        (storage, index)
    }

    fn stored_ids(storage: &InMemoryStorage, index: &Index, key: &[u8]) -> Vec<u64> {
        let txn = storage.begin_read().unwrap();
        index.get(txn.as_ref(), key).iter().map(|id| id.as_u64()).collect()
    }

    #[test]
    fn test_put_then_remove_writes_nothing() {
        let (storage, index) = setup();
        let mut buffer = IndexBuffer::new();
        buffer.put(&index, b"k", EntryId::new(1));
        buffer.remove(&index, b"k", EntryId::new(1));
        storage.write(|txn| buffer.flush(txn)).unwrap();

        let txn = storage.begin_read().unwrap();
        assert_eq!(index.record_count(txn.as_ref()).unwrap(), 0);
    }

    #[test]
    fn test_remove_then_put_keeps_existing_id() {
        let (storage, index) = setup();
        let mut first = IndexBuffer::new();
        first.put(&index, b"k", EntryId::new(1));
        storage.write(|txn| first.flush(txn)).unwrap();

        let mut second = IndexBuffer::new();
        second.remove(&index, b"k", EntryId::new(1));
        second.put(&index, b"k", EntryId::new(1));
        second.put(&index, b"k", EntryId::new(2));
        storage.write(|txn| second.flush(txn)).unwrap();

        assert_eq!(stored_ids(&storage, &index, b"k"), vec![1, 2]);
    }

    /// Forwards to `inner`, logging every write as (tree, key).
    struct Recorder<'a> {
        inner: &'a mut dyn WriteableTransaction,
        writes: Vec<(String, Vec<u8>)>,
    }

    impl Recorder<'_> {
        fn record(&mut self, tree: &TreeName, key: &[u8]) {
            self.writes.push((tree.index_id().to_string(), key.to_vec()));
        }
    }

    impl ReadableTransaction for Recorder<'_> {
        fn read(&self, tree: &TreeName, key: &[u8]) -> Result<Option<Vec<u8>>> {
            self.inner.read(tree, key)
        }

        fn open_cursor(&self, tree: &TreeName) -> Result<dirstore_store::RawCursor<'_>> {
            self.inner.open_cursor(tree)
        }

        fn record_count(&self, tree: &TreeName) -> Result<Option<u64>> {
            self.inner.record_count(tree)
        }
    }

    impl WriteableTransaction for Recorder<'_> {
        fn open_tree(&mut self, tree: &TreeName, create_on_demand: bool) -> Result<bool> {
            self.inner.open_tree(tree, create_on_demand)
        }

        fn delete_tree(&mut self, tree: &TreeName) -> Result<()> {
            self.inner.delete_tree(tree)
        }

        fn put(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> Result<()> {
            self.record(tree, key);
            self.inner.put(tree, key, value)
        }

        fn update(&mut self, tree: &TreeName, key: &[u8], f: &mut dirstore_store::UpdateFn<'_>) -> Result<bool> {
            self.record(tree, key);
            self.inner.update(tree, key, f)
        }

        fn delete(&mut self, tree: &TreeName, key: &[u8]) -> Result<bool> {
            self.record(tree, key);
            self.inner.delete(tree, key)
        }

        fn commit(self: Box<Self>) -> Result<()> {
            Ok(())
        }

        fn rollback(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_flush_writes_by_index_name_then_key() {
        let storage = InMemoryStorage::new();
        let state = State::new(TreeName::new("o=test", "state"));
        let sn = active_index("sn.equality", &state);
        let cn = active_index("cn.equality", &state);
        let vlv = Arc::new(VlvIndex::new(TreeName::new("o=test", "vlv.a"), vec!["sn".into()]));
        storage
            .write(|txn| {
                state.open(txn, true)?;
                sn.open(txn, true)?;
                cn.open(txn, true)?;
                vlv.open(txn, true)
            })
            .unwrap();

        let mut buffer = IndexBuffer::new();
        buffer.put_vlv(&vlv, b"z".to_vec());
        buffer.put_vlv(&vlv, b"y".to_vec());
        for index in [&sn, &cn] {
            for key in [b"c", b"a", b"b"] {
                buffer.put(index, key, EntryId::new(7));
            }
        }
        assert_eq!(buffer.len(), 7);

        let writes = storage
            .write(|txn| {
                let mut recorder = Recorder {
                    inner: txn,
                    writes: Vec::new(),
                };
                buffer.flush(&mut recorder)?;
                Ok(recorder.writes)
            })
            .unwrap();

        let expected: Vec<(String, Vec<u8>)> = [
            ("cn.equality", b"a"),
            ("cn.equality", b"b"),
            ("cn.equality", b"c"),
            ("sn.equality", b"a"),
            ("sn.equality", b"b"),
            ("sn.equality", b"c"),
            ("vlv.a", b"y"),
            ("vlv.a", b"z"),
        ]
        .iter()
        .map(|(tree, key)| (tree.to_string(), key.to_vec()))
        .collect();
        assert_eq!(writes, expected);
        for key in [b"a", b"b", b"c"] {
            assert_eq!(stored_ids(&storage, &cn, key), vec![7]);
            assert_eq!(stored_ids(&storage, &sn, key), vec![7]);
        }
    }

    #[test]
    fn test_vlv_changes_cancel() {
        let vlv = Arc::new(VlvIndex::new(TreeName::new("o=test", "vlv.x"), vec!["sn".into()]));
        let mut buffer = IndexBuffer::new();
        buffer.put_vlv(&vlv, b"key".to_vec());
        buffer.remove_vlv(&vlv, b"key".to_vec());
        let storage = InMemoryStorage::new();
        storage
            .write(|txn| {
                vlv.open(txn, true)?;
                buffer.flush(txn)
            })
            .unwrap();
        let txn = storage.begin_read().unwrap();
        assert_eq!(vlv.record_count(txn.as_ref()).unwrap(), 0);
    }
}
