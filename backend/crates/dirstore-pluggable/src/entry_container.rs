//! All trees of one base DN, and the online entry operations on them.
//!
//! ```text
//! <base>/state          index tree name → flags
//! <base>/dn2id          DN key → entry ID
//! <base>/id2entry       entry ID → entry
//! <base>/compressed_*   schema tokens of compact entries
//! <base>/id2children    parent ID → IDs of its children
//! <base>/id2subtree     ancestor ID → IDs of every descendant
//! <base>/<attr>.<type>  attribute indexes
//! <base>/vlv.<name>     sorted indexes
//! ```

use crate::attribute_index::AttributeIndex;
use crate::compressed_schema::{CompressedSchema, COMPRESSED_ATTRIBUTES_TREE, COMPRESSED_OBJECT_CLASSES_TREE};
use crate::dn2id::Dn2Id;
use crate::error::{DirectoryError, Result};
use crate::id2entry::Id2Entry;
use crate::index::{DefaultIndex, Index, NullIndex};
use crate::index_buffer::IndexBuffer;
use crate::root_container::EntryIdSequence;
use crate::state::State;
use crate::vlv_index::VlvIndex;
use dirstore_commons::{Dn, Entry, EntryId, TreeName};
use dirstore_configs::IndexSettings;
use serde::Serialize;
use dirstore_store::{
    ReadableTransaction, SequentialCursor, Storage, StorageError, StorageStatus, Tree,
    WriteableTransaction,
};
use std::sync::Arc;

pub const STATE_TREE: &str = "state";
pub const DN2ID_TREE: &str = "dn2id";
pub const ID2ENTRY_TREE: &str = "id2entry";
pub const ID2CHILDREN_TREE: &str = "id2children";
pub const ID2SUBTREE_TREE: &str = "id2subtree";

/// Summary of one index, as shown by `index-status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub name: TreeName,
    pub active: bool,
    pub trusted: bool,
    pub index_entry_limit: usize,
    pub entry_limit_exceeded: u64,
    pub record_count: u64,
}

pub struct EntryContainer {
    base_dn: Dn,
    storage: Arc<dyn Storage>,
    ids: Arc<EntryIdSequence>,
    state: State,
    dn2id: Dn2Id,
    id2entry: Id2Entry,
    id2children: Arc<Index>,
    id2subtree: Arc<Index>,
    attribute_indexes: Vec<AttributeIndex>,
    vlv_indexes: Vec<Arc<VlvIndex>>,
}

impl EntryContainer {
    pub fn new(
        base_dn: Dn,
        storage: Arc<dyn Storage>,
        ids: Arc<EntryIdSequence>,
        settings: &IndexSettings,
    ) -> Self {
        let base = base_dn.to_normalized_string();
        let tree = |index_id: &str| TreeName::new(base.clone(), index_id);

        let state = State::new(tree(STATE_TREE));
        let id2entry = if settings.compact_encoding {
            let schema = CompressedSchema::new(tree(COMPRESSED_ATTRIBUTES_TREE), tree(COMPRESSED_OBJECT_CLASSES_TREE));
            Id2Entry::with_schema(tree(ID2ENTRY_TREE), Arc::new(schema))
        } else {
            Id2Entry::new(tree(ID2ENTRY_TREE))
        };
        let count_index = |index_id: &str| {
            let index = if settings.maintain_count_indexes {
                Index::Active(DefaultIndex::new(
                    tree(index_id),
                    state.clone(),
                    id2entry.clone(),
                    settings.index_entry_limit,
                    settings.compact_encoding,
                ))
            } else {
                Index::Disabled(NullIndex::new(tree(index_id)))
            };
            Arc::new(index)
        };
        let id2children = count_index(ID2CHILDREN_TREE);
        let id2subtree = count_index(ID2SUBTREE_TREE);

        let attribute_indexes = settings
            .attribute_indexes
            .iter()
            .map(|attr| {
                AttributeIndex::new(
                    &base,
                    attr,
                    settings.index_entry_limit,
                    &state,
                    &id2entry,
                    settings.compact_encoding,
                )
            })
            .collect();
        let vlv_indexes = settings
            .vlv_indexes
            .iter()
            .map(|vlv| {
                Arc::new(VlvIndex::new(
                    tree(&format!("vlv.{}", vlv.name)),
                    vlv.sort_attributes.clone(),
                ))
            })
            .collect();

        Self {
            dn2id: Dn2Id::new(tree(DN2ID_TREE), base_dn.clone()),
            base_dn,
            storage,
            ids,
            state,
            id2entry,
            id2children,
            id2subtree,
            attribute_indexes,
            vlv_indexes,
        }
    }

    pub fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn dn2id(&self) -> &Dn2Id {
        &self.dn2id
    }

    pub fn id2entry(&self) -> &Id2Entry {
        &self.id2entry
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn id2children(&self) -> &Arc<Index> {
        &self.id2children
    }

    pub fn id2subtree(&self) -> &Arc<Index> {
        &self.id2subtree
    }

    pub fn attribute_indexes(&self) -> &[AttributeIndex] {
        &self.attribute_indexes
    }

    pub fn vlv_indexes(&self) -> &[Arc<VlvIndex>] {
        &self.vlv_indexes
    }

    /// Every entry ID set index: id2children, id2subtree, then attribute indexes.
    pub fn all_indexes(&self) -> Vec<Arc<Index>> {
        let mut indexes = vec![Arc::clone(&self.id2children), Arc::clone(&self.id2subtree)];
        for attribute in &self.attribute_indexes {
            indexes.extend(attribute.indexes().map(|(_, index)| Arc::clone(index)));
        }
        indexes
    }

    /// Opens every tree. State and id2entry come first: index open reads them.
    pub fn open(&self, txn: &mut dyn WriteableTransaction) -> dirstore_store::Result<()> {
        self.state.open(txn, true)?;
        self.id2entry.open(txn, true)?;
        self.dn2id.open(txn, true)?;
        for index in self.all_indexes() {
            index.open(txn, true)?;
        }
        for vlv in &self.vlv_indexes {
            vlv.open(txn, true)?;
        }
        Ok(())
    }

    /// Runs `f` in a write transaction, committing only on success.
    fn in_write_txn<R>(&self, f: impl FnOnce(&mut dyn WriteableTransaction) -> Result<R>) -> Result<R> {
        match self.storage.status() {
            StorageStatus::LockedDown(reason) => {
                return Err(DirectoryError::unwilling_to_perform(format!(
                    "The backend storage is locked down: {}",
                    reason
                )))
            }
            StorageStatus::LowSpace(reason) => {
                log::warn!("Backend storage for {} is low on space: {}", self.base_dn, reason)
            }
            StorageStatus::Working => {}
        }

        let mut txn = self.storage.begin_write()?;
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

    fn check_in_base(&self, dn: &Dn) -> Result<()> {
        if self.base_dn.is_superior_or_equal_to(dn) {
            Ok(())
        } else {
            Err(DirectoryError::unwilling_to_perform(format!(
                "Entry {} does not belong to base DN {}",
                dn, self.base_dn
            )))
        }
    }

    /// IDs of the strict ancestors of `dn` inside this container, parent first.
    fn ancestor_ids<T>(&self, txn: &T, dn: &Dn) -> Result<Vec<EntryId>>
    where
        T: ReadableTransaction + ?Sized,
    {
        let mut ids = Vec::new();
        for ancestor in dn.self_and_ancestors().skip(1) {
            if !self.base_dn.is_superior_or_equal_to(&ancestor) {
                break;
            }
            match self.dn2id.get(txn, &ancestor)? {
                Some(id) => ids.push(id),
                None => {
                    return Err(DirectoryError::no_such_object(format!(
                        "The parent entry {} does not exist",
                        ancestor
                    )))
                }
            }
        }
        Ok(ids)
    }

    fn buffer_attribute_keys(&self, buffer: &mut IndexBuffer, entry: &Entry, id: EntryId, add: bool) {
        for attribute in &self.attribute_indexes {
            if add {
                attribute.add_entry(buffer, entry, id);
            } else {
                attribute.remove_entry(buffer, entry, id);
            }
        }
        for vlv in &self.vlv_indexes {
            let sort_key = vlv.encode_sort_key(entry, id);
            if add {
                buffer.put_vlv(vlv, sort_key);
            } else {
                buffer.remove_vlv(vlv, sort_key);
            }
        }
    }

    fn buffer_hierarchy_keys(&self, buffer: &mut IndexBuffer, ancestors: &[EntryId], id: EntryId, add: bool) {
        if let Some(parent) = ancestors.first() {
            if add {
                buffer.put(&self.id2children, &parent.to_bytes(), id);
            } else {
                buffer.remove(&self.id2children, &parent.to_bytes(), id);
            }
        }
        for ancestor in ancestors {
            if add {
                buffer.put(&self.id2subtree, &ancestor.to_bytes(), id);
            } else {
                buffer.remove(&self.id2subtree, &ancestor.to_bytes(), id);
            }
        }
    }

    /// Adds `entry` with a freshly allocated ID.
    pub fn add_entry(&self, entry: &Entry) -> Result<EntryId> {
        self.id2entry.register(self.storage.as_ref(), entry)?;
        self.in_write_txn(|txn| self.add_entry_in(txn, entry))
    }

    /// Adds `entry` inside `txn`. Names without schema tokens are stored
    /// uncompressed.
    pub fn add_entry_in(&self, txn: &mut dyn WriteableTransaction, entry: &Entry) -> Result<EntryId> {
        let dn = entry.dn();
        self.check_in_base(dn)?;
        let ancestors = self.ancestor_ids(&*txn, dn)?;

        let id = self.ids.next_entry_id();
        if !self.dn2id.insert(txn, dn, id)? {
            return Err(DirectoryError::entry_already_exists(format!(
                "The entry {} already exists",
                dn
            )));
        }
        self.id2entry.put(txn, &id, entry)?;

        let mut buffer = IndexBuffer::new();
        self.buffer_attribute_keys(&mut buffer, entry, id, true);
        self.buffer_hierarchy_keys(&mut buffer, &ancestors, id, true);
        buffer.flush(txn)?;

        log::trace!("Added entry {} with ID {}", dn, id);
        Ok(id)
    }

    /// Replaces `old` by `new` (same DN), keeping the entry ID.
    pub fn replace_entry(&self, old: &Entry, new: &Entry) -> Result<EntryId> {
        self.id2entry.register(self.storage.as_ref(), new)?;
        self.in_write_txn(|txn| {
            let id = self.dn2id.get(&*txn, new.dn())?.ok_or_else(|| {
                DirectoryError::no_such_object(format!("The entry {} does not exist", new.dn()))
            })?;
            self.id2entry.put(txn, &id, new)?;

            let mut buffer = IndexBuffer::new();
            for attribute in &self.attribute_indexes {
                attribute.modify_entry(&mut buffer, old, new, id);
            }
            for vlv in &self.vlv_indexes {
                let old_key = vlv.encode_sort_key(old, id);
                let new_key = vlv.encode_sort_key(new, id);
                if old_key != new_key {
                    buffer.remove_vlv(vlv, old_key);
                    buffer.put_vlv(vlv, new_key);
                }
            }
            buffer.flush(txn)?;
            Ok(id)
        })
    }

    /// Deletes a leaf entry.
    pub fn delete_entry(&self, dn: &Dn) -> Result<EntryId> {
        self.in_write_txn(|txn| {
            let id = self.dn2id.get(&*txn, dn)?.ok_or_else(|| {
                DirectoryError::no_such_object(format!("The entry {} does not exist", dn))
            })?;
            let has_children = self.dn2id.open_children_cursor(&*txn, dn)?.next()?;
            if has_children {
                return Err(DirectoryError::not_allowed_on_non_leaf(format!(
                    "The entry {} has subordinate entries",
                    dn
                )));
            }
            let entry = self.id2entry.get(&*txn, &id)?.ok_or_else(|| {
                DirectoryError::operations_error(format!("Entry ID {} of {} has no entry", id, dn))
            })?;
            let ancestors = self.ancestor_ids(&*txn, dn)?;

            let mut buffer = IndexBuffer::new();
            self.buffer_attribute_keys(&mut buffer, &entry, id, false);
            self.buffer_hierarchy_keys(&mut buffer, &ancestors, id, false);
            buffer.flush(txn)?;

            let own_key = id.to_bytes();
            self.id2children.update(txn, &own_key, None, None)?;
            self.id2subtree.update(txn, &own_key, None, None)?;
            self.dn2id.remove(txn, dn)?;
            self.id2entry.delete(txn, &id)?;
            Ok(id)
        })
    }

    pub fn get_entry_id(&self, dn: &Dn) -> Result<Option<EntryId>> {
        let txn = self.storage.begin_read()?;
        Ok(self.dn2id.get(txn.as_ref(), dn)?)
    }

    pub fn get_entry(&self, dn: &Dn) -> Result<Option<Entry>> {
        let txn = self.storage.begin_read()?;
        match self.dn2id.get(txn.as_ref(), dn)? {
            Some(id) => Ok(self.id2entry.get(txn.as_ref(), &id)?),
            None => Ok(None),
        }
    }

    pub fn get_entry_by_id(&self, id: EntryId) -> Result<Option<Entry>> {
        let txn = self.storage.begin_read()?;
        Ok(self.id2entry.get(txn.as_ref(), &id)?)
    }

    /// All entries, in entry ID order.
    pub fn list_entries(&self) -> Result<Vec<(EntryId, Entry)>> {
        let txn = self.storage.begin_read()?;
        let mut cursor = self.id2entry.open_entry_cursor(txn.as_ref())?;
        Ok(cursor.read_remaining()?)
    }

    pub fn entry_count(&self) -> Result<u64> {
        let txn = self.storage.begin_read()?;
        Ok(self.id2entry.record_count(txn.as_ref())?)
    }

    pub fn get_highest_entry_id<T>(&self, txn: &T) -> dirstore_store::Result<EntryId>
    where
        T: ReadableTransaction + ?Sized,
    {
        self.id2entry.get_highest_entry_id(txn)
    }

    /// Number of immediate children, `None` if `dn` does not exist.
    ///
    /// Answered from id2children when the key is defined, otherwise by
    /// walking dn2id.
    pub fn get_number_of_children(&self, dn: &Dn) -> Result<Option<u64>> {
        let txn = self.storage.begin_read()?;
        let id = match self.dn2id.get(txn.as_ref(), dn)? {
            Some(id) => id,
            None => return Ok(None),
        };
        let children = self.id2children.get(txn.as_ref(), &id.to_bytes());
        if children.is_defined() {
            return Ok(Some(children.size()));
        }
        let mut cursor = self.dn2id.open_children_cursor(txn.as_ref(), dn)?;
        let mut count = 0;
        while cursor.next()? {
            count += 1;
        }
        Ok(Some(count))
    }

    /// Deletes and recreates every tree.
    pub fn clear(&self) -> Result<()> {
        log::info!("Clearing all data of base DN {}", self.base_dn);
        self.in_write_txn(|txn| {
            for vlv in &self.vlv_indexes {
                vlv.delete(txn)?;
            }
            for index in self.all_indexes() {
                index.delete(txn)?;
            }
            self.dn2id.delete(txn)?;
            Tree::delete(&self.id2entry, txn)?;
            self.state.delete(txn)?;
            Ok(self.open(txn)?)
        })
    }

    /// Deletes and recreates every index tree. Entries and dn2id are kept.
    ///
    /// The recreated indexes come back untrusted unless the container holds
    /// no entry.
    pub fn clear_indexes(&self) -> Result<()> {
        log::info!("Clearing the indexes of base DN {}", self.base_dn);
        self.in_write_txn(|txn| {
            for vlv in &self.vlv_indexes {
                vlv.delete(txn)?;
                vlv.open(txn, true)?;
            }
            for index in self.all_indexes() {
                index.delete(txn)?;
                index.open(txn, true)?;
            }
            Ok(())
        })
    }

    /// Marks every index of this container trusted or untrusted.
    pub fn set_indexes_trusted(&self, txn: &mut dyn WriteableTransaction, trusted: bool) -> dirstore_store::Result<()> {
        for index in self.all_indexes() {
            index.set_trusted(txn, trusted)?;
        }
        Ok(())
    }

    pub fn index_status(&self) -> Result<Vec<IndexStatus>> {
        let txn = self.storage.begin_read()?;
        self.all_indexes()
            .iter()
            .map(|index| {
                let record_count = match index.record_count(txn.as_ref()) {
                    Err(StorageError::TreeNotFound(_)) => 0,
                    other => other?,
                };
                Ok(IndexStatus {
                    name: index.name().clone(),
                    active: index.is_active(),
                    trusted: index.is_trusted(),
                    index_entry_limit: index.index_entry_limit(),
                    entry_limit_exceeded: index.entry_limit_exceeded_count(),
                    record_count,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute_index::PRESENCE_KEY;
    use crate::id2entry::EntryRecord;
    use dirstore_commons::KSerializable;
    use crate::error::ResultCode;
    use dirstore_configs::{AttributeIndexSettings, IndexType, VlvIndexSettings};
    use dirstore_store::{InMemoryStorage, StorageExt};

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn person(dn_str: &str, cn: &str, sn: &str) -> Entry {
        let mut entry = Entry::new(dn(dn_str));
        entry.add_attribute_value("objectClass", "person");
        entry.add_attribute_value("cn", cn);
        entry.add_attribute_value("sn", sn);
        entry
    }

    fn settings() -> IndexSettings {
        IndexSettings {
            attribute_indexes: vec![AttributeIndexSettings {
                attribute: "cn".to_string(),
                types: vec![IndexType::Equality, IndexType::Presence],
                entry_limit: None,
            }],
            vlv_indexes: vec![VlvIndexSettings {
                name: "by-sn".to_string(),
                sort_attributes: vec!["sn".to_string()],
            }],
            ..IndexSettings::default()
        }
    }

    fn setup() -> (Arc<InMemoryStorage>, EntryContainer) {
        let storage = Arc::new(InMemoryStorage::new());
        let container = EntryContainer::new(
            dn("o=test"),
            storage.clone(),
            Arc::new(EntryIdSequence::default()),
            &settings(),
        );
        storage.write(|txn| container.open(txn)).unwrap();
        container.add_entry(&Entry::new(dn("o=test"))).unwrap();
        container.add_entry(&Entry::new(dn("ou=people,o=test"))).unwrap();
        (storage, container)
    }

    fn cn_equality(container: &EntryContainer) -> &Arc<Index> {
        container.attribute_indexes()[0]
            .index(IndexType::Equality)
            .unwrap()
    }

    #[test]
    fn test_add_maintains_hierarchy_and_attribute_indexes() {
        let (storage, container) = setup();
        let john = container
            .add_entry(&person("cn=John,ou=people,o=test", "John", "Doe"))
            .unwrap();
        let jane = container
            .add_entry(&person("cn=Jane,ou=people,o=test", "Jane", "Adams"))
            .unwrap();
        assert_eq!(john, EntryId::new(3));
        assert_eq!(jane, EntryId::new(4));

        assert_eq!(container.get_entry_id(&dn("cn=jane,ou=people,o=test")).unwrap(), Some(jane));
        assert_eq!(container.get_number_of_children(&dn("ou=people,o=test")).unwrap(), Some(2));
        assert_eq!(container.get_number_of_children(&dn("o=test")).unwrap(), Some(1));
        assert_eq!(container.get_number_of_children(&dn("cn=x,o=test")).unwrap(), None);

        let txn = storage.begin_read().unwrap();
        let root_subtree = container.id2subtree().get(txn.as_ref(), &EntryId::new(1).to_bytes());
        assert_eq!(root_subtree.size(), 3);
        let johns = cn_equality(&container).get(txn.as_ref(), b"john");
        assert_eq!(johns.ids(), Some(&[john][..]));
        let present = container.attribute_indexes()[0]
            .index(IndexType::Presence)
            .unwrap()
            .get(txn.as_ref(), PRESENCE_KEY);
        assert_eq!(present.size(), 2);
        let sorted = container.vlv_indexes()[0].read_page(txn.as_ref(), 0, 10).unwrap();
        assert_eq!(sorted, vec![jane, john, EntryId::new(1), EntryId::new(2)]);
    }

    #[test]
    fn test_add_failures() {
        let (_storage, container) = setup();
        let err = container.add_entry(&Entry::new(dn("ou=people,o=test"))).unwrap_err();
        assert_eq!(err.result_code, ResultCode::EntryAlreadyExists);

        let err = container
            .add_entry(&Entry::new(dn("cn=x,ou=missing,o=test")))
            .unwrap_err();
        assert_eq!(err.result_code, ResultCode::NoSuchObject);

        let err = container.add_entry(&Entry::new(dn("o=other"))).unwrap_err();
        assert_eq!(err.result_code, ResultCode::UnwillingToPerform);
        assert_eq!(container.entry_count().unwrap(), 2);
    }

    /// Hides one key from reads, as a transaction that checked before a
    /// concurrent add committed would.
    struct StaleRead<'a> {
        inner: &'a mut dyn WriteableTransaction,
        tree: TreeName,
        key: Vec<u8>,
    }

    impl ReadableTransaction for StaleRead<'_> {
        fn read(&self, tree: &TreeName, key: &[u8]) -> dirstore_store::Result<Option<Vec<u8>>> {
            if *tree == self.tree && key == self.key.as_slice() {
                return Ok(None);
            }
            self.inner.read(tree, key)
        }

        fn open_cursor(&self, tree: &TreeName) -> dirstore_store::Result<dirstore_store::RawCursor<'_>> {
            self.inner.open_cursor(tree)
        }

        fn record_count(&self, tree: &TreeName) -> dirstore_store::Result<Option<u64>> {
            self.inner.record_count(tree)
        }
    }

    impl WriteableTransaction for StaleRead<'_> {
        fn open_tree(&mut self, tree: &TreeName, create_on_demand: bool) -> dirstore_store::Result<bool> {
            self.inner.open_tree(tree, create_on_demand)
        }

        fn delete_tree(&mut self, tree: &TreeName) -> dirstore_store::Result<()> {
            self.inner.delete_tree(tree)
        }

        fn put(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> dirstore_store::Result<()> {
            self.inner.put(tree, key, value)
        }

        fn put_if_absent(&mut self, tree: &TreeName, key: &[u8], value: &[u8]) -> dirstore_store::Result<bool> {
            self.inner.put_if_absent(tree, key, value)
        }

        fn update(
            &mut self,
            tree: &TreeName,
            key: &[u8],
            f: &mut dirstore_store::UpdateFn<'_>,
        ) -> dirstore_store::Result<bool> {
            self.inner.update(tree, key, f)
        }

        fn delete(&mut self, tree: &TreeName, key: &[u8]) -> dirstore_store::Result<bool> {
            self.inner.delete(tree, key)
        }

        fn commit(self: Box<Self>) -> dirstore_store::Result<()> {
            Ok(())
        }

        fn rollback(self: Box<Self>) -> dirstore_store::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_add_does_not_overwrite_dn_mapped_after_check() {
        let (storage, container) = setup();
        let john = person("cn=John,ou=people,o=test", "John", "Doe");
        let first = container.add_entry(&john).unwrap();

        let mut txn = storage.begin_write().unwrap();
        let mut stale = StaleRead {
            inner: txn.as_mut(),
            tree: container.dn2id().name().clone(),
            key: container.dn2id().dn_to_key(john.dn()),
        };
        assert_eq!(container.dn2id().get(&stale, john.dn()).unwrap(), None);
        let err = container.add_entry_in(&mut stale, &john).unwrap_err();
        assert_eq!(err.result_code, ResultCode::EntryAlreadyExists);
        drop(stale);
        txn.rollback().unwrap();

        assert_eq!(container.get_entry_id(john.dn()).unwrap(), Some(first));
        assert_eq!(container.entry_count().unwrap(), 3);
        let txn = storage.begin_read().unwrap();
        assert_eq!(cn_equality(&container).get(txn.as_ref(), b"john").ids(), Some(&[first][..]));
    }

    #[test]
    fn test_compact_entries_survive_reopen() {
        let (storage, container) = setup();
        let john = person("cn=John,ou=people,o=test", "John", "Doe");
        let id = container.add_entry(&john).unwrap();

        let txn = storage.begin_read().unwrap();
        let raw = txn
            .read(container.id2entry().name(), &id.to_bytes())
            .unwrap()
            .unwrap();
        assert!(matches!(
            EntryRecord::decode(&raw).unwrap(),
            EntryRecord::Compressed(_)
        ));
        drop(txn);

        let reopened = EntryContainer::new(
            dn("o=test"),
            storage.clone(),
            Arc::new(EntryIdSequence::default()),
            &settings(),
        );
        storage.write(|txn| reopened.open(txn)).unwrap();
        assert_eq!(reopened.get_entry(john.dn()).unwrap(), Some(john));
        assert_eq!(reopened.list_entries().unwrap().len(), 3);
    }

    #[test]
    fn test_plain_encoding_when_compaction_is_off() {
        let storage = Arc::new(InMemoryStorage::new());
        let settings = IndexSettings {
            compact_encoding: false,
            ..settings()
        };
        let container = EntryContainer::new(
            dn("o=test"),
            storage.clone(),
            Arc::new(EntryIdSequence::default()),
            &settings,
        );
        storage.write(|txn| container.open(txn)).unwrap();
        let id = container.add_entry(&Entry::new(dn("o=test"))).unwrap();

        assert!(container.id2entry().schema().is_none());
        let txn = storage.begin_read().unwrap();
        let raw = txn
            .read(container.id2entry().name(), &id.to_bytes())
            .unwrap()
            .unwrap();
        assert!(matches!(EntryRecord::decode(&raw).unwrap(), EntryRecord::Plain(_)));
    }

    #[test]
    fn test_replace_updates_index_keys() {
        let (storage, container) = setup();
        let old = person("cn=John,ou=people,o=test", "John", "Doe");
        let id = container.add_entry(&old).unwrap();
        let mut new = old.clone();
        new.add_attribute_value("cn", "Johnny");

        assert_eq!(container.replace_entry(&old, &new).unwrap(), id);
        assert_eq!(container.get_entry_by_id(id).unwrap(), Some(new));

        let txn = storage.begin_read().unwrap();
        assert_eq!(cn_equality(&container).get(txn.as_ref(), b"johnny").ids(), Some(&[id][..]));
        assert_eq!(cn_equality(&container).get(txn.as_ref(), b"john").ids(), Some(&[id][..]));
    }

    #[test]
    fn test_delete_leaf_only() {
        let (storage, container) = setup();
        let id = container
            .add_entry(&person("cn=John,ou=people,o=test", "John", "Doe"))
            .unwrap();

        let err = container.delete_entry(&dn("ou=people,o=test")).unwrap_err();
        assert_eq!(err.result_code, ResultCode::NotAllowedOnNonLeaf);

        assert_eq!(container.delete_entry(&dn("cn=John,ou=people,o=test")).unwrap(), id);
        assert_eq!(container.get_entry(&dn("cn=John,ou=people,o=test")).unwrap(), None);
        assert_eq!(container.get_number_of_children(&dn("ou=people,o=test")).unwrap(), Some(0));

        let txn = storage.begin_read().unwrap();
        assert!(cn_equality(&container).get(txn.as_ref(), b"john").is_empty());
        assert_eq!(container.vlv_indexes()[0].read_page(txn.as_ref(), 0, 10).unwrap().len(), 2);
        drop(txn);

        let err = container.delete_entry(&dn("cn=John,ou=people,o=test")).unwrap_err();
        assert_eq!(err.result_code, ResultCode::NoSuchObject);
    }

    #[test]
    fn test_locked_down_storage_refuses_writes() {
        let (storage, container) = setup();
        storage.set_status(StorageStatus::LockedDown("disk full".to_string()));
        let err = container
            .add_entry(&Entry::new(dn("ou=groups,o=test")))
            .unwrap_err();
        assert_eq!(err.result_code, ResultCode::UnwillingToPerform);

        storage.set_status(StorageStatus::LowSpace("95%".to_string()));
        container.add_entry(&Entry::new(dn("ou=groups,o=test"))).unwrap();
    }

    #[test]
    fn test_clear_and_status() {
        let (_storage, container) = setup();
        let status = container.index_status().unwrap();
        assert_eq!(status.len(), 4);
        assert!(status.iter().all(|s| s.trusted && s.active));

        container.clear().unwrap();
        assert_eq!(container.entry_count().unwrap(), 0);
        assert!(container.list_entries().unwrap().is_empty());
        assert!(container
            .index_status()
            .unwrap()
            .iter()
            .all(|s| s.record_count == 0 && s.trusted));
    }
}
