//! EntryID → entry tree.
//!
//! Values are [`EntryRecord`]s. With a [`CompressedSchema`] attached, entries
//! whose names all have tokens are stored compressed; the rest stay plain
//! until a later write.

use crate::compressed_schema::{CompressedEntry, CompressedSchema};
use dirstore_commons::{Entry, EntryId, KSerializable, TreeName};
use dirstore_store::{
    Cursor, CursorTransformer, Importer, RawCursor, ReadableTransaction, Result, SequentialCursor, Storage,
    StorageError, Tree, TreeKey, TypedTree, WriteableTransaction,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored form of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRecord {
    Plain(Entry),
    Compressed(CompressedEntry),
}

impl KSerializable for EntryRecord {}

/// Cursor over decoded entries, keyed by ID.
pub type EntryCursor<'t> = CursorTransformer<'static, RawCursor<'t>, EntryId, Entry>;

#[derive(Debug, Clone)]
pub struct Id2Entry {
    name: TreeName,
    schema: Option<Arc<CompressedSchema>>,
}

impl Id2Entry {
    pub fn new(name: TreeName) -> Self {
        Self { name, schema: None }
    }

    pub fn with_schema(name: TreeName, schema: Arc<CompressedSchema>) -> Self {
        Self {
            name,
            schema: Some(schema),
        }
    }

    pub fn schema(&self) -> Option<&Arc<CompressedSchema>> {
        self.schema.as_ref()
    }

    pub fn encode_entry(&self, entry: &Entry) -> Result<Vec<u8>> {
        Ok(self.to_record(entry).encode()?)
    }

    pub fn decode_entry(&self, bytes: &[u8]) -> Result<Entry> {
        self.from_record(EntryRecord::decode(bytes)?)
    }

    fn to_record(&self, entry: &Entry) -> EntryRecord {
        match self.schema.as_ref().and_then(|schema| schema.compress(entry)) {
            Some(compressed) => EntryRecord::Compressed(compressed),
            None => EntryRecord::Plain(entry.clone()),
        }
    }

    fn from_record(&self, record: EntryRecord) -> Result<Entry> {
        match (record, &self.schema) {
            (EntryRecord::Plain(entry), _) => Ok(entry),
            (EntryRecord::Compressed(compressed), Some(schema)) => schema.decompress(compressed),
            (EntryRecord::Compressed(_), None) => Err(StorageError::invariant(format!(
                "{} holds a compressed entry but compact encoding is off",
                self.name
            ))),
        }
    }

    /// Allocates schema tokens for `entry`. Runs its own write transaction.
    pub fn register(&self, storage: &dyn Storage, entry: &Entry) -> Result<()> {
        match &self.schema {
            Some(schema) => schema.register(storage, entry),
            None => Ok(()),
        }
    }

    pub fn put(&self, txn: &mut dyn WriteableTransaction, id: &EntryId, entry: &Entry) -> Result<()> {
        TypedTree::put(self, txn, id, &self.to_record(entry))
    }

    pub fn get<T>(&self, txn: &T, id: &EntryId) -> Result<Option<Entry>>
    where
        T: ReadableTransaction + ?Sized,
    {
        TypedTree::get(self, txn, id)?
            .map(|record| self.from_record(record))
            .transpose()
    }

    /// Returns `true` if the entry existed.
    pub fn delete(&self, txn: &mut dyn WriteableTransaction, id: &EntryId) -> Result<bool> {
        TypedTree::delete(self, txn, id)
    }

    pub fn import_put(&self, importer: &dyn Importer, id: &EntryId, entry: &Entry) -> Result<()> {
        if let Some(schema) = &self.schema {
            schema.register_on_import(importer, entry)?;
        }
        importer.put(&self.name, &id.to_bytes(), &self.encode_entry(entry)?)
    }

    pub fn import_get(&self, importer: &dyn Importer, id: &EntryId) -> Result<Option<Entry>> {
        importer
            .read(&self.name, &id.to_bytes())?
            .map(|bytes| self.decode_entry(&bytes))
            .transpose()
    }

    /// Cursor decoding entries on access.
    pub fn open_entry_cursor<'t, T>(&self, txn: &'t T) -> Result<EntryCursor<'t>>
    where
        T: ReadableTransaction + ?Sized,
    {
        let raw = txn.open_cursor(&self.name)?;
        let this = self.clone();
        Ok(CursorTransformer::transform_keys_and_values(
            raw,
            |key: &Vec<u8>| EntryId::from_key_bytes(key),
            move |_key: &Vec<u8>, value: &Vec<u8>| this.decode_entry(value),
        ))
    }

    /// Largest ID stored, or 0 when the tree is empty.
    pub fn get_highest_entry_id<T>(&self, txn: &T) -> Result<EntryId>
    where
        T: ReadableTransaction + ?Sized,
    {
        let mut cursor = self.open_typed_cursor(txn)?;
        if cursor.position_to_last_key()? {
            cursor.key()
        } else {
            Ok(EntryId::new(0))
        }
    }
}

impl Tree for Id2Entry {
    fn name(&self) -> &TreeName {
        &self.name
    }

    fn after_open(&self, txn: &mut dyn WriteableTransaction, _created: bool) -> Result<()> {
        match &self.schema {
            Some(schema) => schema.open(txn),
            None => Ok(()),
        }
    }
}

impl TypedTree<EntryId, EntryRecord> for Id2Entry {
    fn tree_name(&self) -> &TreeName {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compressed_schema::{COMPRESSED_ATTRIBUTES_TREE, COMPRESSED_OBJECT_CLASSES_TREE};
    use dirstore_commons::Dn;
    use dirstore_store::{InMemoryStorage, StorageExt};

    fn compact() -> Id2Entry {
        Id2Entry::with_schema(
            TreeName::new("o=test", "id2entry"),
            Arc::new(CompressedSchema::new(
                TreeName::new("o=test", COMPRESSED_ATTRIBUTES_TREE),
                TreeName::new("o=test", COMPRESSED_OBJECT_CLASSES_TREE),
            )),
        )
    }

    fn person(cn: &str) -> Entry {
        let mut entry = Entry::new(Dn::parse(&format!("cn={},o=test", cn)).unwrap());
        entry.add_attribute_value("objectClass", "person");
        entry.add_attribute_value("cn", cn);
        entry
    }

    #[test]
    fn test_highest_entry_id() {
        let storage = InMemoryStorage::new();
        let id2entry = Id2Entry::new(TreeName::new("o=test", "id2entry"));
        storage.write(|txn| id2entry.open(txn, true)).unwrap();
        {
            let txn = storage.begin_read().unwrap();
            assert_eq!(id2entry.get_highest_entry_id(txn.as_ref()).unwrap(), EntryId::new(0));
        }

        storage
            .write(|txn| {
                for id in [3u64, 300, 12] {
                    let entry = Entry::new(Dn::parse(&format!("cn={},o=test", id))?);
                    id2entry.put(txn, &EntryId::new(id), &entry)?;
                }
                Ok(())
            })
            .unwrap();

        let txn = storage.begin_read().unwrap();
        assert_eq!(id2entry.get_highest_entry_id(txn.as_ref()).unwrap(), EntryId::new(300));
        let entry = id2entry.get(txn.as_ref(), &EntryId::new(12)).unwrap().unwrap();
        assert_eq!(entry.dn().to_string(), "cn=12,o=test");
    }

    #[test]
    fn test_registered_entries_are_stored_compressed() {
        let storage = InMemoryStorage::new();
        let id2entry = compact();
        storage.write(|txn| id2entry.open(txn, true)).unwrap();

        let unregistered = person("a");
        let registered = person("b");
        id2entry.register(&storage, &registered).unwrap();
        storage
            .write(|txn| {
                id2entry.put(txn, &EntryId::new(1), &unregistered)?;
                id2entry.put(txn, &EntryId::new(2), &registered)
            })
            .unwrap();

        let txn = storage.begin_read().unwrap();
        let raw = |id: u64| EntryRecord::decode(&txn.read(id2entry.name(), &EntryId::new(id).to_bytes()).unwrap().unwrap()).unwrap();
        assert!(matches!(raw(1), EntryRecord::Plain(_)));
        assert!(matches!(raw(2), EntryRecord::Compressed(_)));

        let mut cursor = id2entry.open_entry_cursor(txn.as_ref()).unwrap();
        assert_eq!(
            cursor.read_remaining().unwrap(),
            vec![(EntryId::new(1), unregistered), (EntryId::new(2), registered.clone())]
        );
        drop(cursor);
        drop(txn);

        // A fresh schema loads the tokens when the tree opens.
        let reopened = compact();
        storage.write(|txn| reopened.open(txn, true)).unwrap();
        let txn = storage.begin_read().unwrap();
        assert_eq!(reopened.get(txn.as_ref(), &EntryId::new(2)).unwrap(), Some(registered));
    }

    #[test]
    fn test_compressed_entry_without_schema_is_an_error() {
        let storage = InMemoryStorage::new();
        let id2entry = compact();
        storage.write(|txn| id2entry.open(txn, true)).unwrap();
        let entry = person("a");
        id2entry.register(&storage, &entry).unwrap();
        storage.write(|txn| id2entry.put(txn, &EntryId::new(1), &entry)).unwrap();

        let plain = Id2Entry::new(TreeName::new("o=test", "id2entry"));
        let txn = storage.begin_read().unwrap();
        assert!(matches!(
            plain.get(txn.as_ref(), &EntryId::new(1)),
            Err(StorageError::InvariantViolation(_))
        ));
    }
}
