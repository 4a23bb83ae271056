//! Token dictionaries for attribute names and object class sets.
//!
//! ```text
//! <base>/compressed_attributes      token (u32 BE) → attribute name
//! <base>/compressed_object_classes  token (u32 BE) → class names, NUL separated
//! ```
//!
//! A token is persisted before any entry that uses it and is never reused.
//! Entries with a name that has no token yet are stored uncompressed by
//! [`crate::id2entry::Id2Entry`].

use dashmap::DashMap;
use dirstore_commons::{Dn, Entry, KSerializable, TreeName};
use dirstore_store::{
    Importer, ReadableTransaction, Result, SequentialCursor, Storage, StorageError, StorageExt,
    WriteableTransaction,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub const COMPRESSED_ATTRIBUTES_TREE: &str = "compressed_attributes";
pub const COMPRESSED_OBJECT_CLASSES_TREE: &str = "compressed_object_classes";

const OBJECT_CLASS: &str = "objectclass";
const CLASS_SEPARATOR: &str = "\0";

/// An entry whose attribute names and object class set are tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedEntry {
    dn: Dn,
    object_classes: Option<u32>,
    attributes: Vec<(u32, Vec<String>)>,
}

impl KSerializable for CompressedEntry {}

#[derive(Debug)]
struct NextTokens {
    attribute: u32,
    object_class: u32,
}

/// One pending token record: tree, key, value.
type TokenRecord<'a> = (&'a TreeName, Vec<u8>, Vec<u8>);

#[derive(Debug)]
pub struct CompressedSchema {
    attributes_tree: TreeName,
    object_classes_tree: TreeName,
    attribute_tokens: DashMap<String, u32>,
    attribute_names: DashMap<u32, String>,
    object_class_tokens: DashMap<Vec<String>, u32>,
    object_class_sets: DashMap<u32, Vec<String>>,
    next: Mutex<NextTokens>,
}

impl CompressedSchema {
    pub fn new(attributes_tree: TreeName, object_classes_tree: TreeName) -> Self {
        Self {
            attributes_tree,
            object_classes_tree,
            attribute_tokens: DashMap::new(),
            attribute_names: DashMap::new(),
            object_class_tokens: DashMap::new(),
            object_class_sets: DashMap::new(),
            next: Mutex::new(NextTokens {
                attribute: 1,
                object_class: 1,
            }),
        }
    }

    pub fn attributes_tree(&self) -> &TreeName {
        &self.attributes_tree
    }

    pub fn object_classes_tree(&self) -> &TreeName {
        &self.object_classes_tree
    }

    /// Opens both trees and loads every persisted token.
    pub fn open(&self, txn: &mut dyn WriteableTransaction) -> Result<()> {
        txn.open_tree(&self.attributes_tree, true)?;
        txn.open_tree(&self.object_classes_tree, true)?;
        self.load(&*txn)
    }

    fn load<T>(&self, txn: &T) -> Result<()>
    where
        T: ReadableTransaction + ?Sized,
    {
        let mut next = self.next.lock();

        let mut cursor = txn.open_cursor(&self.attributes_tree)?;
        while cursor.next()? {
            let token = decode_token(&cursor.key()?)?;
            let name = String::from_utf8(cursor.value()?).map_err(|e| {
                StorageError::Serialization(format!("Attribute token {} is not UTF-8: {}", token, e))
            })?;
            self.attribute_names.insert(token, name.clone());
            self.attribute_tokens.insert(name, token);
            next.attribute = next.attribute.max(token + 1);
        }

        let mut cursor = txn.open_cursor(&self.object_classes_tree)?;
        while cursor.next()? {
            let token = decode_token(&cursor.key()?)?;
            let joined = String::from_utf8(cursor.value()?).map_err(|e| {
                StorageError::Serialization(format!("Object class token {} is not UTF-8: {}", token, e))
            })?;
            let classes: Vec<String> = joined.split(CLASS_SEPARATOR).map(str::to_string).collect();
            self.object_class_sets.insert(token, classes.clone());
            self.object_class_tokens.insert(classes, token);
            next.object_class = next.object_class.max(token + 1);
        }

        log::debug!(
            "Loaded {} attribute and {} object class tokens from {}",
            self.attribute_names.len(),
            self.object_class_sets.len(),
            self.attributes_tree.base_dn()
        );
        Ok(())
    }

    /// True if every name of `entry` has a token.
    pub fn is_registered(&self, entry: &Entry) -> bool {
        let classes = entry.object_classes();
        entry
            .attributes()
            .all(|(name, _)| name == OBJECT_CLASS || self.attribute_tokens.contains_key(name))
            && (classes.is_empty() || self.object_class_tokens.contains_key(classes))
    }

    /// Allocates tokens for the names of `entry` that have none, persisting
    /// them in a write transaction of their own. The caller must not hold a
    /// transaction on `storage`.
    pub fn register(&self, storage: &dyn Storage, entry: &Entry) -> Result<()> {
        self.register_with(entry, |records| {
            StorageExt::write(storage, |txn| {
                for (tree, key, value) in records {
                    txn.put(tree, key, value)?;
                }
                Ok(())
            })
        })
    }

    /// Same as [`CompressedSchema::register`], writing through a bulk importer.
    pub fn register_on_import(&self, importer: &dyn Importer, entry: &Entry) -> Result<()> {
        self.register_with(entry, |records| {
            for (tree, key, value) in records {
                importer.put(tree, key, value)?;
            }
            Ok(())
        })
    }

    fn register_with(&self, entry: &Entry, persist: impl FnOnce(&[TokenRecord<'_>]) -> Result<()>) -> Result<()> {
        if self.is_registered(entry) {
            return Ok(());
        }
        let mut next = self.next.lock();

        let mut records = Vec::new();
        let mut attribute = next.attribute;
        let mut new_attributes = Vec::new();
        for (name, _) in entry.attributes() {
            if name == OBJECT_CLASS || self.attribute_tokens.contains_key(name) {
                continue;
            }
            records.push((&self.attributes_tree, attribute.to_be_bytes().to_vec(), name.as_bytes().to_vec()));
            new_attributes.push((attribute, name.to_string()));
            attribute += 1;
        }

        let classes = entry.object_classes();
        let mut object_class = next.object_class;
        let mut new_classes = None;
        if !classes.is_empty() && !self.object_class_tokens.contains_key(classes) {
            let joined = classes.join(CLASS_SEPARATOR);
            records.push((&self.object_classes_tree, object_class.to_be_bytes().to_vec(), joined.into_bytes()));
            new_classes = Some((object_class, classes.to_vec()));
            object_class += 1;
        }

        if records.is_empty() {
            return Ok(());
        }
        persist(&records)?;
        next.attribute = attribute;
        next.object_class = object_class;

        // Reverse maps first: a token is never visible without its name.
        for (token, name) in new_attributes {
            log::trace!("Attribute {} of {} gets token {}", name, self.attributes_tree.base_dn(), token);
            self.attribute_names.insert(token, name.clone());
            self.attribute_tokens.insert(name, token);
        }
        if let Some((token, classes)) = new_classes {
            self.object_class_sets.insert(token, classes.clone());
            self.object_class_tokens.insert(classes, token);
        }
        Ok(())
    }

    /// `None` when a name of `entry` has no token yet.
    pub fn compress(&self, entry: &Entry) -> Option<CompressedEntry> {
        let classes = entry.object_classes();
        let object_classes = if classes.is_empty() {
            None
        } else {
            Some(*self.object_class_tokens.get(classes)?)
        };
        let attributes = entry
            .attributes()
            .filter(|(name, _)| *name != OBJECT_CLASS)
            .map(|(name, values)| {
                self.attribute_tokens
                    .get(name)
                    .map(|token| (*token, values.to_vec()))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(CompressedEntry {
            dn: entry.dn().clone(),
            object_classes,
            attributes,
        })
    }

    pub fn decompress(&self, compressed: CompressedEntry) -> Result<Entry> {
        let mut entry = Entry::new(compressed.dn);
        if let Some(token) = compressed.object_classes {
            let classes = self.object_class_sets.get(&token).ok_or_else(|| {
                StorageError::invariant(format!("Unknown object class token {} in {}", token, self.object_classes_tree))
            })?;
            for class in classes.iter() {
                entry.add_attribute_value(OBJECT_CLASS, class.clone());
            }
        }
        for (token, values) in compressed.attributes {
            let name = self.attribute_names.get(&token).ok_or_else(|| {
                StorageError::invariant(format!("Unknown attribute token {} in {}", token, self.attributes_tree))
            })?;
            for value in values {
                entry.add_attribute_value(name.as_str(), value);
            }
        }
        Ok(entry)
    }
}

fn decode_token(bytes: &[u8]) -> Result<u32> {
    let array: [u8; 4] = bytes
        .try_into()
        .map_err(|_| StorageError::Serialization(format!("Schema token key has {} bytes", bytes.len())))?;
    Ok(u32::from_be_bytes(array))
}
