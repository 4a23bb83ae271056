//! Equality and presence indexes of one attribute.

use crate::id2entry::Id2Entry;
use crate::index::{DefaultIndex, Index};
use crate::index_buffer::IndexBuffer;
use crate::state::State;
use dirstore_commons::{Entry, EntryId, TreeName};
use dirstore_configs::{AttributeIndexSettings, IndexType};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Single key of every presence index.
pub const PRESENCE_KEY: &[u8] = b"+";

/// Case-ignore normalization: trimmed, lowercased, inner whitespace collapsed
/// to one space. NUL characters are dropped.
pub fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .replace('\0', "")
}

/// Index keys `entry` produces for `attribute` in an index of `index_type`.
pub fn index_keys(index_type: IndexType, attribute: &str, entry: &Entry) -> BTreeSet<Vec<u8>> {
    let values = entry.attribute(attribute).unwrap_or(&[]);
    match index_type {
        IndexType::Equality => values
            .iter()
            .map(|value| normalize_value(value).into_bytes())
            .collect(),
        IndexType::Presence if !values.is_empty() => BTreeSet::from([PRESENCE_KEY.to_vec()]),
        IndexType::Presence => BTreeSet::new(),
    }
}

pub struct AttributeIndex {
    attribute: String,
    indexes: Vec<(IndexType, Arc<Index>)>,
}

impl AttributeIndex {
    /// Index trees are named `<attribute>.<type>` under `base_dn`.
    pub fn new(
        base_dn: &str,
        settings: &AttributeIndexSettings,
        default_entry_limit: usize,
        state: &State,
        id2entry: &Id2Entry,
        compact_encoding: bool,
    ) -> Self {
        let attribute = settings.attribute.to_ascii_lowercase();
        let limit = settings.entry_limit.unwrap_or(default_entry_limit);
        let types: BTreeSet<IndexType> = settings.types.iter().copied().collect();
        let indexes = types
            .into_iter()
            .map(|index_type| {
                let name = TreeName::new(base_dn, format!("{}.{}", attribute, index_type.as_str()));
                let index = DefaultIndex::new(name, state.clone(), id2entry.clone(), limit, compact_encoding);
                (index_type, Arc::new(Index::Active(index)))
            })
            .collect();
        Self { attribute, indexes }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn indexes(&self) -> impl Iterator<Item = (IndexType, &Arc<Index>)> {
        self.indexes.iter().map(|(index_type, index)| (*index_type, index))
    }

    pub fn index(&self, index_type: IndexType) -> Option<&Arc<Index>> {
        self.indexes
            .iter()
            .find(|(t, _)| *t == index_type)
            .map(|(_, index)| index)
    }

    pub fn add_entry(&self, buffer: &mut IndexBuffer, entry: &Entry, id: EntryId) {
        for (index_type, index) in &self.indexes {
            for key in index_keys(*index_type, &self.attribute, entry) {
                buffer.put(index, &key, id);
            }
        }
    }

    pub fn remove_entry(&self, buffer: &mut IndexBuffer, entry: &Entry, id: EntryId) {
        for (index_type, index) in &self.indexes {
            for key in index_keys(*index_type, &self.attribute, entry) {
                buffer.remove(index, &key, id);
            }
        }
    }

    /// Buffers only the keys that differ between `old` and `new`.
    pub fn modify_entry(&self, buffer: &mut IndexBuffer, old: &Entry, new: &Entry, id: EntryId) {
        for (index_type, index) in &self.indexes {
            let old_keys = index_keys(*index_type, &self.attribute, old);
            let new_keys = index_keys(*index_type, &self.attribute, new);
            for key in old_keys.difference(&new_keys) {
                buffer.remove(index, key, id);
            }
            for key in new_keys.difference(&old_keys) {
                buffer.put(index, key, id);
            }
        }
    }
}
