//! Entry ID sets accumulated by the merge importer.

use crate::codec::CodecVersion;
use crate::entry_id_set::EntryIdSet;
use dirstore_commons::EntryId;

/// A mutable [`EntryIdSet`] bounded by an index entry limit.
///
/// Import-time limits are exclusive: a set degrades to undefined once it
/// would hold more than `index_entry_limit` IDs. A limit of 0 disables the
/// bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportIdSet {
    set: EntryIdSet,
    index_entry_limit: usize,
}

impl ImportIdSet {
    pub fn new(key: impl Into<Vec<u8>>, index_entry_limit: usize) -> Self {
        Self {
            set: EntryIdSet::empty(key),
            index_entry_limit,
        }
    }

    pub fn from_entry_id_set(set: EntryIdSet, index_entry_limit: usize) -> Self {
        let mut import_set = Self {
            set,
            index_entry_limit,
        };
        if import_set.exceeds(import_set.set.size()) {
            import_set.set.to_undefined();
        }
        import_set
    }

    fn exceeds(&self, size: u64) -> bool {
        self.set.is_defined() && self.index_entry_limit > 0 && size > self.index_entry_limit as u64
    }

    pub fn key(&self) -> &[u8] {
        self.set.key()
    }

    pub fn is_defined(&self) -> bool {
        self.set.is_defined()
    }

    pub fn size(&self) -> u64 {
        self.set.size()
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.set.contains(id)
    }

    pub fn add(&mut self, id: EntryId) {
        if self.exceeds(self.set.size() + 1) && !self.set.contains(id) {
            self.set = EntryIdSet::undefined_with_size(self.set.key(), self.set.size() + 1);
        } else {
            self.set.add(id);
        }
    }

    pub fn remove(&mut self, id: EntryId) {
        self.set.remove(id);
    }

    /// Adds every ID of `other`.
    pub fn merge(&mut self, other: &ImportIdSet) {
        if self.exceeds(self.set.size() + other.size()) {
            let total = self.set.size().saturating_add(other.size());
            self.set = EntryIdSet::undefined_with_size(self.set.key(), total);
        } else {
            self.set.add_all(&other.set);
        }
    }

    /// Removes every ID of `other`.
    pub fn remove_all(&mut self, other: &ImportIdSet) {
        self.set.remove_all(&other.set);
    }

    /// Combines this set with the value already stored for the key.
    pub fn merge_into(&self, existing: EntryIdSet) -> ImportIdSet {
        let mut merged = ImportIdSet::from_entry_id_set(existing, self.index_entry_limit);
        merged.set.set_key(self.set.key());
        merged.merge(self);
        merged
    }

    pub fn as_entry_id_set(&self) -> &EntryIdSet {
        &self.set
    }

    pub fn into_entry_id_set(self) -> EntryIdSet {
        self.set
    }

    pub fn value_to_bytes(&self, codec: CodecVersion) -> Vec<u8> {
        codec.encode(&self.set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u64) -> EntryId {
        EntryId::new(v)
    }

    #[test]
    fn test_limit_is_exclusive() {
        let mut set = ImportIdSet::new(b"k".to_vec(), 2);
        set.add(id(1));
        set.add(id(2));
        assert!(set.is_defined());
        set.add(id(2));
        assert!(set.is_defined());
        set.add(id(3));
        assert!(!set.is_defined());
        assert_eq!(set.size(), 3);
    }

    #[test]
    fn test_merge_into_existing() {
        let mut incoming = ImportIdSet::new(b"k".to_vec(), 10);
        incoming.add(id(4));
        incoming.add(id(2));
        let existing = EntryIdSet::new_defined(b"k".to_vec(), [id(1), id(2)]);
        let merged = incoming.merge_into(existing);
        let ids: Vec<u64> = merged.as_entry_id_set().iter().map(|i| i.as_u64()).collect();
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[test]
    fn test_merge_over_limit_degrades() {
        let mut a = ImportIdSet::new(b"k".to_vec(), 3);
        a.add(id(1));
        a.add(id(2));
        let mut b = ImportIdSet::new(b"k".to_vec(), 3);
        b.add(id(3));
        b.add(id(4));
        a.merge(&b);
        assert!(!a.is_defined());
        assert_eq!(a.size(), 4);

        let mut undefined = ImportIdSet::from_entry_id_set(EntryIdSet::undefined(b"k".to_vec()), 3);
        undefined.merge(&b);
        assert!(!undefined.is_defined());
    }

    #[test]
    fn test_remove_all() {
        let mut a = ImportIdSet::new(b"k".to_vec(), 0);
        for v in 1..=5 {
            a.add(id(v));
        }
        let mut b = ImportIdSet::new(b"k".to_vec(), 0);
        b.add(id(2));
        b.add(id(5));
        a.remove_all(&b);
        assert_eq!(a.size(), 3);
        assert!(!a.contains(id(5)));
    }
}
