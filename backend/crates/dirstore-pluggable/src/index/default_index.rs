//! Key → entry ID set index tree with an entry limit and a trust state.
//!
//! ## Trust
//!
//! An index is *trusted* when its content is known to match the entries. An
//! untrusted index answers absent keys with an undefined set, so searches
//! fall back to scanning instead of returning wrong results. The flag is
//! persisted in the state tree; an untrusted index over an empty container is
//! promoted on open.
//!
//! ## Entry limit
//!
//! Once a key would reference `index_entry_limit` IDs or more, its value is
//! replaced by an undefined set and stops being maintained.

use super::import_id_set::ImportIdSet;
use super::IndexCursor;
use crate::codec::CodecVersion;
use crate::entry_id_set::EntryIdSet;
use crate::id2entry::Id2Entry;
use crate::state::{IndexFlags, State};
use dirstore_commons::TreeName;
use dirstore_store::{
    CursorTransformer, Importer, ReadableTransaction, Result, StorageError, Tree,
    WriteableTransaction,
};
use parking_lot::RwLock;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Whether an index's content can be relied upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustState {
    Trusted,
    Untrusted,
}

impl TrustState {
    fn from_flag(trusted: bool) -> Self {
        if trusted {
            TrustState::Trusted
        } else {
            TrustState::Untrusted
        }
    }
}

pub struct DefaultIndex {
    name: TreeName,
    state: State,
    id2entry: Id2Entry,
    compact_on_create: bool,
    codec: RwLock<CodecVersion>,
    trust: RwLock<TrustState>,
    index_entry_limit: AtomicUsize,
    entry_limit_exceeded: AtomicU64,
}

impl DefaultIndex {
    pub fn new(
        name: TreeName,
        state: State,
        id2entry: Id2Entry,
        index_entry_limit: usize,
        compact_on_create: bool,
    ) -> Self {
        Self {
            name,
            state,
            id2entry,
            compact_on_create,
            codec: RwLock::new(CodecVersion::V1),
            trust: RwLock::new(TrustState::Untrusted),
            index_entry_limit: AtomicUsize::new(index_entry_limit),
            entry_limit_exceeded: AtomicU64::new(0),
        }
    }

    pub fn codec(&self) -> CodecVersion {
        *self.codec.read()
    }

    pub fn is_trusted(&self) -> bool {
        *self.trust.read() == TrustState::Trusted
    }

    /// Persists the trust flag and switches the in-memory state.
    pub fn set_trusted(&self, txn: &mut dyn WriteableTransaction, trusted: bool) -> Result<()> {
        if trusted {
            self.state.add_flags_to_index(txn, &self.name, IndexFlags::TRUSTED)?;
        } else {
            self.state.remove_flags_from_index(txn, &self.name, IndexFlags::TRUSTED)?;
        }
        *self.trust.write() = TrustState::from_flag(trusted);
        Ok(())
    }

    pub fn index_entry_limit(&self) -> usize {
        self.index_entry_limit.load(Ordering::Relaxed)
    }

    /// Changes the limit. Returns `true` when the limit was raised, since
    /// keys that already overflowed stay undefined until a rebuild.
    pub fn set_index_entry_limit(&self, limit: usize) -> bool {
        let previous = self.index_entry_limit.swap(limit, Ordering::Relaxed);
        previous < limit
    }

    /// Number of keys that overflowed the limit since open.
    pub fn entry_limit_exceeded_count(&self) -> u64 {
        self.entry_limit_exceeded.load(Ordering::Relaxed)
    }

    /// Reads the set for `key`. Never fails: read and decode errors degrade
    /// to an undefined set.
    pub fn get<T>(&self, txn: &T, key: &[u8]) -> EntryIdSet
    where
        T: ReadableTransaction + ?Sized,
    {
        match txn.read(&self.name, key) {
            Ok(Some(bytes)) => match self.codec().decode(key, &bytes) {
                Ok(set) => set,
                Err(e) => {
                    log::warn!("Unable to decode key {:?} of index {}: {}", key, self.name, e);
                    EntryIdSet::undefined(key)
                }
            },
            Ok(None) if self.is_trusted() => EntryIdSet::empty(key),
            Ok(None) => EntryIdSet::undefined(key),
            Err(e) => {
                log::warn!("Unable to read key {:?} of index {}: {}", key, self.name, e);
                EntryIdSet::undefined(key)
            }
        }
    }

    /// Applies a delta to one key.
    ///
    /// - both `None`: the key is deleted
    /// - both empty or `None`: nothing happens
    /// - the key does not resolve to a defined set: nothing happens
    /// - otherwise read-modify-write of the stored value
    pub fn update(
        &self,
        txn: &mut dyn WriteableTransaction,
        key: &[u8],
        deleted: Option<&EntryIdSet>,
        added: Option<&EntryIdSet>,
    ) -> Result<()> {
        if deleted.is_none() && added.is_none() {
            if !txn.delete(&self.name, key)? {
                log::trace!("Key {:?} of index {} was already absent", key, self.name);
            }
            return Ok(());
        }
        if is_none_or_empty(deleted) && is_none_or_empty(added) {
            return Ok(());
        }
        // Overflowed keys are hot; skip taking a write lock on them.
        if !self.get(&*txn, key).is_defined() {
            return Ok(());
        }

        let codec = self.codec();
        let trusted = self.is_trusted();
        let limit = self.index_entry_limit();
        let corrupt = Cell::new(false);
        let exceeded = Cell::new(false);
        txn.update(&self.name, key, &mut |old| match old {
            Some(bytes) => {
                let current = codec.decode(key, bytes)?;
                let (new_set, overflowed) = compute_new_set(current, deleted, added, limit);
                exceeded.set(overflowed);
                if new_set.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(codec.encode(&new_set)))
                }
            }
            None if trusted => {
                if !is_none_or_empty(deleted) {
                    corrupt.set(true);
                }
                match added {
                    Some(ids) if !ids.is_empty() => Ok(Some(codec.encode(ids))),
                    _ => Ok(None),
                }
            }
            None => Ok(None),
        })?;

        if exceeded.get() {
            self.entry_limit_exceeded.fetch_add(1, Ordering::Relaxed);
            log::trace!(
                "Index entry limit {} exceeded for key {:?} of index {}",
                limit,
                key,
                self.name
            );
        }
        if corrupt.get() {
            log::error!(
                "Index {} is corrupt: key {:?} is missing but IDs {} were expected in it. \
                 The index is now untrusted and must be rebuilt",
                self.name,
                key,
                deleted.map(|d| d.to_string()).unwrap_or_default()
            );
            self.set_trusted(txn, false)?;
        }
        Ok(())
    }

    /// Merges `ids` into the stored value of its key.
    pub fn import_put(&self, importer: &dyn Importer, ids: &ImportIdSet) -> Result<()> {
        let key = ids.key();
        let codec = self.codec();
        let value = match importer.read(&self.name, key)? {
            Some(bytes) => ids
                .merge_into(codec.decode(key, &bytes)?)
                .value_to_bytes(codec),
            None => ids.value_to_bytes(codec),
        };
        importer.put(&self.name, key, &value)
    }

    /// Removes `ids` from the stored value of its key, which must exist.
    pub fn import_remove(&self, importer: &dyn Importer, ids: &ImportIdSet) -> Result<()> {
        let key = ids.key();
        let codec = self.codec();
        let bytes = importer.read(&self.name, key)?.ok_or_else(|| {
            StorageError::invariant(format!(
                "expected a value for key {:?} of index {}",
                key, self.name
            ))
        })?;
        let mut current =
            ImportIdSet::from_entry_id_set(codec.decode(key, &bytes)?, self.index_entry_limit());
        current.remove_all(ids);
        if current.is_defined() && current.size() == 0 {
            importer.delete(&self.name, key)?;
        } else {
            importer.put(&self.name, key, &current.value_to_bytes(codec))?;
        }
        Ok(())
    }

    pub fn open_cursor<'t, T>(&self, txn: &'t T) -> Result<IndexCursor<'t>>
    where
        T: ReadableTransaction + ?Sized,
    {
        let codec = self.codec();
        let raw = txn.open_cursor(&self.name)?;
        Ok(CursorTransformer::transform_values(
            raw,
            move |key: &Vec<u8>, value: &Vec<u8>| codec.decode(key, value),
        ))
    }
}

fn is_none_or_empty(set: Option<&EntryIdSet>) -> bool {
    set.map_or(true, EntryIdSet::is_empty)
}

/// Returns the new value and whether it just overflowed the limit.
fn compute_new_set(
    mut current: EntryIdSet,
    deleted: Option<&EntryIdSet>,
    added: Option<&EntryIdSet>,
    limit: usize,
) -> (EntryIdSet, bool) {
    match added {
        Some(added) if current.is_defined() && limit > 0 => {
            let delta = added.size() as i128 - deleted.map_or(0, |d| d.size() as i128);
            let new_size = current.size() as i128 + delta;
            if new_size >= limit as i128 {
                let size = new_size.max(0) as u64;
                return (EntryIdSet::undefined_with_size(current.key(), size), true);
            }
            current.add_all(added);
            if let Some(deleted) = deleted {
                current.remove_all(deleted);
            }
        }
        Some(added) => {
            current.add_all(added);
            if let Some(deleted) = deleted {
                current.remove_all(deleted);
            }
        }
        None => {
            if let Some(deleted) = deleted {
                current.remove_all(deleted);
            }
        }
    }
    (current, false)
}

impl Tree for DefaultIndex {
    fn name(&self) -> &TreeName {
        &self.name
    }

    fn after_open(&self, txn: &mut dyn WriteableTransaction, created: bool) -> Result<()> {
        if created && self.compact_on_create {
            self.state.add_flags_to_index(txn, &self.name, IndexFlags::COMPACTED)?;
        }
        let flags = self.state.get_index_flags(&*txn, &self.name)?;
        *self.codec.write() = if flags.contains(IndexFlags::COMPACTED) {
            CodecVersion::V2
        } else {
            CodecVersion::V1
        };
        *self.trust.write() = TrustState::from_flag(flags.contains(IndexFlags::TRUSTED));

        if !self.is_trusted() {
            let container_is_empty = match self.id2entry.get_highest_entry_id(&*txn) {
                Ok(id) => id.as_u64() == 0,
                Err(StorageError::TreeNotFound(_)) => true,
                Err(e) => return Err(e),
            };
            if container_is_empty {
                log::debug!("Index {} is untrusted over an empty container, trusting it", self.name);
                self.set_trusted(txn, true)?;
            }
        }
        Ok(())
    }

    fn delete(&self, txn: &mut dyn WriteableTransaction) -> Result<()> {
        txn.delete_tree(&self.name)?;
        self.state.delete_record(txn, &self.name)?;
        Ok(())
    }
}
