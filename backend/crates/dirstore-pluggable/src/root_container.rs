//! The set of entry containers sharing one storage and one entry ID space.

use crate::entry_container::EntryContainer;
use crate::error::{DirectoryError, Result};
use dirstore_commons::{Dn, EntryId};
use dirstore_configs::IndexSettings;
use dirstore_store::Storage;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global entry ID counter. IDs are never reused.
#[derive(Debug)]
pub struct EntryIdSequence {
    next: AtomicU64,
}

impl EntryIdSequence {
    /// A sequence whose first ID is `highest + 1`.
    pub fn after(highest: EntryId) -> Self {
        Self {
            next: AtomicU64::new(highest.as_u64() + 1),
        }
    }

    pub fn next_entry_id(&self) -> EntryId {
        EntryId::new(self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Moves the counter past `highest` if it is behind.
    pub fn ensure_after(&self, highest: EntryId) {
        self.next.fetch_max(highest.as_u64() + 1, Ordering::SeqCst);
    }

    /// The ID the next call to [`EntryIdSequence::next_entry_id`] returns.
    pub fn peek(&self) -> EntryId {
        EntryId::new(self.next.load(Ordering::SeqCst))
    }
}

impl Default for EntryIdSequence {
    fn default() -> Self {
        Self::after(EntryId::new(0))
    }
}

pub struct RootContainer {
    storage: Arc<dyn Storage>,
    containers: BTreeMap<Dn, Arc<EntryContainer>>,
    ids: Arc<EntryIdSequence>,
}

impl RootContainer {
    /// Opens (creating where needed) one entry container per base DN and
    /// resumes the entry ID counter after the highest stored ID.
    pub fn open(storage: Arc<dyn Storage>, base_dns: &[Dn], settings: &IndexSettings) -> Result<Self> {
        if base_dns.is_empty() {
            return Err(DirectoryError::unwilling_to_perform("No base DN configured"));
        }
        let ids = Arc::new(EntryIdSequence::default());
        let containers: BTreeMap<Dn, Arc<EntryContainer>> = base_dns
            .iter()
            .map(|base_dn| {
                let container =
                    EntryContainer::new(base_dn.clone(), Arc::clone(&storage), Arc::clone(&ids), settings);
                (base_dn.clone(), Arc::new(container))
            })
            .collect();

        let mut txn = storage.begin_write()?;
        for container in containers.values() {
            container.open(txn.as_mut())?;
            ids.ensure_after(container.get_highest_entry_id(&*txn)?);
        }
        txn.commit()?;

        log::info!(
            "Opened {} base DN(s); next entry ID is {}",
            containers.len(),
            ids.peek()
        );
        Ok(Self {
            storage,
            containers,
            ids,
        })
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn next_entry_id(&self) -> EntryId {
        self.ids.next_entry_id()
    }

    pub fn base_dns(&self) -> impl Iterator<Item = &Dn> {
        self.containers.keys()
    }

    pub fn entry_containers(&self) -> impl Iterator<Item = &Arc<EntryContainer>> {
        self.containers.values()
    }

    /// Container holding `dn`: the one with the closest base DN at or above it.
    pub fn get_entry_container(&self, dn: &Dn) -> Option<Arc<EntryContainer>> {
        dn.self_and_ancestors()
            .find_map(|candidate| self.containers.get(&candidate).cloned())
    }

    pub fn entry_count(&self) -> Result<u64> {
        self.containers
            .values()
            .map(|container| container.entry_count())
            .sum()
    }

    pub fn close(&self) -> Result<()> {
        log::debug!("Closing root container ({} base DNs)", self.containers.len());
        Ok(self.storage.close()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstore_commons::Entry;
    use dirstore_store::InMemoryStorage;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    #[test]
    fn test_sequence() {
        let ids = EntryIdSequence::default();
        assert_eq!(ids.next_entry_id(), EntryId::new(1));
        ids.ensure_after(EntryId::new(10));
        assert_eq!(ids.next_entry_id(), EntryId::new(11));
        ids.ensure_after(EntryId::new(3));
        assert_eq!(ids.peek(), EntryId::new(12));
    }

    #[test]
    fn test_counter_resumes_after_highest_id() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let bases = [dn("dc=a"), dn("dc=b")];
        let settings = IndexSettings::default();
        {
            let root = RootContainer::open(Arc::clone(&storage), &bases, &settings).unwrap();
            let b = root.get_entry_container(&dn("dc=b")).unwrap();
            b.add_entry(&Entry::new(dn("dc=b"))).unwrap();
            b.add_entry(&Entry::new(dn("ou=x,dc=b"))).unwrap();
            root.close().unwrap();
        }

        let root = RootContainer::open(storage, &bases, &settings).unwrap();
        assert_eq!(root.next_entry_id(), EntryId::new(3));
        assert_eq!(root.entry_count().unwrap(), 2);
    }

    #[test]
    fn test_container_lookup_prefers_closest_base() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let bases = [dn("dc=com"), dn("dc=example,dc=com")];
        let root = RootContainer::open(storage, &bases, &IndexSettings::default()).unwrap();

        let owner = root.get_entry_container(&dn("cn=x,dc=example,dc=com")).unwrap();
        assert_eq!(owner.base_dn(), &dn("dc=example,dc=com"));
        let owner = root.get_entry_container(&dn("dc=other,dc=com")).unwrap();
        assert_eq!(owner.base_dn(), &dn("dc=com"));
        assert!(root.get_entry_container(&dn("dc=org")).is_none());
    }
}
