//! Base behaviour shared by every named tree.

use crate::cursor::SequentialCursor;
use crate::storage_trait::{ReadableTransaction, Result, WriteableTransaction};
use dirstore_commons::TreeName;

/// A named tree with an open/delete/count lifecycle.
///
/// Implementors override [`Tree::after_open`] to load their own state once
/// the tree is open.
pub trait Tree {
    fn name(&self) -> &TreeName;

    /// Opens the tree, creating it if `create_on_demand` is set, then runs
    /// [`Tree::after_open`].
    fn open(&self, txn: &mut dyn WriteableTransaction, create_on_demand: bool) -> Result<()> {
        let created = txn.open_tree(self.name(), create_on_demand)?;
        self.after_open(txn, created)
    }

    /// Hook run after a successful open. `created` is true when the tree did
    /// not exist before.
    fn after_open(&self, _txn: &mut dyn WriteableTransaction, _created: bool) -> Result<()> {
        Ok(())
    }

    /// Removes the tree and everything in it.
    fn delete(&self, txn: &mut dyn WriteableTransaction) -> Result<()> {
        txn.delete_tree(self.name())
    }

    /// Number of records. Falls back to a full scan on engines without a
    /// fast count.
    fn record_count<T>(&self, txn: &T) -> Result<u64>
    where
        T: ReadableTransaction + ?Sized,
        Self: Sized,
    {
        count_records(txn, self.name())
    }
}

/// Counts the records of `tree`, scanning it when the engine cannot answer
/// directly. The scan is O(n).
pub fn count_records<T>(txn: &T, tree: &TreeName) -> Result<u64>
where
    T: ReadableTransaction + ?Sized,
{
    if let Some(count) = txn.record_count(tree)? {
        return Ok(count);
    }

    log::trace!("Counting records of {} with a cursor scan", tree);
    let mut cursor = txn.open_cursor(tree)?;
    let mut count = 0;
    while cursor.next()? {
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_impl::InMemoryStorage;
    use crate::storage_trait::StorageExt;
    use std::cell::Cell;

    struct Recorded {
        name: TreeName,
        opened: Cell<Option<bool>>,
    }

    impl Tree for Recorded {
        fn name(&self) -> &TreeName {
            &self.name
        }

        fn after_open(&self, _txn: &mut dyn WriteableTransaction, created: bool) -> Result<()> {
            self.opened.set(Some(created));
            Ok(())
        }
    }

    fn fill(storage: &InMemoryStorage, recorded: &Recorded) {
        storage
            .write(|txn| {
                recorded.open(txn, true)?;
                for i in 0u8..5 {
                    txn.put(recorded.name(), &[i], b"")?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_open_hook_sees_creation() {
        let storage = InMemoryStorage::new();
        let recorded = Recorded {
            name: TreeName::new("o=test", "recorded"),
            opened: Cell::new(None),
        };
        fill(&storage, &recorded);
        assert_eq!(recorded.opened.get(), Some(true));

        storage.write(|txn| recorded.open(txn, false)).unwrap();
        assert_eq!(recorded.opened.get(), Some(false));
    }

    #[test]
    fn test_count_fast_and_slow_paths_agree() {
        for storage in [InMemoryStorage::new(), InMemoryStorage::without_fast_count()] {
            let recorded = Recorded {
                name: TreeName::new("o=test", "recorded"),
                opened: Cell::new(None),
            };
            fill(&storage, &recorded);
            let txn = storage.begin_read().unwrap();
            assert_eq!(recorded.record_count(txn.as_ref()).unwrap(), 5);
        }
    }

    #[test]
    fn test_delete() {
        let storage = InMemoryStorage::new();
        let recorded = Recorded {
            name: TreeName::new("o=test", "recorded"),
            opened: Cell::new(None),
        };
        fill(&storage, &recorded);
        storage.write(|txn| recorded.delete(txn)).unwrap();
        assert!(storage.list_trees().unwrap().is_empty());
    }
}
