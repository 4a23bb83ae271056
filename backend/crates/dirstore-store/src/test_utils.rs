//! Test utilities for dirstore-store.
//!
//! Provides helpers for setting up test storages with minimal boilerplate.

use crate::rocksdb_impl::RocksDbStorage;
use crate::rocksdb_init::RocksDbInit;
use crate::storage_trait::StorageExt;
use anyhow::Result;
use dirstore_commons::TreeName;
use tempfile::TempDir;

/// RocksDB storage in a temporary directory that is removed on drop.
pub struct TestDb {
    pub storage: RocksDbStorage,
    /// Temporary directory (kept alive for the duration of the test)
    #[allow(dead_code)]
    temp_dir: TempDir,
}

impl TestDb {
    /// Create an empty test database.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use dirstore_store::test_utils::TestDb;
    ///
    /// let test_db = TestDb::new().unwrap();
    /// // Use test_db.storage for testing...
    /// ```
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let path = temp_dir.path().join("rocksdb");
        let storage = RocksDbInit::with_defaults(path.to_string_lossy()).open()?;
        Ok(Self { storage, temp_dir })
    }

    /// Create a test database with the given trees already created.
    pub fn with_trees(trees: &[TreeName]) -> Result<Self> {
        let db = Self::new()?;
        db.storage.write(|txn| {
            for tree in trees {
                txn.open_tree(tree, true)?;
            }
            Ok(())
        })?;
        Ok(db)
    }

    /// Directory holding the database files.
    pub fn path(&self) -> &std::path::Path {
        self.temp_dir.path()
    }
}

/// Tree name under the `o=test` base, for tests.
pub fn test_tree(index_id: &str) -> TreeName {
    TreeName::new("o=test", index_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_trait::Storage;

    #[test]
    fn test_create_test_db() {
        let test_db = TestDb::with_trees(&[test_tree("dn2id")]).unwrap();
        assert_eq!(test_db.storage.list_trees().unwrap(), vec![test_tree("dn2id")]);
    }
}
