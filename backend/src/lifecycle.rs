//! Opening the configured backend.
//!
//! Commands call [`open_root_container`] and work against the returned
//! [`RootContainer`]; the storage engine behind it is chosen by
//! `storage.engine`.

use anyhow::{Context, Result};
use dirstore_configs::{BackendConfig, StorageEngine};
use dirstore_pluggable::RootContainer;
use dirstore_store::{InMemoryStorage, RocksDbInit, Storage};
use log::info;
use std::sync::Arc;
use std::time::Instant;

/// Open the storage engine named by the configuration.
pub fn open_storage(config: &BackendConfig) -> Result<Arc<dyn Storage>> {
    let phase_start = Instant::now();
    match config.storage.engine {
        StorageEngine::Rocksdb => {
            let db_path = config.storage.rocksdb_dir();
            let db_init = RocksDbInit::new(
                db_path.to_string_lossy().into_owned(),
                config.storage.rocksdb.clone(),
            );
            let storage = db_init
                .open()
                .with_context(|| format!("Failed to open RocksDB at {}", db_path.display()))?;
            info!(
                "RocksDB initialized at {} ({:.2}ms)",
                db_path.display(),
                phase_start.elapsed().as_secs_f64() * 1000.0
            );
            if !config.storage.rocksdb.sync_writes {
                log::debug!("RocksDB sync_writes disabled; commits are not fsynced");
            }
            Ok(Arc::new(storage))
        }
        StorageEngine::Memory => {
            log::warn!("Using the in-memory storage engine; nothing survives this process");
            Ok(Arc::new(InMemoryStorage::new()))
        }
    }
}

/// Open the storage and one entry container per configured base DN.
pub fn open_root_container(config: &BackendConfig) -> Result<Arc<RootContainer>> {
    let storage = open_storage(config)?;
    open_root_container_on(storage, config)
}

/// Open the entry containers on an already opened storage.
pub fn open_root_container_on(
    storage: Arc<dyn Storage>,
    config: &BackendConfig,
) -> Result<Arc<RootContainer>> {
    let phase_start = Instant::now();
    let base_dns = config
        .storage
        .parsed_base_dns()
        .map_err(|e| anyhow::anyhow!("Invalid base DN: {}", e))?;

    let root = RootContainer::open(storage, &base_dns, &config.index)
        .context("Failed to open the entry containers")?;
    info!(
        "Entry containers ready for {} ({:.2}ms)",
        config.storage.base_dns.join(", "),
        phase_start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(Arc::new(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstore_commons::{Dn, Entry};

    fn memory_config() -> BackendConfig {
        let mut config = BackendConfig::default();
        config.storage.engine = StorageEngine::Memory;
        config.storage.base_dns = vec!["dc=example,dc=com".to_string()];
        config
    }

    #[test]
    fn test_open_memory_backend() {
        let root = open_root_container(&memory_config()).unwrap();
        let bases: Vec<String> = root.base_dns().map(|dn| dn.to_string()).collect();
        assert_eq!(bases, vec!["dc=example,dc=com".to_string()]);
        assert_eq!(root.entry_count().unwrap(), 0);
    }

    #[test]
    fn test_rocksdb_backend_resumes_entry_ids() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = memory_config();
        config.storage.engine = StorageEngine::Rocksdb;
        config.storage.data_path = dir.path().to_string_lossy().into_owned();

        {
            let root = open_root_container(&config).unwrap();
            let container = root
                .get_entry_container(&Dn::parse("dc=example,dc=com").unwrap())
                .unwrap();
            let mut entry = Entry::new(Dn::parse("dc=example,dc=com").unwrap());
            entry.add_attribute_value("objectClass", "domain");
            container.add_entry(&entry).unwrap();
            root.close().unwrap();
        }

        let root = open_root_container(&config).unwrap();
        assert_eq!(root.entry_count().unwrap(), 1);
        assert_eq!(root.next_entry_id().as_u64(), 2);
    }
}
