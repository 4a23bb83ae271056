//! RocksDB initialization utilities for dirstore.
//!
//! Opens a `TransactionDB` with every column family already present on disk,
//! so each previously created tree is immediately reachable.

use crate::rocksdb_impl::RocksDbStorage;
use anyhow::Result;
use dirstore_configs::RocksDbSettings;
use rocksdb::{
    BlockBasedOptions, Cache, ColumnFamilyDescriptor, MultiThreaded, Options, TransactionDB,
    TransactionDBOptions, DB,
};
use std::path::Path;

/// RocksDB initializer for creating/opening a dirstore database.
pub struct RocksDbInit {
    db_path: String,
    settings: RocksDbSettings,
}

impl RocksDbInit {
    /// Create a new initializer for the given path with custom settings.
    pub fn new(db_path: impl Into<String>, settings: RocksDbSettings) -> Self {
        Self {
            db_path: db_path.into(),
            settings,
        }
    }

    /// Create a new initializer with default settings.
    pub fn with_defaults(db_path: impl Into<String>) -> Self {
        Self::new(db_path, RocksDbSettings::default())
    }

    /// Open or create the database.
    pub fn open(&self) -> Result<RocksDbStorage> {
        let path = Path::new(&self.db_path);
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(self.settings.max_background_jobs);
        db_opts.increase_parallelism(self.settings.max_background_jobs);
        db_opts.set_max_open_files(self.settings.max_open_files);

        // Block cache is shared by every column family
        let cache = Cache::new_lru_cache(self.settings.block_cache_size);
        db_opts.set_block_based_table_factory(&create_block_options_with_cache(&cache));

        let mut cf_opts = Options::default();
        apply_cf_settings(&mut cf_opts, &self.settings);
        cf_opts.set_block_based_table_factory(&create_block_options_with_cache(&cache));

        let existing = match DB::list_cf(&db_opts, path) {
            Ok(cfs) if !cfs.is_empty() => cfs,
            _ => vec!["default".to_string()],
        };

        let cf_descriptors: Vec<_> = existing
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, cf_opts.clone()))
            .collect();

        let db: TransactionDB<MultiThreaded> = TransactionDB::open_cf_descriptors(
            &db_opts,
            &TransactionDBOptions::default(),
            path,
            cf_descriptors,
        )?;

        log::debug!(
            "Opened RocksDB at {} with {} column families",
            self.db_path,
            existing.len()
        );

        Ok(RocksDbStorage::new(
            db,
            &existing,
            cf_opts,
            self.settings.sync_writes,
        ))
    }
}

fn apply_cf_settings(cf_opts: &mut Options, settings: &RocksDbSettings) {
    cf_opts.set_write_buffer_size(settings.write_buffer_size);
    cf_opts.set_max_write_buffer_number(settings.max_write_buffers);
}

pub(crate) fn create_block_options_with_cache(cache: &Cache) -> BlockBasedOptions {
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_block_cache(cache);
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);
    block_opts.set_pin_l0_filter_and_index_blocks_in_cache(true);
    block_opts
}
