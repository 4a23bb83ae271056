use super::defaults::*;
use dirstore_commons::{CommonError, Dn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Main backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub index: IndexSettings,
    #[serde(default)]
    pub import: ImportSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Which ordered store backs the trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    #[default]
    Rocksdb,
    Memory,
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub engine: StorageEngine,
    /// Base data directory. RocksDB files live under `{data_path}/rocksdb`.
    #[serde(default = "default_data_path")]
    pub data_path: String,
    /// One entry container is opened per base DN
    #[serde(default = "default_base_dns")]
    pub base_dns: Vec<String>,
    #[serde(default)]
    pub rocksdb: RocksDbSettings,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            engine: StorageEngine::default(),
            data_path: default_data_path(),
            base_dns: default_base_dns(),
            rocksdb: RocksDbSettings::default(),
        }
    }
}

impl StorageSettings {
    /// Get RocksDB directory path (data_path/rocksdb)
    pub fn rocksdb_dir(&self) -> std::path::PathBuf {
        let base = crate::file_helpers::normalize_dir_path(&self.data_path);
        crate::file_helpers::join_path(base, "rocksdb")
    }

    /// Parse every configured base DN.
    pub fn parsed_base_dns(&self) -> Result<Vec<Dn>, CommonError> {
        self.base_dns.iter().map(|dn| Dn::parse(dn)).collect()
    }
}

/// RocksDB-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbSettings {
    /// Write buffer size per column family in bytes
    #[serde(default = "default_rocksdb_write_buffer_size")]
    pub write_buffer_size: usize,

    #[serde(default = "default_rocksdb_max_write_buffers")]
    pub max_write_buffers: i32,

    /// Block cache size in bytes, shared across all column families
    #[serde(default = "default_rocksdb_block_cache_size")]
    pub block_cache_size: usize,

    #[serde(default = "default_rocksdb_max_background_jobs")]
    pub max_background_jobs: i32,

    /// Set to -1 for unlimited
    #[serde(default = "default_rocksdb_max_open_files")]
    pub max_open_files: i32,

    /// Fsync the WAL on every commit
    #[serde(default)]
    pub sync_writes: bool,
}

impl Default for RocksDbSettings {
    fn default() -> Self {
        Self {
            write_buffer_size: default_rocksdb_write_buffer_size(),
            max_write_buffers: default_rocksdb_max_write_buffers(),
            block_cache_size: default_rocksdb_block_cache_size(),
            max_background_jobs: default_rocksdb_max_background_jobs(),
            max_open_files: default_rocksdb_max_open_files(),
            sync_writes: false,
        }
    }
}

/// Kind of attribute index maintained for an attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexType {
    Equality,
    Presence,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::Equality => "equality",
            IndexType::Presence => "presence",
        }
    }
}

/// One attribute index definition
///
/// ```toml
/// [[index.attribute_indexes]]
/// attribute = "cn"
/// types = ["equality", "presence"]
/// entry_limit = 10000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeIndexSettings {
    pub attribute: String,
    #[serde(default = "default_index_types")]
    pub types: Vec<IndexType>,
    /// Overrides `index.index_entry_limit` for this attribute
    #[serde(default)]
    pub entry_limit: Option<usize>,
}

/// One VLV (sorted) index definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VlvIndexSettings {
    pub name: String,
    /// Attributes to sort on, most significant first
    pub sort_attributes: Vec<String>,
}

/// Index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Maximum number of entry IDs kept per key before the value degrades to undefined
    #[serde(default = "default_index_entry_limit")]
    pub index_entry_limit: usize,
    /// Use the compacted (varint delta) encoding for newly created indexes and
    /// store entries with tokenized attribute names and object classes
    #[serde(default = "default_true")]
    pub compact_encoding: bool,
    /// Maintain id2children / id2subtree
    #[serde(default = "default_true")]
    pub maintain_count_indexes: bool,
    #[serde(default)]
    pub attribute_indexes: Vec<AttributeIndexSettings>,
    #[serde(default)]
    pub vlv_indexes: Vec<VlvIndexSettings>,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            index_entry_limit: default_index_entry_limit(),
            compact_encoding: true,
            maintain_count_indexes: true,
            attribute_indexes: Vec::new(),
            vlv_indexes: Vec::new(),
        }
    }
}

/// LDIF import settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportSettings {
    /// Worker threads used by the merge importer
    #[serde(default = "default_import_thread_count")]
    pub thread_count: usize,
    /// Index records buffered per worker before a sorted chunk is spilled to disk
    #[serde(default = "default_import_chunk_records")]
    pub chunk_records: usize,
    #[serde(default = "default_import_progress_interval_secs")]
    pub progress_interval_secs: u64,
    /// Directory for sort chunks (default: system temp dir)
    #[serde(default)]
    pub temp_dir: Option<String>,
    #[serde(default)]
    pub skip_schema_validation: bool,
    /// Replace entries that already exist instead of rejecting them (append mode)
    #[serde(default)]
    pub replace_existing: bool,
    #[serde(default)]
    pub reject_file: Option<String>,
    #[serde(default)]
    pub skip_file: Option<String>,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            thread_count: default_import_thread_count(),
            chunk_records: default_import_chunk_records(),
            progress_interval_secs: default_import_progress_interval_secs(),
            temp_dir: None,
            skip_schema_validation: false,
            replace_existing: false,
            reject_file: None,
            skip_file: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Directory for log files (default: "./logs")
    #[serde(default = "default_logs_path")]
    pub logs_path: String,
    #[serde(default = "default_true")]
    pub log_to_console: bool,
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Optional per-target log level overrides
    /// ```toml
    /// [logging.targets]
    /// dirstore_pluggable = "debug"
    /// ```
    #[serde(default)]
    pub targets: HashMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            logs_path: default_logs_path(),
            log_to_console: true,
            format: default_log_format(),
            targets: HashMap::new(),
        }
    }
}
