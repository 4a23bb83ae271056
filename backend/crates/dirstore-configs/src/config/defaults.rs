use num_cpus;

// Default value functions
pub fn default_true() -> bool {
    true
}

pub fn default_data_path() -> String {
    "./data".to_string() // Normalized to absolute at load time
}

pub fn default_base_dns() -> Vec<String> {
    vec!["dc=example,dc=com".to_string()]
}

pub fn default_index_entry_limit() -> usize {
    4000
}

pub fn default_index_types() -> Vec<super::types::IndexType> {
    vec![super::types::IndexType::Equality]
}

pub fn default_import_thread_count() -> usize {
    num_cpus::get().max(1)
}

pub fn default_import_chunk_records() -> usize {
    100_000
}

pub fn default_import_progress_interval_secs() -> u64 {
    10
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_log_format() -> String {
    "compact".to_string()
}

pub fn default_logs_path() -> String {
    "./logs".to_string()
}

pub fn default_rocksdb_write_buffer_size() -> usize {
    4 * 1024 * 1024 // 4MB per tree; dirstore keeps a handful of trees per suffix
}

pub fn default_rocksdb_max_write_buffers() -> i32 {
    2
}

pub fn default_rocksdb_block_cache_size() -> usize {
    32 * 1024 * 1024 // Shared across all column families
}

pub fn default_rocksdb_max_background_jobs() -> i32 {
    4
}

pub fn default_rocksdb_max_open_files() -> i32 {
    512
}
