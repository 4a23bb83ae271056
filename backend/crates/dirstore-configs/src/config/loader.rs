use super::types::{BackendConfig, StorageEngine};
use crate::file_helpers::normalize_dir_path;
use std::fs;
use std::path::Path;

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const VALID_FORMATS: [&str; 3] = ["compact", "pretty", "json"];

impl BackendConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config: BackendConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.apply_env_overrides()?;
        config.finalize()?;

        Ok(config)
    }

    /// Parse configuration from TOML text and finalize it
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let mut config: BackendConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;

        config.finalize()?;

        Ok(config)
    }

    /// Apply `DIRSTORE_*` environment variable overrides.
    ///
    /// Supported variables:
    /// - DIRSTORE_DATA_DIR
    /// - DIRSTORE_STORAGE_ENGINE (`rocksdb` or `memory`)
    /// - DIRSTORE_BASE_DNS (`;`-separated)
    /// - DIRSTORE_LOG_LEVEL, DIRSTORE_LOG_FORMAT, DIRSTORE_LOG_TO_CONSOLE
    /// - DIRSTORE_IMPORT_THREADS
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DIRSTORE_DATA_DIR") {
            self.storage.data_path = path;
        }

        if let Some(engine) = lookup("DIRSTORE_STORAGE_ENGINE") {
            self.storage.engine = match engine.to_lowercase().as_str() {
                "rocksdb" => StorageEngine::Rocksdb,
                "memory" => StorageEngine::Memory,
                other => {
                    return Err(anyhow::anyhow!(
                        "Invalid DIRSTORE_STORAGE_ENGINE value: {}",
                        other
                    ))
                }
            };
        }

        // Base DNs contain commas, so the list is split on ';'
        if let Some(list) = lookup("DIRSTORE_BASE_DNS") {
            self.storage.base_dns = list
                .split(';')
                .map(str::trim)
                .filter(|dn| !dn.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(level) = lookup("DIRSTORE_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        if let Some(format) = lookup("DIRSTORE_LOG_FORMAT") {
            self.logging.format = format.to_lowercase();
        }

        if let Some(val) = lookup("DIRSTORE_LOG_TO_CONSOLE") {
            self.logging.log_to_console =
                val.eq_ignore_ascii_case("true") || val == "1" || val.eq_ignore_ascii_case("yes");
        }

        if let Some(threads) = lookup("DIRSTORE_IMPORT_THREADS") {
            self.import.thread_count = threads.parse().map_err(|_| {
                anyhow::anyhow!("Invalid DIRSTORE_IMPORT_THREADS value: {}", threads)
            })?;
        }

        Ok(())
    }

    fn normalize_paths(&mut self) {
        self.storage.data_path = normalize_dir_path(&self.storage.data_path);
        self.logging.logs_path = normalize_dir_path(&self.logging.logs_path);
        if let Some(dir) = self.import.temp_dir.as_mut() {
            *dir = normalize_dir_path(dir);
        }
    }

    /// Normalize local filesystem paths and validate configuration.
    pub fn finalize(&mut self) -> anyhow::Result<()> {
        self.normalize_paths();

        self.validate()?;

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.base_dns.is_empty() {
            return Err(anyhow::anyhow!("storage.base_dns cannot be empty"));
        }

        let base_dns = self
            .storage
            .parsed_base_dns()
            .map_err(|e| anyhow::anyhow!("Invalid base DN: {}", e))?;
        if let Some(root) = base_dns.iter().find(|dn| dn.is_root()) {
            return Err(anyhow::anyhow!("Base DN '{}' cannot be the root DN", root));
        }

        if self.import.thread_count == 0 {
            return Err(anyhow::anyhow!("import.thread_count cannot be 0"));
        }

        if self.import.chunk_records == 0 {
            return Err(anyhow::anyhow!("import.chunk_records cannot be 0"));
        }

        for index in &self.index.attribute_indexes {
            if index.attribute.trim().is_empty() {
                return Err(anyhow::anyhow!("Attribute index with empty attribute name"));
            }
            if index.types.is_empty() {
                return Err(anyhow::anyhow!(
                    "Attribute index '{}' must declare at least one type",
                    index.attribute
                ));
            }
        }

        for vlv in &self.index.vlv_indexes {
            if vlv.sort_attributes.is_empty() {
                return Err(anyhow::anyhow!(
                    "VLV index '{}' must declare at least one sort attribute",
                    vlv.name
                ));
            }
        }

        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ));
        }

        if !VALID_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                VALID_FORMATS.join(", ")
            ));
        }

        for (target, level) in &self.logging.targets {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    VALID_LEVELS.join(", ")
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::IndexType;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_is_valid() {
        let config = BackendConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.index.index_entry_limit, 4000);
        assert!(config.index.compact_encoding);
    }

    #[test]
    fn test_parse_full_config() {
        let config = BackendConfig::from_toml_str(
            r#"
            [storage]
            engine = "memory"
            base_dns = ["dc=example,dc=com", "o=test"]

            [index]
            index_entry_limit = 10

            [[index.attribute_indexes]]
            attribute = "cn"
            types = ["equality", "presence"]

            [[index.vlv_indexes]]
            name = "by-sn"
            sort_attributes = ["sn"]

            [import]
            thread_count = 2

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.engine, StorageEngine::Memory);
        assert_eq!(config.storage.base_dns.len(), 2);
        assert_eq!(config.index.index_entry_limit, 10);
        assert_eq!(
            config.index.attribute_indexes[0].types,
            vec![IndexType::Equality, IndexType::Presence]
        );
        assert_eq!(config.import.thread_count, 2);
        assert!(std::path::Path::new(&config.storage.data_path).is_absolute());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = BackendConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_base_dns_rejected() {
        let mut config = BackendConfig::default();
        config.storage.base_dns.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unparsable_base_dn_rejected() {
        let mut config = BackendConfig::default();
        config.storage.base_dns = vec!["not a dn".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_engine_rejected() {
        let result = BackendConfig::from_toml_str("[storage]\nengine = \"sled\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_threads_rejected() {
        let mut config = BackendConfig::default();
        config.import.thread_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dirstore.toml");
        fs::write(&path, "[storage]\nbase_dns = [\"o=file\"]\n").unwrap();
        let config = BackendConfig::from_file(&path).unwrap();
        assert_eq!(config.storage.base_dns, vec!["o=file".to_string()]);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DIRSTORE_DATA_DIR", "/srv/dirstore"),
            ("DIRSTORE_STORAGE_ENGINE", "memory"),
            ("DIRSTORE_BASE_DNS", "dc=example,dc=com; o=other"),
            ("DIRSTORE_LOG_LEVEL", "DEBUG"),
            ("DIRSTORE_LOG_TO_CONSOLE", "no"),
            ("DIRSTORE_IMPORT_THREADS", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = BackendConfig::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();
        config.finalize().unwrap();

        assert_eq!(config.storage.data_path, "/srv/dirstore");
        assert_eq!(config.storage.engine, StorageEngine::Memory);
        assert_eq!(
            config.storage.base_dns,
            vec!["dc=example,dc=com".to_string(), "o=other".to_string()]
        );
        assert_eq!(config.logging.level, "debug");
        assert!(!config.logging.log_to_console);
        assert_eq!(config.import.thread_count, 3);
    }

    #[test]
    fn test_bad_env_override_rejected() {
        let mut config = BackendConfig::default();
        assert!(config
            .apply_overrides(|key| (key == "DIRSTORE_IMPORT_THREADS").then(|| "many".to_string()))
            .is_err());
        assert!(config
            .apply_overrides(|key| (key == "DIRSTORE_STORAGE_ENGINE").then(|| "sled".to_string()))
            .is_err());
    }
}
