//! Import options and extension hooks.

use dirstore_commons::{Dn, Entry};
use dirstore_configs::ImportSettings;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

/// Transforms or vetoes entries before they are stored.
pub trait ImportPlugin: Send + Sync {
    fn name(&self) -> &str;

    /// `Err(reason)` rejects the entry.
    fn process(&self, entry: &mut Entry) -> Result<(), String>;
}

/// Checks an entry against the schema. `Err(reason)` rejects the entry.
pub trait SchemaValidator: Send + Sync {
    fn validate(&self, entry: &Entry) -> Result<(), String>;
}

/// Requires at least one `objectClass` value.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectClassValidator;

impl SchemaValidator for ObjectClassValidator {
    fn validate(&self, entry: &Entry) -> Result<(), String> {
        if entry.object_classes().is_empty() {
            Err(format!("Entry {} has no objectClass attribute", entry.dn()))
        } else {
            Ok(())
        }
    }
}

pub type SinkWriter = Box<dyn Write + Send>;

pub struct ImportConfig {
    /// Add to existing content one entry at a time instead of rebuilding.
    pub append: bool,
    pub clear_backend: bool,
    /// Replace entries that already exist instead of rejecting them.
    pub replace_existing: bool,
    pub include_branches: Vec<Dn>,
    pub exclude_branches: Vec<Dn>,
    pub skip_schema_validation: bool,
    pub thread_count: usize,
    /// Index records a worker buffers before spilling a sorted chunk.
    pub chunk_records: usize,
    pub progress_interval: Duration,
    pub temp_dir: Option<PathBuf>,
    pub reject_writer: Option<SinkWriter>,
    pub skip_writer: Option<SinkWriter>,
    pub cancel: Arc<AtomicBool>,
    pub plugins: Vec<Arc<dyn ImportPlugin>>,
    pub schema_validator: Option<Arc<dyn SchemaValidator>>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self::from_settings_without_sinks(&ImportSettings::default())
    }
}

impl ImportConfig {
    fn from_settings_without_sinks(settings: &ImportSettings) -> Self {
        Self {
            append: false,
            clear_backend: false,
            replace_existing: settings.replace_existing,
            include_branches: Vec::new(),
            exclude_branches: Vec::new(),
            skip_schema_validation: settings.skip_schema_validation,
            thread_count: settings.thread_count.max(1),
            chunk_records: settings.chunk_records.max(1),
            progress_interval: Duration::from_secs(settings.progress_interval_secs.max(1)),
            temp_dir: settings.temp_dir.as_ref().map(PathBuf::from),
            reject_writer: None,
            skip_writer: None,
            cancel: Arc::new(AtomicBool::new(false)),
            plugins: Vec::new(),
            schema_validator: Some(Arc::new(ObjectClassValidator)),
        }
    }

    /// Builds a config from `[import]` settings, creating the reject and
    /// skip files they name.
    pub fn from_settings(settings: &ImportSettings) -> io::Result<Self> {
        let mut config = Self::from_settings_without_sinks(settings);
        config.reject_writer = open_sink(settings.reject_file.as_deref())?;
        config.skip_writer = open_sink(settings.skip_file.as_deref())?;
        Ok(config)
    }

    /// Plugins and schema validation applied to every entry.
    pub fn entry_processor(&self) -> EntryProcessor {
        EntryProcessor {
            plugins: self.plugins.clone(),
            schema_validator: if self.skip_schema_validation {
                None
            } else {
                self.schema_validator.clone()
            },
        }
    }

    /// True if `dn` passes the include/exclude branch filter.
    pub fn includes(&self, dn: &Dn) -> bool {
        branch_filter(&self.include_branches, &self.exclude_branches, dn)
    }
}

pub(crate) fn branch_filter(include: &[Dn], exclude: &[Dn], dn: &Dn) -> bool {
    let included = include.is_empty() || include.iter().any(|b| b.is_superior_or_equal_to(dn));
    included && !exclude.iter().any(|b| b.is_superior_or_equal_to(dn))
}

fn open_sink(path: Option<&str>) -> io::Result<Option<SinkWriter>> {
    match path {
        Some(path) => {
            let file = File::create(path)?;
            Ok(Some(Box::new(BufWriter::new(file))))
        }
        None => Ok(None),
    }
}

#[derive(Clone, Default)]
pub struct EntryProcessor {
    plugins: Vec<Arc<dyn ImportPlugin>>,
    schema_validator: Option<Arc<dyn SchemaValidator>>,
}

impl EntryProcessor {
    /// Runs the plugins in order, then schema validation.
    pub fn process(&self, entry: &mut Entry) -> Result<(), String> {
        for plugin in &self.plugins {
            plugin
                .process(entry)
                .map_err(|reason| format!("Rejected by import plugin {}: {}", plugin.name(), reason))?;
        }
        if let Some(validator) = &self.schema_validator {
            validator.validate(entry)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;

    impl ImportPlugin for Uppercase {
        fn name(&self) -> &str {
            "uppercase"
        }

        fn process(&self, entry: &mut Entry) -> Result<(), String> {
            let values = entry.remove_attribute("sn").unwrap_or_default();
            if values.iter().any(|v| v == "forbidden") {
                return Err("forbidden surname".to_string());
            }
            for value in values {
                entry.add_attribute_value("sn", value.to_uppercase());
            }
            Ok(())
        }
    }

    fn entry(sn: &str, with_class: bool) -> Entry {
        let mut entry = Entry::new(Dn::parse("cn=a,o=test").unwrap());
        entry.add_attribute_value("sn", sn);
        if with_class {
            entry.add_attribute_value("objectClass", "person");
        }
        entry
    }

    #[test]
    fn test_processor_runs_plugins_then_schema() {
        let mut config = ImportConfig::default();
        config.plugins.push(Arc::new(Uppercase));
        let processor = config.entry_processor();

        let mut ok = entry("doe", true);
        processor.process(&mut ok).unwrap();
        assert_eq!(ok.attribute("sn").unwrap(), &["DOE".to_string()]);

        let err = processor.process(&mut entry("forbidden", true)).unwrap_err();
        assert!(err.contains("uppercase"));
        assert!(processor.process(&mut entry("doe", false)).is_err());

        config.skip_schema_validation = true;
        assert!(config.entry_processor().process(&mut entry("doe", false)).is_ok());
    }

    #[test]
    fn test_branch_filter() {
        let dn = |s: &str| Dn::parse(s).unwrap();
        let mut config = ImportConfig::default();
        assert!(config.includes(&dn("cn=a,o=test")));
        config.include_branches = vec![dn("ou=people,o=test")];
        config.exclude_branches = vec![dn("ou=old,ou=people,o=test")];
        assert!(config.includes(&dn("cn=a,ou=people,o=test")));
        assert!(!config.includes(&dn("cn=a,ou=old,ou=people,o=test")));
        assert!(!config.includes(&dn("o=test")));
    }
}
