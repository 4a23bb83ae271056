//! `dirstore import-ldif`: load an LDIF file into the configured backend.

use crate::cli::ImportLdifArgs;
use crate::lifecycle;
use anyhow::{Context, Result};
use dirstore_commons::Dn;
use dirstore_configs::{BackendConfig, ImportSettings};
use dirstore_pluggable::{import_ldif_file, ImportConfig, LdifImportResult, RootContainer};
use std::sync::Arc;

/// Merge the command-line flags over the `[import]` section.
pub fn effective_settings(settings: &ImportSettings, args: &ImportLdifArgs) -> ImportSettings {
    let mut settings = settings.clone();
    if let Some(threads) = args.threads {
        settings.thread_count = threads.max(1);
    }
    if let Some(path) = &args.reject_file {
        settings.reject_file = Some(path.clone());
    }
    if let Some(path) = &args.skip_file {
        settings.skip_file = Some(path.clone());
    }
    if let Some(dir) = &args.temp_dir {
        settings.temp_dir = Some(dir.clone());
    }
    settings.skip_schema_validation |= args.skip_schema_validation;
    settings.replace_existing |= args.replace_existing;
    settings
}

fn parse_branches(values: &[String], flag: &str) -> Result<Vec<Dn>> {
    values
        .iter()
        .map(|value| {
            Dn::parse(value).map_err(|e| anyhow::anyhow!("Invalid {} '{}': {}", flag, value, e))
        })
        .collect()
}

/// Build the import configuration from the config file and the flags.
pub fn build_import_config(config: &BackendConfig, args: &ImportLdifArgs) -> Result<ImportConfig> {
    let settings = effective_settings(&config.import, args);
    let mut import_config =
        ImportConfig::from_settings(&settings).context("Failed to open the reject/skip files")?;
    import_config.append = args.append;
    import_config.clear_backend = args.clear_backend;
    import_config.include_branches = parse_branches(&args.include_branches, "--include-branch")?;
    import_config.exclude_branches = parse_branches(&args.exclude_branches, "--exclude-branch")?;
    Ok(import_config)
}

/// Run the import against an opened root container.
pub fn run(
    root: Arc<RootContainer>,
    config: &BackendConfig,
    args: &ImportLdifArgs,
) -> Result<LdifImportResult> {
    let import_config = build_import_config(config, args)?;
    log::info!(
        "Importing {} ({} mode, {} thread(s))",
        args.ldif_file.display(),
        if args.append { "append" } else { "merge" },
        import_config.thread_count
    );
    import_ldif_file(root, &args.ldif_file, import_config)
        .with_context(|| format!("Import of {} failed", args.ldif_file.display()))
}

/// Open the configured backend and import into it.
pub fn execute(config: &BackendConfig, args: &ImportLdifArgs) -> Result<LdifImportResult> {
    let root = lifecycle::open_root_container(config)?;
    run(root, config, args)
}

/// One-line summary printed when the import finishes.
pub fn summary(result: &LdifImportResult) -> String {
    format!(
        "Processed {} entries: imported {}, skipped {}, rejected {}",
        result.entries_read, result.entries_imported, result.entries_ignored, result.entries_rejected
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args() -> ImportLdifArgs {
        ImportLdifArgs {
            ldif_file: PathBuf::from("in.ldif"),
            append: false,
            replace_existing: false,
            clear_backend: false,
            include_branches: Vec::new(),
            exclude_branches: Vec::new(),
            threads: None,
            reject_file: None,
            skip_file: None,
            skip_schema_validation: false,
            temp_dir: None,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let mut base = ImportSettings::default();
        base.thread_count = 8;
        base.replace_existing = true;

        let mut args = args();
        args.threads = Some(0);
        args.temp_dir = Some("/tmp/sort".to_string());

        let settings = effective_settings(&base, &args);
        assert_eq!(settings.thread_count, 1);
        assert_eq!(settings.temp_dir.as_deref(), Some("/tmp/sort"));
        // flags only ever turn these on
        assert!(settings.replace_existing);
        assert!(!settings.skip_schema_validation);
    }

    #[test]
    fn test_branches_are_parsed() {
        let mut args = args();
        args.include_branches = vec!["ou=People,dc=example,dc=com".to_string()];
        args.append = true;
        let config = build_import_config(&BackendConfig::default(), &args).unwrap();
        assert!(config.append);
        assert_eq!(config.include_branches.len(), 1);

        args.exclude_branches = vec!["not a dn".to_string()];
        assert!(build_import_config(&BackendConfig::default(), &args).is_err());
    }

    #[test]
    fn test_summary() {
        let result = LdifImportResult {
            entries_read: 5,
            entries_imported: 3,
            entries_ignored: 1,
            entries_rejected: 1,
        };
        assert_eq!(
            summary(&result),
            "Processed 5 entries: imported 3, skipped 1, rejected 1"
        );
    }
}
