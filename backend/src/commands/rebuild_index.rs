//! `dirstore rebuild-index`: refill the indexes from the stored entries.

use crate::cli::RebuildIndexArgs;
use crate::lifecycle;
use anyhow::{Context, Result};
use dirstore_commons::Dn;
use dirstore_configs::BackendConfig;
use dirstore_pluggable::import::{rebuild_indexes, RebuildResult};
use dirstore_pluggable::{ImportConfig, RootContainer};

/// Rebuild against an opened root container.
pub fn run(root: &RootContainer, config: &BackendConfig, args: &RebuildIndexArgs) -> Result<RebuildResult> {
    let base_dn = args
        .base_dn
        .as_deref()
        .map(Dn::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid --base-dn: {}", e))?;

    let mut settings = config.import.clone();
    if let Some(dir) = &args.temp_dir {
        settings.temp_dir = Some(dir.clone());
    }
    let rebuild_config = ImportConfig::from_settings(&settings).context("Failed to open the reject/skip files")?;
    rebuild_indexes(root, base_dn.as_ref(), &rebuild_config).context("Index rebuild failed")
}

/// Open the configured backend, rebuild, then close it.
pub fn execute(config: &BackendConfig, args: &RebuildIndexArgs) -> Result<RebuildResult> {
    let root = lifecycle::open_root_container(config)?;
    let outcome = run(&root, config, args);
    root.close().context("Failed to close the backend")?;
    outcome
}

pub fn summary(result: &RebuildResult) -> String {
    format!(
        "Rebuilt the indexes of {} base DN(s): {} entries, {} index keys",
        result.base_dns, result.entries_processed, result.keys_written
    )
}
