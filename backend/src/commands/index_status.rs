//! `dirstore index-status`: report every index of every base DN.

use crate::cli::IndexStatusArgs;
use crate::lifecycle;
use anyhow::{Context, Result};
use dirstore_commons::Dn;
use dirstore_configs::BackendConfig;
use dirstore_pluggable::{IndexStatus, RootContainer};
use serde::Serialize;
use std::fmt::Write;

/// Indexes of one entry container.
#[derive(Debug, Clone, Serialize)]
pub struct BaseDnStatus {
    pub base_dn: String,
    pub entry_count: u64,
    pub indexes: Vec<IndexStatus>,
}

/// Collect the status of every container, or only of the one holding
/// `base_dn`.
pub fn collect(root: &RootContainer, base_dn: Option<&Dn>) -> Result<Vec<BaseDnStatus>> {
    let containers = match base_dn {
        Some(dn) => {
            let container = root
                .get_entry_container(dn)
                .ok_or_else(|| anyhow::anyhow!("No base DN is configured for {}", dn))?;
            vec![container]
        }
        None => root.entry_containers().cloned().collect(),
    };

    containers
        .iter()
        .map(|container| {
            Ok(BaseDnStatus {
                base_dn: container.base_dn().to_string(),
                entry_count: container.entry_count()?,
                indexes: container.index_status()?,
            })
        })
        .collect()
}

/// Fixed-width table, one row per index.
pub fn render_table(statuses: &[BaseDnStatus]) -> String {
    let mut out = String::new();
    for status in statuses {
        let _ = writeln!(out, "{} ({} entries)", status.base_dn, status.entry_count);
        let _ = writeln!(
            out,
            "  {:<32} {:<8} {:<8} {:>8} {:>10} {:>10}",
            "INDEX", "ACTIVE", "TRUSTED", "LIMIT", "EXCEEDED", "KEYS"
        );
        for index in &status.indexes {
            let _ = writeln!(
                out,
                "  {:<32} {:<8} {:<8} {:>8} {:>10} {:>10}",
                index.name.index_id(),
                yes_no(index.active),
                yes_no(index.trusted),
                index.index_entry_limit,
                index.entry_limit_exceeded,
                index.record_count
            );
        }
    }
    out
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

/// Open the configured backend and render its index report.
pub fn execute(config: &BackendConfig, args: &IndexStatusArgs) -> Result<String> {
    let base_dn = args
        .base_dn
        .as_deref()
        .map(Dn::parse)
        .transpose()
        .map_err(|e| anyhow::anyhow!("Invalid --base-dn: {}", e))?;

    let root = lifecycle::open_root_container(config)?;
    let statuses = collect(&root, base_dn.as_ref())?;
    root.close().context("Failed to close the backend")?;

    if args.json {
        Ok(serde_json::to_string_pretty(&statuses)?)
    } else {
        Ok(render_table(&statuses))
    }
}
