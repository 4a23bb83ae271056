//! LDIF import.
//!
//! Two strategies share the same reader, plugins and reporting:
//!
//! - [`SuccessiveAddsImportStrategy`] (append mode): regular adds, one
//!   transaction per entry, indexes stay online
//! - [`MergeImporter`]: bulk load through the storage importer with sorted
//!   index rebuilds, per-base-DN include/exclude handling
//!
//! [`rebuild_indexes`] refills the indexes of stored entries with the merge
//! importer's sorted chunks.
//!
//! ```rust,no_run
//! use dirstore_pluggable::import::{import_ldif_file, ImportConfig};
//! # fn run(root: std::sync::Arc<dirstore_pluggable::RootContainer>) -> dirstore_pluggable::Result<()> {
//! let result = import_ldif_file(root, "data.ldif".as_ref(), ImportConfig::default())?;
//! println!("imported {} of {}", result.entries_imported, result.entries_read);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod import_ldif_reader;
pub mod import_record;
pub mod ldif_reader;
pub mod merge_importer;
pub mod progress;
pub mod rebuild;
pub mod successive_adds;
pub mod suffix;
pub mod suffix_command;

pub use config::{EntryProcessor, ImportConfig, ImportPlugin, ObjectClassValidator, SchemaValidator};
pub use import_ldif_reader::{EntryInformation, ImportLdifReader};
pub use import_record::{ImportOp, ImportRecord};
pub use ldif_reader::{ImportReporter, LdifReader, RawRecord};
pub use merge_importer::MergeImporter;
pub use rebuild::{rebuild_indexes, RebuildResult};
pub use successive_adds::SuccessiveAddsImportStrategy;
pub use suffix::Suffix;
pub use suffix_command::{ImportSuffixCommand, SuffixImportStrategy};

use crate::error::{DirectoryError, Result};
use crate::root_container::RootContainer;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Counters reported at the end of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LdifImportResult {
    pub entries_read: u64,
    pub entries_imported: u64,
    pub entries_ignored: u64,
    pub entries_rejected: u64,
}

/// Imports `source` into `root`, then closes the root container whether the
/// import succeeded or not.
pub fn import_ldif<R: BufRead + Send>(
    root: Arc<RootContainer>,
    source: R,
    config: ImportConfig,
) -> Result<LdifImportResult> {
    let started = Instant::now();
    let append = config.append;
    log::info!("Starting LDIF import ({})", if append { "append" } else { "merge" });

    let outcome = if append {
        SuccessiveAddsImportStrategy::new(Arc::clone(&root), config).import_ldif(source)
    } else {
        MergeImporter::new(Arc::clone(&root), config).import_ldif(source)
    };
    let closed = root.close();

    let result = match outcome {
        Ok(result) => result,
        Err(err) => {
            log::error!("LDIF import failed: {}", err);
            if let Err(close_err) = closed {
                log::warn!("Closing the backend after a failed import also failed: {}", close_err);
            }
            return Err(err);
        }
    };
    closed?;

    let elapsed = started.elapsed().as_secs_f64();
    log::info!(
        "LDIF import complete in {:.1}s: {} read, {} imported, {} skipped, {} rejected",
        elapsed,
        result.entries_read,
        result.entries_imported,
        result.entries_ignored,
        result.entries_rejected
    );
    Ok(result)
}

pub fn import_ldif_file(root: Arc<RootContainer>, path: &Path, config: ImportConfig) -> Result<LdifImportResult> {
    let file = File::open(path).map_err(|err| {
        DirectoryError::operations_error(format!("Unable to open LDIF file {}: {}", path.display(), err))
    })?;
    import_ldif(root, BufReader::new(file), config)
}
