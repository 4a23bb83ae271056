//! Append-mode import: every entry goes through the regular add path.

use super::config::ImportConfig;
use super::ldif_reader::{ImportReporter, LdifReader};
use super::progress::ProgressLogger;
use super::LdifImportResult;
use crate::error::{DirectoryError, ResultCode, Result};
use crate::root_container::RootContainer;
use dirstore_commons::Entry;
use std::io::BufRead;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Adds entries one at a time in their own transaction. Indexes stay online
/// and trusted throughout.
pub struct SuccessiveAddsImportStrategy {
    root: Arc<RootContainer>,
    config: ImportConfig,
}

enum Outcome {
    Imported,
    Rejected(String),
}

impl SuccessiveAddsImportStrategy {
    pub fn new(root: Arc<RootContainer>, config: ImportConfig) -> Self {
        Self { root, config }
    }

    pub fn import_ldif<R: BufRead>(mut self, source: R) -> Result<LdifImportResult> {
        let reporter = Arc::new(ImportReporter::new(
            self.config.reject_writer.take(),
            self.config.skip_writer.take(),
        ));
        let processor = Arc::new(self.config.entry_processor());
        let mut reader = LdifReader::new(source, Arc::clone(&reporter), processor).with_branches(
            self.config.include_branches.clone(),
            self.config.exclude_branches.clone(),
        );

        if self.config.clear_backend {
            for container in self.root.entry_containers() {
                container.clear()?;
            }
        }

        let progress = ProgressLogger::start(Arc::clone(&reporter), self.config.progress_interval);
        let outcome = self.add_all(&mut reader, &reporter);
        drop(progress);
        reporter.flush();
        outcome?;
        Ok(reporter.snapshot())
    }

    fn add_all<R: BufRead>(&self, reader: &mut LdifReader<R>, reporter: &ImportReporter) -> Result<()> {
        while let Some(entry) = reader.read_entry()? {
            if self.config.cancel.load(Ordering::Relaxed) {
                log::warn!("LDIF import cancelled after {} entries", reporter.snapshot().entries_read);
                break;
            }
            match self.add(&entry)? {
                Outcome::Imported => reporter.entry_imported(),
                Outcome::Rejected(reason) => reader.reject_last_entry(&reason),
            }
        }
        Ok(())
    }

    fn add(&self, entry: &Entry) -> Result<Outcome> {
        let dn = entry.dn();
        let Some(container) = self.root.get_entry_container(dn) else {
            return Ok(Outcome::Rejected(format!("No base DN is configured for entry {}", dn)));
        };

        let err = match container.add_entry(entry) {
            Ok(_) => return Ok(Outcome::Imported),
            Err(err) => err,
        };
        match err.result_code {
            ResultCode::EntryAlreadyExists if self.config.replace_existing => {
                match container.get_entry(dn)? {
                    Some(old) => {
                        container.replace_entry(&old, entry)?;
                        Ok(Outcome::Imported)
                    }
                    None => Ok(Outcome::Rejected(err.message)),
                }
            }
            ResultCode::EntryAlreadyExists | ResultCode::NoSuchObject => Ok(Outcome::Rejected(err.message)),
            ResultCode::UnwillingToPerform if !container.storage().status().can_write() => Err(err),
            _ => Ok(Outcome::Rejected(describe(&err))),
        }
    }
}

fn describe(err: &DirectoryError) -> String {
    format!("Unable to add the entry: {}", err)
}
