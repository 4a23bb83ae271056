//! Thread-safe LDIF reader used by the merge importer workers.

use super::config::EntryProcessor;
use super::ldif_reader::{parse_dn, parse_entry, ImportReporter, LdifReader, RawRecord};
use super::suffix::Suffix;
use crate::error::Result;
use crate::root_container::RootContainer;
use dirstore_commons::{Dn, Entry, EntryId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::sync::Arc;

/// An entry handed to a worker, with its pre-assigned ID and suffix.
pub struct EntryInformation {
    pub entry: Entry,
    pub entry_id: EntryId,
    pub suffix: Arc<Suffix>,
    pub record: RawRecord,
}

/// Wraps an [`LdifReader`] so that several workers can pull entries.
///
/// Reading, suffix resolution, the duplicate check and ID assignment happen
/// under one lock, so IDs follow LDIF order. Attribute parsing, plugins and
/// schema checks run outside it.
pub struct ImportLdifReader<R> {
    reader: Mutex<LdifReader<R>>,
    root: Arc<RootContainer>,
    suffixes: BTreeMap<Dn, Arc<Suffix>>,
    reporter: Arc<ImportReporter>,
    processor: Arc<EntryProcessor>,
}

impl<R: BufRead> ImportLdifReader<R> {
    pub fn new(reader: LdifReader<R>, root: Arc<RootContainer>, suffixes: BTreeMap<Dn, Arc<Suffix>>) -> Self {
        let reporter = Arc::clone(reader.reporter());
        let processor = Arc::clone(reader.processor());
        Self {
            reader: Mutex::new(reader),
            root,
            suffixes,
            reporter,
            processor,
        }
    }

    pub fn reporter(&self) -> &Arc<ImportReporter> {
        &self.reporter
    }

    fn suffix_for(&self, dn: &Dn) -> Option<Arc<Suffix>> {
        let container = self.root.get_entry_container(dn)?;
        self.suffixes.get(container.base_dn()).cloned()
    }

    /// Next entry to import, or `None` at end of input.
    ///
    /// The returned DN is marked pending in its suffix; the caller must
    /// remove the mark once the entry is written.
    pub fn read_entry(&self) -> Result<Option<EntryInformation>> {
        loop {
            let (record, dn, suffix, entry_id) = {
                let mut reader = self.reader.lock();
                let Some(record) = reader.read_raw_record()? else {
                    return Ok(None);
                };
                let dn = match parse_dn(&record) {
                    Ok(dn) => dn,
                    Err(reason) => {
                        drop(reader);
                        self.reporter.reject(&record, &reason);
                        continue;
                    }
                };
                if !reader.is_included(&dn) {
                    drop(reader);
                    self.reporter.skip(&record, "Entry is outside the included branches");
                    continue;
                }
                let Some(suffix) = self.suffix_for(&dn) else {
                    drop(reader);
                    self.reporter
                        .skip(&record, &format!("No base DN being imported contains {}", dn));
                    continue;
                };
                if !suffix.add_pending(&dn) {
                    drop(reader);
                    self.reporter
                        .reject(&record, &format!("Entry {} is already being imported", dn));
                    continue;
                }
                let entry_id = self.root.next_entry_id();
                (record, dn, suffix, entry_id)
            };

            let processed = parse_entry(&record, dn.clone()).and_then(|mut entry| {
                self.processor.process(&mut entry)?;
                if entry.dn() != &dn {
                    return Err("Import plugins must not rename entries".to_string());
                }
                Ok(entry)
            });
            let entry = match processed {
                Ok(entry) => entry,
                Err(reason) => {
                    suffix.remove_pending(&dn);
                    self.reporter.reject(&record, &reason);
                    continue;
                }
            };

            return Ok(Some(EntryInformation {
                entry,
                entry_id,
                suffix,
                record,
            }));
        }
    }
}
