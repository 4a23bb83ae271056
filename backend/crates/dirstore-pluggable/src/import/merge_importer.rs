//! Two-phase bulk import.
//!
//! ```text
//! phase 1  LDIF ─▶ workers ─▶ dn2id / id2entry / vlv   (written directly)
//!                     └──────▶ sorted chunk files       (index records)
//! phase 2  chunk files ─▶ k-way merge ─▶ one write per index key
//! ```
//!
//! Indexes are untrusted from the start of phase 1 until phase 2 completes.

use super::config::ImportConfig;
use super::import_ldif_reader::{EntryInformation, ImportLdifReader};
use super::import_record::{ImportOp, ImportRecord};
use super::ldif_reader::{ImportReporter, LdifReader};
use super::progress::ProgressLogger;
use super::suffix::Suffix;
use super::suffix_command::{ImportSuffixCommand, SuffixImportStrategy};
use super::LdifImportResult;
use crate::attribute_index::index_keys;
use crate::entry_container::EntryContainer;
use crate::error::{DirectoryError, ResultCode, Result};
use crate::index::{Index, ImportIdSet};
use crate::root_container::RootContainer;
use dirstore_commons::{Dn, Entry, EntryId};
use dirstore_configs::IndexType;
use dirstore_store::{Importer, StorageExt, Tree};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

/// Index ids used in [`ImportRecord`]s for one base DN.
pub(super) struct SuffixIndexes {
    id2children: u32,
    id2subtree: u32,
    attributes: Vec<(u32, IndexType, String)>,
}

/// Maps the compact index ids of import records back to indexes.
pub(super) struct IndexRegistry {
    indexes: Vec<Arc<Index>>,
    suffixes: BTreeMap<Dn, SuffixIndexes>,
}

impl IndexRegistry {
    pub(super) fn new<'c>(containers: impl IntoIterator<Item = &'c Arc<EntryContainer>>) -> Self {
        let mut indexes = Vec::new();
        let mut register = |index: &Arc<Index>| {
            indexes.push(Arc::clone(index));
            (indexes.len() - 1) as u32
        };

        let mut by_suffix = BTreeMap::new();
        for container in containers {
            let id2children = register(container.id2children());
            let id2subtree = register(container.id2subtree());
            let mut attributes = Vec::new();
            for attribute in container.attribute_indexes() {
                for (index_type, index) in attribute.indexes() {
                    attributes.push((register(index), index_type, attribute.attribute().to_string()));
                }
            }
            by_suffix.insert(
                container.base_dn().clone(),
                SuffixIndexes {
                    id2children,
                    id2subtree,
                    attributes,
                },
            );
        }
        Self {
            indexes,
            suffixes: by_suffix,
        }
    }

    fn index(&self, index_id: u32) -> Result<&Arc<Index>> {
        self.indexes.get(index_id as usize).ok_or_else(|| {
            DirectoryError::operations_error(format!("Import record refers to unknown index {}", index_id))
        })
    }

    pub(super) fn suffix(&self, base_dn: &Dn) -> Result<&SuffixIndexes> {
        self.suffixes.get(base_dn).ok_or_else(|| {
            DirectoryError::operations_error(format!("No import indexes registered for {}", base_dn))
        })
    }
}

/// Per-worker buffer of index records, spilled to sorted chunk files.
pub(super) struct SortBuffer<'a> {
    dir: &'a Path,
    worker: usize,
    capacity: usize,
    records: Vec<(ImportRecord, EntryId)>,
    chunks: Vec<PathBuf>,
}

impl<'a> SortBuffer<'a> {
    pub(super) fn new(dir: &'a Path, worker: usize, capacity: usize) -> Self {
        Self {
            dir,
            worker,
            capacity: capacity.max(1),
            records: Vec::new(),
            chunks: Vec::new(),
        }
    }

    fn push(&mut self, record: ImportRecord, id: EntryId) -> io::Result<()> {
        self.records.push((record, id));
        if self.records.len() >= self.capacity {
            self.spill()?;
        }
        Ok(())
    }

    fn spill(&mut self) -> io::Result<()> {
        if self.records.is_empty() {
            return Ok(());
        }
        self.records.sort_unstable();
        let path = self
            .dir
            .join(format!("chunk-{:03}-{:06}.bin", self.worker, self.chunks.len()));
        let mut out = BufWriter::new(File::create(&path)?);
        for (record, id) in self.records.drain(..) {
            record.write_to(&mut out)?;
            out.write_all(&id.to_bytes())?;
        }
        out.flush()?;
        log::trace!("Spilled import chunk {}", path.display());
        self.chunks.push(path);
        Ok(())
    }

    pub(super) fn finish(mut self) -> io::Result<Vec<PathBuf>> {
        self.spill()?;
        Ok(self.chunks)
    }
}

struct ChunkReader {
    input: BufReader<File>,
}

impl ChunkReader {
    fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            input: BufReader::new(File::open(path)?),
        })
    }

    fn next(&mut self) -> io::Result<Option<(ImportRecord, EntryId)>> {
        let Some(record) = ImportRecord::read_from(&mut self.input)? else {
            return Ok(None);
        };
        let mut id = [0u8; EntryId::SIZE];
        self.input.read_exact(&mut id)?;
        Ok(Some((record, EntryId::new(u64::from_be_bytes(id)))))
    }
}

/// All buffered changes to one key of one index.
struct KeyGroup {
    index: Arc<Index>,
    index_id: u32,
    key: Vec<u8>,
    deletes: ImportIdSet,
    inserts: ImportIdSet,
}

impl KeyGroup {
    fn new(record: &ImportRecord, registry: &IndexRegistry) -> Result<Self> {
        let index = Arc::clone(registry.index(record.index_id())?);
        let limit = index.index_entry_limit();
        Ok(Self {
            index,
            index_id: record.index_id(),
            key: record.key().to_vec(),
            deletes: ImportIdSet::new(record.key(), 0),
            inserts: ImportIdSet::new(record.key(), limit),
        })
    }

    fn matches(&self, record: &ImportRecord) -> bool {
        self.index_id == record.index_id() && self.key == record.key()
    }

    fn add(&mut self, op: ImportOp, id: EntryId) {
        match op {
            ImportOp::Delete => self.deletes.add(id),
            ImportOp::Insert => self.inserts.add(id),
        }
    }

    /// Writes the group. IDs both deleted and inserted cancel out.
    fn apply(mut self, importer: &dyn Importer) -> Result<()> {
        if self.inserts.is_defined() {
            let both: Vec<EntryId> = self
                .deletes
                .as_entry_id_set()
                .iter()
                .filter(|id| self.inserts.contains(*id))
                .collect();
            for id in both {
                self.deletes.remove(id);
                self.inserts.remove(id);
            }
        }
        if !self.deletes.is_empty() {
            self.index.import_remove(importer, &self.deletes)?;
        }
        if !self.inserts.is_empty() {
            self.index.import_put(importer, &self.inserts)?;
        }
        Ok(())
    }
}

/// Shared state of the phase 1 workers.
struct WorkerContext<'a, R> {
    reader: &'a ImportLdifReader<R>,
    importer: &'a dyn Importer,
    registry: &'a IndexRegistry,
    reporter: &'a ImportReporter,
    cancel: &'a AtomicBool,
    work_dir: &'a Path,
    chunk_records: usize,
    replace_existing: bool,
}

impl<R: BufRead> WorkerContext<'_, R> {
    fn run(&self, worker: usize) -> Result<Vec<PathBuf>> {
        let mut buffer = SortBuffer::new(self.work_dir, worker, self.chunk_records);
        while !self.cancel.load(Ordering::Relaxed) {
            let Some(info) = self.reader.read_entry()? else {
                break;
            };
            let outcome = self.import_entry(&mut buffer, &info);
            info.suffix.remove_pending(info.entry.dn());
            outcome?;
        }
        Ok(buffer.finish()?)
    }

    fn import_entry(&self, buffer: &mut SortBuffer<'_>, info: &EntryInformation) -> Result<()> {
        let EntryInformation {
            entry,
            entry_id,
            suffix,
            record,
        } = info;
        let container = suffix.container();
        let indexes = self.registry.suffix(container.base_dn())?;
        let dn2id = container.dn2id();
        let dn = entry.dn();

        let mut ancestors = Vec::new();
        if let Some(parent) = dn.parent().filter(|_| dn != container.base_dn()) {
            if !suffix.wait_while_pending(&parent, self.cancel) {
                return Ok(());
            }
            let in_base = dn
                .self_and_ancestors()
                .skip(1)
                .take_while(|ancestor| container.base_dn().is_superior_or_equal_to(ancestor));
            for ancestor in in_base {
                match self.importer.read(dn2id.name(), &dn2id.dn_to_key(&ancestor))? {
                    Some(bytes) => ancestors.push(EntryId::from_bytes(&bytes)?),
                    None => {
                        self.reporter
                            .reject(record, &format!("The parent entry {} does not exist", ancestor));
                        return Ok(());
                    }
                }
            }
        }

        // A DN is written at most once per import.
        if !suffix.mark_imported(dn) {
            self.reporter
                .reject(record, &format!("The entry {} appears more than once in the import", dn));
            return Ok(());
        }

        let id2entry = container.id2entry();
        let key = dn2id.dn_to_key(dn);
        if let Some(existing) = self.importer.read(dn2id.name(), &key)? {
            if !self.replace_existing {
                self.reporter
                    .reject(record, &format!("The entry {} already exists", dn));
                return Ok(());
            }
            let old_id = EntryId::from_bytes(&existing)?;
            let old_entry = id2entry.import_get(self.importer, &old_id)?;
            id2entry.import_put(self.importer, &old_id, entry)?;
            if let Some(old) = &old_entry {
                emit_attribute_records(buffer, indexes, old, old_id, ImportOp::Delete)?;
                for vlv in container.vlv_indexes() {
                    vlv.import_remove(self.importer, &vlv.encode_sort_key(old, old_id))?;
                }
            }
            emit_attribute_records(buffer, indexes, entry, old_id, ImportOp::Insert)?;
            for vlv in container.vlv_indexes() {
                vlv.import_put(self.importer, &vlv.encode_sort_key(entry, old_id))?;
            }
            log::trace!("Replaced entry {} (ID {})", dn, old_id);
            self.reporter.entry_imported();
            return Ok(());
        }

        self.importer.put(dn2id.name(), &key, &entry_id.to_bytes())?;
        id2entry.import_put(self.importer, entry_id, entry)?;
        emit_attribute_records(buffer, indexes, entry, *entry_id, ImportOp::Insert)?;
        emit_hierarchy_records(buffer, indexes, &ancestors, *entry_id)?;
        for vlv in container.vlv_indexes() {
            vlv.import_put(self.importer, &vlv.encode_sort_key(entry, *entry_id))?;
        }
        self.reporter.entry_imported();
        Ok(())
    }
}

pub(super) fn emit_attribute_records(
    buffer: &mut SortBuffer<'_>,
    indexes: &SuffixIndexes,
    entry: &Entry,
    id: EntryId,
    op: ImportOp,
) -> Result<()> {
    for (index_id, index_type, attribute) in &indexes.attributes {
        for key in index_keys(*index_type, attribute, entry) {
            buffer.push(ImportRecord::new(op, *index_id, key), id)?;
        }
    }
    Ok(())
}

/// `ancestors` runs from the parent up to the base entry.
pub(super) fn emit_hierarchy_records(
    buffer: &mut SortBuffer<'_>,
    indexes: &SuffixIndexes,
    ancestors: &[EntryId],
    id: EntryId,
) -> Result<()> {
    if let Some(parent) = ancestors.first() {
        buffer.push(ImportRecord::insert(indexes.id2children, parent.to_bytes().to_vec()), id)?;
    }
    for ancestor in ancestors {
        buffer.push(ImportRecord::insert(indexes.id2subtree, ancestor.to_bytes().to_vec()), id)?;
    }
    Ok(())
}

pub(super) fn work_dir(temp_dir: Option<&Path>) -> io::Result<tempfile::TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("dirstore-import-");
    match temp_dir {
        Some(dir) => builder.tempdir_in(dir),
        None => builder.tempdir(),
    }
}

/// Merges the sorted chunk files and applies one write per index key.
pub(super) fn merge_chunks(chunks: &[PathBuf], registry: &IndexRegistry, importer: &dyn Importer) -> Result<u64> {
    let mut readers = chunks
        .iter()
        .map(|path| ChunkReader::open(path))
        .collect::<io::Result<Vec<_>>>()?;

    let mut heap = BinaryHeap::new();
    for (source, reader) in readers.iter_mut().enumerate() {
        if let Some((record, id)) = reader.next()? {
            heap.push(Reverse((record, id, source)));
        }
    }

    let mut keys = 0u64;
    let mut group: Option<KeyGroup> = None;
    while let Some(Reverse((record, id, source))) = heap.pop() {
        if let Some((next, next_id)) = readers[source].next()? {
            heap.push(Reverse((next, next_id, source)));
        }
        if !group.as_ref().is_some_and(|current| current.matches(&record)) {
            if let Some(done) = group.take() {
                done.apply(importer)?;
                keys += 1;
            }
            group = Some(KeyGroup::new(&record, registry)?);
        }
        if let Some(current) = group.as_mut() {
            current.add(record.op(), id);
        }
    }
    if let Some(done) = group.take() {
        done.apply(importer)?;
        keys += 1;
    }
    Ok(keys)
}

/// Bulk importer. Rebuilds the indexes of every imported base DN.
pub struct MergeImporter {
    root: Arc<RootContainer>,
    config: ImportConfig,
}

/// Kept entries that could not be re-added before the import.
type Deferred = Vec<(Arc<Suffix>, Vec<Entry>)>;

impl MergeImporter {
    pub fn new(root: Arc<RootContainer>, config: ImportConfig) -> Self {
        Self { root, config }
    }

    pub fn import_ldif<R: BufRead + Send>(mut self, source: R) -> Result<LdifImportResult> {
        let (suffixes, deferred) = self.prepare_suffixes()?;
        if suffixes.is_empty() {
            log::warn!("None of the configured base DNs takes part in this import");
        }
        self.set_trusted(&suffixes, false)?;

        let reporter = Arc::new(ImportReporter::new(
            self.config.reject_writer.take(),
            self.config.skip_writer.take(),
        ));
        let processor = Arc::new(self.config.entry_processor());
        let reader = LdifReader::new(source, Arc::clone(&reporter), processor).with_branches(
            self.config.include_branches.clone(),
            self.config.exclude_branches.clone(),
        );
        let reader = ImportLdifReader::new(reader, Arc::clone(&self.root), suffixes.clone());
        let registry = IndexRegistry::new(suffixes.values().map(|suffix| suffix.container()));
        let work_dir = work_dir(self.config.temp_dir.as_deref())?;

        let storage = Arc::clone(self.root.storage());
        let importer = storage.start_import()?;
        let progress = ProgressLogger::start(Arc::clone(&reporter), self.config.progress_interval);
        let phases = self.run_phases(&reader, importer.as_ref(), &registry, &reporter, work_dir.path());
        drop(progress);
        reporter.flush();
        let close = importer.close();
        let completed = phases?;
        close?;

        if !completed {
            log::warn!("LDIF import cancelled; indexes of the imported base DNs are left untrusted");
            return Ok(reporter.snapshot());
        }

        self.add_deferred(deferred)?;
        self.set_trusted(&suffixes, true)?;
        Ok(reporter.snapshot())
    }

    /// Returns `false` if the import was cancelled before phase 2.
    fn run_phases<R: BufRead + Send>(
        &self,
        reader: &ImportLdifReader<R>,
        importer: &dyn Importer,
        registry: &IndexRegistry,
        reporter: &ImportReporter,
        work_dir: &Path,
    ) -> Result<bool> {
        let context = WorkerContext {
            reader,
            importer,
            registry,
            reporter,
            cancel: &self.config.cancel,
            work_dir,
            chunk_records: self.config.chunk_records,
            replace_existing: self.config.replace_existing,
        };

        let threads = self.config.thread_count.max(1);
        log::info!("Starting LDIF import phase one with {} worker threads", threads);
        let outcomes: Vec<Result<Vec<PathBuf>>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|worker| {
                    let context = &context;
                    thread::Builder::new()
                        .name(format!("import-worker-{}", worker))
                        .spawn_scoped(scope, move || {
                            let outcome = context.run(worker);
                            if outcome.is_err() {
                                context.cancel.store(true, Ordering::SeqCst);
                            }
                            outcome
                        })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle {
                    Ok(handle) => handle.join().unwrap_or_else(|_| {
                        Err(DirectoryError::operations_error("An import worker thread panicked"))
                    }),
                    Err(err) => Err(err.into()),
                })
                .collect()
        });

        let mut chunks = Vec::new();
        for outcome in outcomes {
            chunks.extend(outcome?);
        }
        if self.config.cancel.load(Ordering::SeqCst) {
            return Ok(false);
        }

        log::info!("Starting LDIF import phase two: merging {} sorted chunks", chunks.len());
        let keys = merge_chunks(&chunks, registry, importer)?;
        log::info!("Wrote {} index keys", keys);
        Ok(true)
    }

    fn prepare_suffixes(&self) -> Result<(BTreeMap<Dn, Arc<Suffix>>, Deferred)> {
        let mut suffixes = BTreeMap::new();
        let mut deferred = Vec::new();
        for container in self.root.entry_containers() {
            let command = ImportSuffixCommand::new(
                container.base_dn(),
                &self.config.include_branches,
                &self.config.exclude_branches,
                self.config.append,
                self.config.clear_backend,
            );
            log::info!("Importing base DN {} with strategy {}", container.base_dn(), command.strategy());
            let suffix = Arc::new(Suffix::new(Arc::clone(container), command));

            match suffix.strategy() {
                SuffixImportStrategy::SkipSuffix => continue,
                SuffixImportStrategy::ClearSuffix => container.clear()?,
                SuffixImportStrategy::AppendOrReplace => {
                    if self.config.clear_backend {
                        container.clear()?;
                    }
                }
                SuffixImportStrategy::MergeDbWithLdif | SuffixImportStrategy::IncludeExcludeBranches => {
                    let waiting = migrate_existing_entries(&suffix)?;
                    if !waiting.is_empty() {
                        deferred.push((Arc::clone(&suffix), waiting));
                    }
                }
            }
            suffixes.insert(container.base_dn().clone(), suffix);
        }
        Ok((suffixes, deferred))
    }

    fn add_deferred(&self, deferred: Deferred) -> Result<()> {
        for (suffix, entries) in deferred {
            for entry in entries {
                match suffix.container().add_entry(&entry) {
                    Ok(_) => {}
                    Err(err) if err.result_code == ResultCode::EntryAlreadyExists => {
                        log::debug!("Kept entry {} was replaced by the imported one", entry.dn());
                    }
                    Err(err) if err.result_code == ResultCode::NoSuchObject => {
                        log::warn!("Dropping existing entry {}: {}", entry.dn(), err.message);
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    fn set_trusted(&self, suffixes: &BTreeMap<Dn, Arc<Suffix>>, trusted: bool) -> Result<()> {
        StorageExt::write(self.root.storage().as_ref(), |txn| {
            for suffix in suffixes.values() {
                suffix.container().set_indexes_trusted(txn, trusted)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

/// Clears the container and re-adds the existing entries the strategy keeps.
/// Returns the ones whose parent is gone; they are retried after the import.
fn migrate_existing_entries(suffix: &Suffix) -> Result<Vec<Entry>> {
    let container = suffix.container();
    let mut kept: Vec<Entry> = container
        .list_entries()?
        .into_iter()
        .map(|(_, entry)| entry)
        .filter(|entry| suffix.keeps_existing(entry.dn()))
        .collect();
    kept.sort_by(|a, b| a.dn().cmp(b.dn()));
    container.clear()?;

    let total = kept.len();
    let mut waiting = Vec::new();
    for entry in kept {
        match container.add_entry(&entry) {
            Ok(_) => {}
            Err(err) if err.result_code == ResultCode::NoSuchObject => waiting.push(entry),
            Err(err) => return Err(err),
        }
    }
    log::info!(
        "Kept {} existing entries of {} ({} waiting for their parent)",
        total,
        container.base_dn(),
        waiting.len()
    );
    Ok(waiting)
}
