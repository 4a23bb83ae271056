//! Offline index rebuild from the stored entries.
//!
//! Every index tree of the selected base DNs is cleared and refilled from
//! id2entry through the same sorted chunks the merge importer uses. Entries
//! are read in batches so that no read transaction is open while the
//! storage importer writes.

use super::config::ImportConfig;
use super::import_record::ImportOp;
use super::merge_importer::{
    emit_attribute_records, emit_hierarchy_records, merge_chunks, work_dir, IndexRegistry, SortBuffer,
};
use crate::entry_container::EntryContainer;
use crate::error::{DirectoryError, Result};
use crate::root_container::RootContainer;
use dirstore_commons::{Dn, Entry, EntryId};
use dirstore_store::{Cursor, Importer, SequentialCursor, Storage, StorageExt, Tree};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Counters reported at the end of a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebuildResult {
    pub base_dns: usize,
    pub entries_processed: u64,
    pub keys_written: u64,
}

/// Rebuilds every index of `base_dn`, or of all base DNs when `None`.
///
/// Indexes stay untrusted until the rebuild completes. The root container is
/// left open.
pub fn rebuild_indexes(root: &RootContainer, base_dn: Option<&Dn>, config: &ImportConfig) -> Result<RebuildResult> {
    let started = Instant::now();
    let containers = select_containers(root, base_dn)?;
    let storage = Arc::clone(root.storage());

    StorageExt::write(storage.as_ref(), |txn| {
        for container in &containers {
            container.set_indexes_trusted(txn, false)?;
        }
        Ok(())
    })?;
    for container in &containers {
        container.clear_indexes()?;
    }

    let registry = IndexRegistry::new(containers.iter());
    let work_dir = work_dir(config.temp_dir.as_deref())?;
    let importer = storage.start_import()?;
    let outcome = refill(storage.as_ref(), importer.as_ref(), &containers, &registry, work_dir.path(), config);
    let close = importer.close();
    let (entries_processed, keys_written) = outcome?;
    close?;

    StorageExt::write(storage.as_ref(), |txn| {
        for container in &containers {
            container.set_indexes_trusted(txn, true)?;
        }
        Ok(())
    })?;

    let result = RebuildResult {
        base_dns: containers.len(),
        entries_processed,
        keys_written,
    };
    log::info!(
        "Rebuilt the indexes of {} base DNs in {:.1}s: {} entries, {} index keys",
        result.base_dns,
        started.elapsed().as_secs_f64(),
        result.entries_processed,
        result.keys_written
    );
    Ok(result)
}

fn select_containers(root: &RootContainer, base_dn: Option<&Dn>) -> Result<Vec<Arc<EntryContainer>>> {
    match base_dn {
        None => Ok(root.entry_containers().cloned().collect()),
        Some(dn) => root
            .entry_containers()
            .find(|container| container.base_dn() == dn)
            .map(|container| vec![Arc::clone(container)])
            .ok_or_else(|| DirectoryError::no_such_object(format!("No backend is configured for base DN {}", dn))),
    }
}

/// Returns the number of entries read and index keys written.
fn refill(
    storage: &dyn Storage,
    importer: &dyn Importer,
    containers: &[Arc<EntryContainer>],
    registry: &IndexRegistry,
    dir: &Path,
    config: &ImportConfig,
) -> Result<(u64, u64)> {
    let batch_size = config.chunk_records.max(1);
    let mut buffer = SortBuffer::new(dir, 0, config.chunk_records);
    let mut entries = 0u64;

    for container in containers {
        log::info!("Rebuilding the indexes of base DN {}", container.base_dn());
        let indexes = registry.suffix(container.base_dn())?;
        let mut from = EntryId::new(0);
        loop {
            let batch = read_batch(storage, container, from, batch_size)?;
            let Some((last, _)) = batch.last() else {
                break;
            };
            from = last.next();
            for (id, entry) in &batch {
                let ancestors = ancestor_ids(importer, container, entry.dn())?;
                emit_attribute_records(&mut buffer, indexes, entry, *id, ImportOp::Insert)?;
                emit_hierarchy_records(&mut buffer, indexes, &ancestors, *id)?;
                for vlv in container.vlv_indexes() {
                    vlv.import_put(importer, &vlv.encode_sort_key(entry, *id))?;
                }
            }
            entries += batch.len() as u64;
            log::debug!("Read {} entries of {}", entries, container.base_dn());
        }
    }

    let chunks = buffer.finish()?;
    log::info!("Merging {} sorted chunks", chunks.len());
    let keys = merge_chunks(&chunks, registry, importer)?;
    Ok((entries, keys))
}

/// Up to `limit` entries with an ID of at least `from`, in ID order.
fn read_batch(
    storage: &dyn Storage,
    container: &EntryContainer,
    from: EntryId,
    limit: usize,
) -> Result<Vec<(EntryId, Entry)>> {
    let txn = storage.begin_read()?;
    let mut cursor = txn.open_cursor(container.id2entry().name())?;
    let mut batch = Vec::new();
    let mut positioned = cursor.position_to_key_or_next(&from.to_bytes())?;
    while positioned && batch.len() < limit {
        let id = EntryId::from_bytes(&cursor.key()?)?;
        let entry = container.id2entry().decode_entry(&cursor.value()?)?;
        batch.push((id, entry));
        positioned = cursor.next()?;
    }
    Ok(batch)
}

/// IDs of the parent up to the base entry. Stops at the first ancestor
/// missing from dn2id.
fn ancestor_ids(importer: &dyn Importer, container: &EntryContainer, dn: &Dn) -> Result<Vec<EntryId>> {
    let dn2id = container.dn2id();
    let mut ids = Vec::new();
    let in_base = dn
        .self_and_ancestors()
        .skip(1)
        .take_while(|ancestor| container.base_dn().is_superior_or_equal_to(ancestor));
    for ancestor in in_base {
        match importer.read(dn2id.name(), &dn2id.dn_to_key(&ancestor))? {
            Some(bytes) => ids.push(EntryId::from_bytes(&bytes)?),
            None => {
                log::warn!("Entry {} has no parent {} in dn2id", dn, ancestor);
                break;
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirstore_configs::{AttributeIndexSettings, IndexSettings, IndexType, VlvIndexSettings};
    use dirstore_store::InMemoryStorage;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn settings() -> IndexSettings {
        IndexSettings {
            attribute_indexes: vec![AttributeIndexSettings {
                attribute: "cn".to_string(),
                types: vec![IndexType::Equality, IndexType::Presence],
                entry_limit: None,
            }],
            vlv_indexes: vec![VlvIndexSettings {
                name: "by-cn".to_string(),
                sort_attributes: vec!["cn".to_string()],
            }],
            ..IndexSettings::default()
        }
    }

    fn person(dn_str: &str, cn: &str) -> Entry {
        let mut entry = Entry::new(dn(dn_str));
        entry.add_attribute_value("objectClass", "person");
        entry.add_attribute_value("cn", cn);
        entry
    }

    fn populated_root() -> RootContainer {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let root = RootContainer::open(storage, &[dn("o=test"), dn("o=other")], &settings()).unwrap();
        let test = root.get_entry_container(&dn("o=test")).unwrap();
        test.add_entry(&Entry::new(dn("o=test"))).unwrap();
        test.add_entry(&Entry::new(dn("ou=people,o=test"))).unwrap();
        for i in 0..5 {
            test.add_entry(&person(&format!("cn=user{i},ou=people,o=test"), &format!("User {i}")))
                .unwrap();
        }
        let other = root.get_entry_container(&dn("o=other")).unwrap();
        other.add_entry(&Entry::new(dn("o=other"))).unwrap();
        other.add_entry(&person("cn=solo,o=other", "Solo")).unwrap();
        root
    }

    fn small_batches() -> ImportConfig {
        let mut config = ImportConfig::default();
        config.chunk_records = 2;
        config
    }

    #[test]
    fn test_rebuild_restores_dropped_index_content() {
        let root = populated_root();
        let container = root.get_entry_container(&dn("o=test")).unwrap();
        let people = container.get_entry_id(&dn("ou=people,o=test")).unwrap().unwrap();
        let user3 = container
            .get_entry_id(&dn("cn=user3,ou=people,o=test"))
            .unwrap()
            .unwrap();
        container.clear_indexes().unwrap();
        assert!(container.index_status().unwrap().iter().any(|s| !s.trusted));

        let result = rebuild_indexes(&root, Some(&dn("o=test")), &small_batches()).unwrap();
        assert_eq!(result.base_dns, 1);
        assert_eq!(result.entries_processed, 7);
        assert!(container.index_status().unwrap().iter().all(|s| s.trusted));

        let txn = root.storage().begin_read().unwrap();
        let cn = container.attribute_indexes()[0].index(IndexType::Equality).unwrap();
        assert_eq!(cn.get(txn.as_ref(), b"user 3").ids(), Some(&[user3][..]));
        assert_eq!(container.id2children().get(txn.as_ref(), &people.to_bytes()).size(), 5);
        let base = EntryId::new(1);
        assert_eq!(container.id2subtree().get(txn.as_ref(), &base.to_bytes()).size(), 6);
        let page = container.vlv_indexes()[0].read_page(txn.as_ref(), 0, 10).unwrap();
        assert_eq!(page.len(), 7);
        assert_eq!(page[3], user3);
    }

    #[test]
    fn test_rebuild_drops_stale_keys() {
        let root = populated_root();
        let container = root.get_entry_container(&dn("o=test")).unwrap();
        let user0 = container
            .get_entry_id(&dn("cn=user0,ou=people,o=test"))
            .unwrap()
            .unwrap();
        let cn = Arc::clone(container.attribute_indexes()[0].index(IndexType::Equality).unwrap());
        StorageExt::write(root.storage().as_ref(), |txn| {
            let stale = crate::entry_id_set::EntryIdSet::new_defined(b"ghost".to_vec(), [user0]);
            cn.update(txn, b"ghost", None, Some(&stale))
        })
        .unwrap();

        rebuild_indexes(&root, None, &small_batches()).unwrap();

        let txn = root.storage().begin_read().unwrap();
        assert!(cn.get(txn.as_ref(), b"ghost").is_empty());
        assert_eq!(cn.get(txn.as_ref(), b"user 0").ids(), Some(&[user0][..]));
    }

    #[test]
    fn test_rebuild_all_base_dns_and_unknown_base_dn() {
        let root = populated_root();
        let result = rebuild_indexes(&root, None, &ImportConfig::default()).unwrap();
        assert_eq!(result.base_dns, 2);
        assert_eq!(result.entries_processed, 9);

        let other = root.get_entry_container(&dn("o=other")).unwrap();
        let solo = other.get_entry_id(&dn("cn=solo,o=other")).unwrap().unwrap();
        let txn = root.storage().begin_read().unwrap();
        let cn = other.attribute_indexes()[0].index(IndexType::Equality).unwrap();
        assert_eq!(cn.get(txn.as_ref(), b"solo").ids(), Some(&[solo][..]));
        drop(txn);

        let err = rebuild_indexes(&root, Some(&dn("o=missing")), &ImportConfig::default()).unwrap_err();
        assert_eq!(err.result_code, crate::error::ResultCode::NoSuchObject);
    }
}
