//! Per-base-DN import state.

use super::suffix_command::{ImportSuffixCommand, SuffixImportStrategy};
use crate::entry_container::EntryContainer;
use dashmap::DashSet;
use dirstore_commons::Dn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const PENDING_POLL: Duration = Duration::from_millis(1);

/// A base DN taking part in an import.
///
/// Tracks the DNs handed to workers but not yet written, so that a child can
/// wait for its parent and duplicates can be detected, and the DNs already
/// written by this import.
pub struct Suffix {
    container: Arc<EntryContainer>,
    command: ImportSuffixCommand,
    pending: DashSet<Dn>,
    imported: DashSet<Dn>,
}

impl Suffix {
    pub fn new(container: Arc<EntryContainer>, command: ImportSuffixCommand) -> Self {
        Self {
            container,
            command,
            pending: DashSet::new(),
            imported: DashSet::new(),
        }
    }

    pub fn base_dn(&self) -> &Dn {
        self.container.base_dn()
    }

    pub fn container(&self) -> &Arc<EntryContainer> {
        &self.container
    }

    pub fn strategy(&self) -> SuffixImportStrategy {
        self.command.strategy()
    }

    pub fn command(&self) -> &ImportSuffixCommand {
        &self.command
    }

    /// Returns `false` if `dn` was already pending.
    pub fn add_pending(&self, dn: &Dn) -> bool {
        self.pending.insert(dn.clone())
    }

    pub fn remove_pending(&self, dn: &Dn) {
        self.pending.remove(dn);
    }

    pub fn is_pending(&self, dn: &Dn) -> bool {
        self.pending.contains(dn)
    }

    /// Records that this import writes `dn`. Returns `false` if an earlier
    /// record of the same import already did.
    pub fn mark_imported(&self, dn: &Dn) -> bool {
        self.imported.insert(dn.clone())
    }

    /// Blocks while `dn` is pending. Returns `false` if `cancel` was raised.
    pub fn wait_while_pending(&self, dn: &Dn, cancel: &AtomicBool) -> bool {
        while self.is_pending(dn) {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            thread::sleep(PENDING_POLL);
        }
        true
    }

    /// Whether an entry already stored under this base DN survives the import.
    pub fn keeps_existing(&self, dn: &Dn) -> bool {
        let under = |branches: &[Dn]| branches.iter().any(|b| b.is_superior_or_equal_to(dn));
        match self.command.strategy() {
            SuffixImportStrategy::AppendOrReplace | SuffixImportStrategy::SkipSuffix => true,
            SuffixImportStrategy::ClearSuffix => false,
            SuffixImportStrategy::MergeDbWithLdif => {
                !under(self.command.include_branches()) || under(self.command.exclude_branches())
            }
            SuffixImportStrategy::IncludeExcludeBranches => under(self.command.exclude_branches()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root_container::EntryIdSequence;
    use dirstore_configs::IndexSettings;
    use dirstore_store::{InMemoryStorage, Storage};

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn suffix(include: &[&str], exclude: &[&str]) -> Suffix {
        let base = dn("dc=example,dc=com");
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let container = EntryContainer::new(
            base.clone(),
            storage,
            Arc::new(EntryIdSequence::default()),
            &IndexSettings::default(),
        );
        let include: Vec<Dn> = include.iter().map(|s| dn(s)).collect();
        let exclude: Vec<Dn> = exclude.iter().map(|s| dn(s)).collect();
        Suffix::new(
            Arc::new(container),
            ImportSuffixCommand::new(&base, &include, &exclude, false, false),
        )
    }

    #[test]
    fn test_pending() {
        let suffix = suffix(&[], &[]);
        let cn = dn("cn=a,dc=example,dc=com");
        assert!(suffix.add_pending(&cn));
        assert!(!suffix.add_pending(&cn));

        let cancel = AtomicBool::new(true);
        assert!(!suffix.wait_while_pending(&cn, &cancel));
        suffix.remove_pending(&cn);
        assert!(suffix.wait_while_pending(&cn, &cancel));
    }

    #[test]
    fn test_mark_imported_once() {
        let suffix = suffix(&[], &[]);
        let cn = dn("cn=a,dc=example,dc=com");
        assert!(suffix.mark_imported(&cn));
        assert!(!suffix.mark_imported(&cn));
        assert!(suffix.mark_imported(&dn("cn=b,dc=example,dc=com")));
    }

    #[test]
    fn test_keeps_existing() {
        let merge = suffix(&["ou=people,dc=example,dc=com"], &["ou=old,ou=people,dc=example,dc=com"]);
        assert_eq!(merge.strategy(), SuffixImportStrategy::MergeDbWithLdif);
        assert!(merge.keeps_existing(&dn("ou=groups,dc=example,dc=com")));
        assert!(!merge.keeps_existing(&dn("cn=a,ou=people,dc=example,dc=com")));
        assert!(merge.keeps_existing(&dn("cn=a,ou=old,ou=people,dc=example,dc=com")));

        let exclude = suffix(&[], &["ou=apps,dc=example,dc=com"]);
        assert!(exclude.keeps_existing(&dn("cn=x,ou=apps,dc=example,dc=com")));
        assert!(!exclude.keeps_existing(&dn("dc=example,dc=com")));
    }
}
