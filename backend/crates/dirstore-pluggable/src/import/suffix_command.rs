//! Decides how the import treats each base DN.

use dirstore_commons::Dn;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuffixImportStrategy {
    /// Import into the existing content
    AppendOrReplace,
    /// Leave the base DN alone
    SkipSuffix,
    /// Empty the base DN, then import
    ClearSuffix,
    /// Replace the include branches, keep the rest of the existing content
    MergeDbWithLdif,
    /// Replace everything except the exclude branches
    IncludeExcludeBranches,
}

impl fmt::Display for SuffixImportStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SuffixImportStrategy::AppendOrReplace => "append-or-replace",
            SuffixImportStrategy::SkipSuffix => "skip",
            SuffixImportStrategy::ClearSuffix => "clear",
            SuffixImportStrategy::MergeDbWithLdif => "merge-db-with-ldif",
            SuffixImportStrategy::IncludeExcludeBranches => "include-exclude-branches",
        };
        f.write_str(name)
    }
}

/// Strategy of one base DN, with the include/exclude branches reduced to
/// the ones that matter inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSuffixCommand {
    base_dn: Dn,
    include_branches: Vec<Dn>,
    exclude_branches: Vec<Dn>,
    strategy: SuffixImportStrategy,
}

impl ImportSuffixCommand {
    pub fn new(
        base_dn: &Dn,
        include_branches: &[Dn],
        exclude_branches: &[Dn],
        append: bool,
        clear_backend: bool,
    ) -> Self {
        let command = |strategy, include_branches, exclude_branches| Self {
            base_dn: base_dn.clone(),
            include_branches,
            exclude_branches,
            strategy,
        };

        if append || clear_backend {
            return command(SuffixImportStrategy::AppendOrReplace, Vec::new(), Vec::new());
        }
        if exclude_branches.contains(base_dn) {
            return command(SuffixImportStrategy::SkipSuffix, Vec::new(), Vec::new());
        }

        let excludes_in_base: Vec<Dn> = descendants_of(base_dn, exclude_branches);
        if !include_branches.is_empty() {
            let includes_in_base = descendants_of(base_dn, include_branches);
            if includes_in_base.is_empty() {
                return command(SuffixImportStrategy::SkipSuffix, Vec::new(), Vec::new());
            }
            let includes: Vec<Dn> = includes_in_base
                .iter()
                .filter(|include| {
                    !includes_in_base
                        .iter()
                        .any(|other| other != *include && other.is_superior_or_equal_to(include))
                })
                .cloned()
                .collect();
            let excludes: Vec<Dn> = excludes_in_base
                .into_iter()
                .filter(|exclude| includes.iter().any(|i| i.is_superior_or_equal_to(exclude)))
                .collect();

            if excludes.is_empty() && includes.len() == 1 && includes[0] == *base_dn {
                return command(SuffixImportStrategy::ClearSuffix, includes, excludes);
            }
            return command(SuffixImportStrategy::MergeDbWithLdif, includes, excludes);
        }

        if !excludes_in_base.is_empty() {
            return command(SuffixImportStrategy::IncludeExcludeBranches, Vec::new(), excludes_in_base);
        }
        command(SuffixImportStrategy::AppendOrReplace, Vec::new(), Vec::new())
    }

    pub fn base_dn(&self) -> &Dn {
        &self.base_dn
    }

    pub fn strategy(&self) -> SuffixImportStrategy {
        self.strategy
    }

    pub fn include_branches(&self) -> &[Dn] {
        &self.include_branches
    }

    pub fn exclude_branches(&self) -> &[Dn] {
        &self.exclude_branches
    }
}

/// Branches at or below `base`, deduplicated, in hierarchical order.
fn descendants_of(base: &Dn, branches: &[Dn]) -> Vec<Dn> {
    let mut found: Vec<Dn> = branches
        .iter()
        .filter(|branch| base.is_superior_or_equal_to(branch))
        .cloned()
        .collect();
    found.sort();
    found.dedup();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn dns(list: &[&str]) -> Vec<Dn> {
        list.iter().map(|s| dn(s)).collect()
    }

    fn decide(include: &[&str], exclude: &[&str]) -> ImportSuffixCommand {
        ImportSuffixCommand::new(&dn("dc=example,dc=com"), &dns(include), &dns(exclude), false, false)
    }

    #[test]
    fn test_append_and_clear_win() {
        let base = dn("dc=example,dc=com");
        let exclude = dns(&["dc=example,dc=com"]);
        let cmd = ImportSuffixCommand::new(&base, &[], &exclude, true, false);
        assert_eq!(cmd.strategy(), SuffixImportStrategy::AppendOrReplace);
        let cmd = ImportSuffixCommand::new(&base, &[], &exclude, false, true);
        assert_eq!(cmd.strategy(), SuffixImportStrategy::AppendOrReplace);
    }

    #[test]
    fn test_excluded_base_is_skipped() {
        assert_eq!(
            decide(&[], &["dc=example,dc=com"]).strategy(),
            SuffixImportStrategy::SkipSuffix
        );
    }

    #[test]
    fn test_includes_outside_base_skip() {
        assert_eq!(decide(&["dc=other,dc=com"], &[]).strategy(), SuffixImportStrategy::SkipSuffix);
    }

    #[test]
    fn test_single_base_include_clears() {
        let cmd = decide(&["dc=example,dc=com", "ou=people,dc=example,dc=com"], &[]);
        assert_eq!(cmd.strategy(), SuffixImportStrategy::ClearSuffix);
        assert_eq!(cmd.include_branches(), &dns(&["dc=example,dc=com"])[..]);
    }

    #[test]
    fn test_nested_includes_are_merged() {
        let cmd = decide(
            &[
                "ou=people,dc=example,dc=com",
                "cn=x,ou=people,dc=example,dc=com",
                "ou=groups,dc=example,dc=com",
            ],
            &["ou=old,ou=people,dc=example,dc=com", "ou=apps,dc=example,dc=com"],
        );
        assert_eq!(cmd.strategy(), SuffixImportStrategy::MergeDbWithLdif);
        assert_eq!(
            cmd.include_branches(),
            &dns(&["ou=groups,dc=example,dc=com", "ou=people,dc=example,dc=com"])[..]
        );
        assert_eq!(cmd.exclude_branches(), &dns(&["ou=old,ou=people,dc=example,dc=com"])[..]);
    }

    #[test]
    fn test_excludes_only() {
        let cmd = decide(&[], &["ou=apps,dc=example,dc=com", "dc=other,dc=com"]);
        assert_eq!(cmd.strategy(), SuffixImportStrategy::IncludeExcludeBranches);
        assert_eq!(cmd.exclude_branches(), &dns(&["ou=apps,dc=example,dc=com"])[..]);
    }

    #[test]
    fn test_nothing_configured() {
        assert_eq!(decide(&[], &[]).strategy(), SuffixImportStrategy::AppendOrReplace);
    }
}
