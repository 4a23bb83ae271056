//! Names of ordered key-value trees.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one tree inside a storage: the normalized base DN of the
/// entry container that owns it plus an index identifier such as `dn2id`,
/// `id2entry` or `cn.equality`.
///
/// Ordering is by base DN and then by index id, which is also the order
/// in which buffered index changes are flushed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeName {
    base_dn: String,
    index_id: String,
}

impl TreeName {
    pub fn new(base_dn: impl Into<String>, index_id: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            index_id: index_id.into(),
        }
    }

    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    /// Name used by the physical store, `<base dn>/<index id>`.
    pub fn storage_name(&self) -> String {
        format!("{}/{}", self.base_dn, self.index_id)
    }

    /// Inverse of [`TreeName::storage_name`]. The index id never contains a
    /// `/`, so the split happens on the last one.
    pub fn from_storage_name(name: &str) -> Option<Self> {
        name.rsplit_once('/')
            .map(|(base_dn, index_id)| Self::new(base_dn, index_id))
    }

    /// Sibling tree in the same container.
    pub fn with_index_id(&self, index_id: impl Into<String>) -> Self {
        Self::new(self.base_dn.clone(), index_id)
    }
}

impl fmt::Display for TreeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base_dn, self.index_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_name_round_trip() {
        let name = TreeName::new("ou=a/b,dc=example", "cn.equality");
        let parsed = TreeName::from_storage_name(&name.storage_name()).unwrap();
        assert_eq!(parsed, name);
        assert!(TreeName::from_storage_name("no-separator").is_none());
    }

    #[test]
    fn test_ordering_groups_by_base_dn() {
        let a = TreeName::new("dc=a", "id2entry");
        let b = TreeName::new("dc=a", "dn2id");
        let c = TreeName::new("dc=b", "dn2id");
        let mut names = vec![c.clone(), a.clone(), b.clone()];
        names.sort();
        assert_eq!(names, vec![b, a, c]);
    }
}
