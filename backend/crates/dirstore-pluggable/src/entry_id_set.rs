//! Sets of entry IDs stored as index values.

use dirstore_commons::EntryId;
use std::fmt;

/// Size reported by an undefined set whose cardinality is unknown.
pub const UNKNOWN_SIZE: u64 = i64::MAX as u64;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Ids {
    /// Sorted, deduplicated
    Defined(Vec<EntryId>),
    /// Too many IDs to enumerate; `size` is approximate or [`UNKNOWN_SIZE`]
    Undefined { size: u64 },
}

/// The entries matching one index key.
///
/// A *defined* set lists its IDs. An *undefined* set means "more IDs than the
/// index keeps": callers must fall back to scanning. Both carry the key they
/// were read from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryIdSet {
    key: Vec<u8>,
    ids: Ids,
}

impl EntryIdSet {
    /// An empty defined set.
    pub fn empty(key: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            ids: Ids::Defined(Vec::new()),
        }
    }

    pub fn new_defined(key: impl Into<Vec<u8>>, ids: impl IntoIterator<Item = EntryId>) -> Self {
        let mut ids: Vec<EntryId> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self {
            key: key.into(),
            ids: Ids::Defined(ids),
        }
    }

    /// An undefined set of unknown size.
    pub fn undefined(key: impl Into<Vec<u8>>) -> Self {
        Self::undefined_with_size(key, UNKNOWN_SIZE)
    }

    pub fn undefined_with_size(key: impl Into<Vec<u8>>, size: u64) -> Self {
        Self {
            key: key.into(),
            ids: Ids::Undefined {
                size: size.min(UNKNOWN_SIZE),
            },
        }
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn set_key(&mut self, key: impl Into<Vec<u8>>) {
        self.key = key.into();
    }

    pub fn is_defined(&self) -> bool {
        matches!(self.ids, Ids::Defined(_))
    }

    /// Number of IDs; approximate for undefined sets.
    pub fn size(&self) -> u64 {
        match &self.ids {
            Ids::Defined(ids) => ids.len() as u64,
            Ids::Undefined { size } => *size,
        }
    }

    /// True only for a defined set with no IDs.
    pub fn is_empty(&self) -> bool {
        matches!(&self.ids, Ids::Defined(ids) if ids.is_empty())
    }

    /// The IDs of a defined set, `None` when undefined.
    pub fn ids(&self) -> Option<&[EntryId]> {
        match &self.ids {
            Ids::Defined(ids) => Some(ids),
            Ids::Undefined { .. } => None,
        }
    }

    /// Iterates the IDs of a defined set; yields nothing when undefined.
    pub fn iter(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.ids().unwrap_or(&[]).iter().copied()
    }

    /// An undefined set may contain anything.
    pub fn contains(&self, id: EntryId) -> bool {
        match &self.ids {
            Ids::Defined(ids) => ids.binary_search(&id).is_ok(),
            Ids::Undefined { .. } => true,
        }
    }

    /// Returns `true` if the set changed.
    pub fn add(&mut self, id: EntryId) -> bool {
        match &mut self.ids {
            Ids::Defined(ids) => match ids.binary_search(&id) {
                Ok(_) => false,
                Err(pos) => {
                    ids.insert(pos, id);
                    true
                }
            },
            Ids::Undefined { size } => {
                if *size < UNKNOWN_SIZE {
                    *size += 1;
                }
                true
            }
        }
    }

    /// Returns `true` if the set changed.
    pub fn remove(&mut self, id: EntryId) -> bool {
        match &mut self.ids {
            Ids::Defined(ids) => match ids.binary_search(&id) {
                Ok(pos) => {
                    ids.remove(pos);
                    true
                }
                Err(_) => false,
            },
            Ids::Undefined { size } => {
                if *size < UNKNOWN_SIZE {
                    *size = size.saturating_sub(1);
                }
                true
            }
        }
    }

    /// Union. Adding an undefined set makes this set undefined.
    pub fn add_all(&mut self, other: &EntryIdSet) {
        match (&mut self.ids, &other.ids) {
            (Ids::Defined(ids), Ids::Defined(others)) => {
                if others.is_empty() {
                    return;
                }
                let mut merged = Vec::with_capacity(ids.len() + others.len());
                let (mut i, mut j) = (0, 0);
                while i < ids.len() && j < others.len() {
                    match ids[i].cmp(&others[j]) {
                        std::cmp::Ordering::Less => {
                            merged.push(ids[i]);
                            i += 1;
                        }
                        std::cmp::Ordering::Greater => {
                            merged.push(others[j]);
                            j += 1;
                        }
                        std::cmp::Ordering::Equal => {
                            merged.push(ids[i]);
                            i += 1;
                            j += 1;
                        }
                    }
                }
                merged.extend_from_slice(&ids[i..]);
                merged.extend_from_slice(&others[j..]);
                *ids = merged;
            }
            (Ids::Defined(ids), Ids::Undefined { size }) => {
                let total = add_sizes(ids.len() as u64, *size);
                self.ids = Ids::Undefined { size: total };
            }
            (Ids::Undefined { size }, other_ids) => {
                let other_size = match other_ids {
                    Ids::Defined(others) => others.len() as u64,
                    Ids::Undefined { size } => *size,
                };
                *size = add_sizes(*size, other_size);
            }
        }
    }

    /// Difference. Removing an undefined set from a defined one is a no-op,
    /// since it is unknown which IDs it holds.
    pub fn remove_all(&mut self, other: &EntryIdSet) {
        match (&mut self.ids, &other.ids) {
            (Ids::Defined(ids), Ids::Defined(others)) => {
                ids.retain(|id| others.binary_search(id).is_err());
            }
            (Ids::Defined(_), Ids::Undefined { .. }) => {}
            (Ids::Undefined { size }, other_ids) => {
                if *size < UNKNOWN_SIZE {
                    if let Ids::Defined(others) = other_ids {
                        *size = size.saturating_sub(others.len() as u64);
                    }
                }
            }
        }
    }

    /// Intersection. Intersecting with an undefined set keeps this set.
    pub fn retain_all(&mut self, other: &EntryIdSet) {
        match (&mut self.ids, &other.ids) {
            (Ids::Defined(ids), Ids::Defined(others)) => {
                ids.retain(|id| others.binary_search(id).is_ok());
            }
            (_, Ids::Undefined { .. }) => {}
            (Ids::Undefined { .. }, Ids::Defined(others)) => {
                self.ids = Ids::Defined(others.clone());
            }
        }
    }

    /// Degrades to undefined, keeping the current size as approximation.
    pub fn to_undefined(&mut self) {
        let size = self.size();
        self.ids = Ids::Undefined { size };
    }
}

fn add_sizes(a: u64, b: u64) -> u64 {
    if a >= UNKNOWN_SIZE || b >= UNKNOWN_SIZE {
        UNKNOWN_SIZE
    } else {
        a.saturating_add(b).min(UNKNOWN_SIZE)
    }
}

impl fmt::Display for EntryIdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ids {
            Ids::Defined(ids) => {
                write!(f, "[#={}", ids.len())?;
                for (i, id) in ids.iter().enumerate() {
                    f.write_str(if i == 0 { " " } else { "," })?;
                    write!(f, "{}", id)?;
                }
                f.write_str("]")
            }
            Ids::Undefined { size } if *size >= UNKNOWN_SIZE => f.write_str("[NOT-INDEXED]"),
            Ids::Undefined { size } => write!(f, "[NOT-INDEXED #={}]", size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[u64]) -> EntryIdSet {
        EntryIdSet::new_defined(b"k".to_vec(), values.iter().map(|v| EntryId::new(*v)))
    }

    fn as_u64(set: &EntryIdSet) -> Vec<u64> {
        set.iter().map(|id| id.as_u64()).collect()
    }

    #[test]
    fn test_defined_set_is_sorted_and_unique() {
        let set = ids(&[5, 1, 3, 1]);
        assert_eq!(as_u64(&set), vec![1, 3, 5]);
        assert_eq!(set.size(), 3);
        assert!(set.contains(EntryId::new(3)));
        assert!(!set.contains(EntryId::new(2)));
    }

    #[test]
    fn test_add_remove() {
        let mut set = EntryIdSet::empty(b"k".to_vec());
        assert!(set.is_empty());
        assert!(set.add(EntryId::new(2)));
        assert!(!set.add(EntryId::new(2)));
        assert!(set.remove(EntryId::new(2)));
        assert!(!set.remove(EntryId::new(2)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_union_difference_intersection() {
        let mut set = ids(&[1, 3, 5]);
        set.add_all(&ids(&[2, 3, 6]));
        assert_eq!(as_u64(&set), vec![1, 2, 3, 5, 6]);
        set.remove_all(&ids(&[1, 6, 9]));
        assert_eq!(as_u64(&set), vec![2, 3, 5]);
        set.retain_all(&ids(&[3, 5, 7]));
        assert_eq!(as_u64(&set), vec![3, 5]);
    }

    #[test]
    fn test_undefined_absorbs_and_tracks_size() {
        let mut set = ids(&[1, 2]);
        set.add_all(&EntryIdSet::undefined_with_size(b"k".to_vec(), 10));
        assert!(!set.is_defined());
        assert_eq!(set.size(), 12);
        set.add(EntryId::new(99));
        assert_eq!(set.size(), 13);
        set.remove_all(&ids(&[1, 2, 3]));
        assert_eq!(set.size(), 10);
        assert!(set.contains(EntryId::new(12345)));
        assert_eq!(set.iter().count(), 0);
    }

    #[test]
    fn test_unknown_size_stays_unknown() {
        let mut set = EntryIdSet::undefined(b"k".to_vec());
        set.remove(EntryId::new(1));
        set.add(EntryId::new(1));
        assert_eq!(set.size(), UNKNOWN_SIZE);
        assert_eq!(set.to_string(), "[NOT-INDEXED]");
    }

    #[test]
    fn test_display() {
        assert_eq!(ids(&[1, 2]).to_string(), "[#=2 1,2]");
        assert_eq!(EntryIdSet::empty(b"k".to_vec()).to_string(), "[#=0]");
    }
}
