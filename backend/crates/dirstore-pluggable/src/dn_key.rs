//! DN key format used by dn2id.
//!
//! A key lists the RDNs below the base DN from the top down, each preceded by
//! the RDN separator:
//!
//! ```text
//! dn:  cn=john,ou=people,dc=example,dc=com      base: dc=example,dc=com
//! key: 0x00 "ou=people" 0x00 "cn=john"
//! ```
//!
//! An entry's key is a prefix of all its descendants' keys, and every child
//! key sorts between `before_first_child_of(parent)` and
//! `after_last_child_of(parent)`.

use dirstore_commons::dn::{NORMALIZED_ESC_BYTE, NORMALIZED_RDN_SEPARATOR};
use dirstore_commons::Dn;

/// Sorts after every key that extends the current one with a child RDN.
const AFTER_LAST_CHILD: u8 = NORMALIZED_RDN_SEPARATOR + 1;

/// Encodes `dn` relative to a base DN made of `prefix_rdns` RDNs.
/// The base DN itself encodes to the empty key.
pub fn dn_to_dn_key(dn: &Dn, prefix_rdns: usize) -> Vec<u8> {
    let mut key = Vec::new();
    for i in (0..dn.size().saturating_sub(prefix_rdns)).rev() {
        if let Some(rdn) = dn.rdn_at(i) {
            key.push(NORMALIZED_RDN_SEPARATOR);
            rdn.to_normalized_bytes(&mut key);
        }
    }
    key
}

/// Smallest key that can belong to a child of `key`.
pub fn before_first_child_of(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(NORMALIZED_RDN_SEPARATOR);
    out
}

/// Key sorting after every descendant of `key`.
pub fn after_last_child_of(key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 1);
    out.extend_from_slice(key);
    out.push(AFTER_LAST_CHILD);
    out
}

/// True when `child` starts with `parent` and has exactly one RDN separator
/// past the parent's length. A key is never its own child.
pub fn is_child(parent: &[u8], child: &[u8]) -> bool {
    if child.len() <= parent.len() || !child.starts_with(parent) {
        return false;
    }
    let mut separators = 0;
    let mut i = parent.len();
    while i < child.len() {
        match child[i] {
            NORMALIZED_ESC_BYTE => i += 1,
            NORMALIZED_RDN_SEPARATOR => {
                separators += 1;
                if separators > 1 {
                    return false;
                }
            }
            _ => {}
        }
        i += 1;
    }
    separators == 1
}
