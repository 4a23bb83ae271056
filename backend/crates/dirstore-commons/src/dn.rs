//! Distinguished names.
//!
//! Only the parts of the DN model the storage layer relies on are provided:
//! parsing, a case-ignore normalized form, hierarchy tests, and the
//! normalized byte form of an RDN used to build tree keys.
//!
//! ## Normalized RDN bytes
//!
//! ```text
//! type '=' value [0x01 type '=' value]...
//! ```
//!
//! Bytes `0x00`, `0x01` and `0x02` inside a value are escaped as `0x02 <byte>`
//! so that `0x00` can be used as the RDN separator in DN keys and `0x01`
//! sorts after every descendant of a key.

use crate::errors::{CommonError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Separates RDNs inside a DN key.
pub const NORMALIZED_RDN_SEPARATOR: u8 = 0x00;
/// Separates AVAs inside a multi-valued RDN.
pub const NORMALIZED_AVA_SEPARATOR: u8 = 0x01;
/// Escape prefix for reserved bytes inside a normalized value.
pub const NORMALIZED_ESC_BYTE: u8 = 0x02;

/// A relative distinguished name: one or more attribute/value assertions.
#[derive(Debug, Clone)]
pub struct Rdn {
    /// Normalized (type, value) pairs sorted by type
    avas: Vec<(String, String)>,
    /// User-provided form, kept for display
    user: String,
}

impl Rdn {
    /// Creates a single-valued RDN.
    pub fn new(attribute_type: &str, value: &str) -> Result<Self> {
        let attribute_type = normalize_type(attribute_type)?;
        let user = format!("{}={}", attribute_type, escape_value(value));
        Ok(Self {
            avas: vec![(attribute_type, normalize_value(value))],
            user,
        })
    }

    /// Parses an RDN such as `cn=John Doe` or `cn=John+uid=jdoe`.
    pub fn parse(rdn: &str) -> Result<Self> {
        let trimmed = rdn.trim();
        if trimmed.is_empty() {
            return Err(CommonError::invalid_dn("empty RDN"));
        }

        let mut avas = Vec::new();
        for ava in split_unescaped(trimmed, '+') {
            let (attribute_type, value) = split_once_unescaped(ava, '=')
                .ok_or_else(|| CommonError::invalid_dn(format!("missing '=' in '{}'", ava)))?;
            let value = unescape_value(value.trim())?;
            avas.push((normalize_type(attribute_type)?, normalize_value(&value)));
        }
        avas.sort();

        Ok(Self {
            avas,
            user: trimmed.to_string(),
        })
    }

    /// Attribute type of the first AVA.
    pub fn attribute_type(&self) -> &str {
        &self.avas[0].0
    }

    /// Normalized value of the first AVA.
    pub fn value(&self) -> &str {
        &self.avas[0].1
    }

    /// Number of AVAs in this RDN.
    pub fn len(&self) -> usize {
        self.avas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.avas.is_empty()
    }

    /// Appends the normalized byte form of this RDN to `out`.
    pub fn to_normalized_bytes(&self, out: &mut Vec<u8>) {
        for (i, (attribute_type, value)) in self.avas.iter().enumerate() {
            if i > 0 {
                out.push(NORMALIZED_AVA_SEPARATOR);
            }
            out.extend_from_slice(attribute_type.as_bytes());
            out.push(b'=');
            for &b in value.as_bytes() {
                if b <= NORMALIZED_ESC_BYTE {
                    out.push(NORMALIZED_ESC_BYTE);
                }
                out.push(b);
            }
        }
    }

    /// Normalized string form, e.g. `cn=john doe`.
    pub fn to_normalized_string(&self) -> String {
        self.avas
            .iter()
            .map(|(t, v)| format!("{}={}", t, escape_value(v)))
            .collect::<Vec<_>>()
            .join("+")
    }
}

impl PartialEq for Rdn {
    fn eq(&self, other: &Self) -> bool {
        self.avas == other.avas
    }
}

impl Eq for Rdn {}

impl Hash for Rdn {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.avas.hash(state);
    }
}

impl PartialOrd for Rdn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Rdn {
    fn cmp(&self, other: &Self) -> Ordering {
        self.avas.cmp(&other.avas)
    }
}

impl fmt::Display for Rdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user)
    }
}

/// A distinguished name. `rdns[0]` is the leaf RDN, the last one is closest
/// to the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Dn {
    rdns: Vec<Rdn>,
}

impl Dn {
    /// The root DN (zero RDNs).
    pub fn root() -> Self {
        Self { rdns: Vec::new() }
    }

    /// Parses a string DN. The empty string is the root DN.
    pub fn parse(dn: &str) -> Result<Self> {
        let trimmed = dn.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        let rdns = split_unescaped(trimmed, ',')
            .into_iter()
            .map(Rdn::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rdns })
    }

    pub fn is_root(&self) -> bool {
        self.rdns.is_empty()
    }

    /// Number of RDNs.
    pub fn size(&self) -> usize {
        self.rdns.len()
    }

    /// RDN at `index`, where 0 is the leaf.
    pub fn rdn_at(&self, index: usize) -> Option<&Rdn> {
        self.rdns.get(index)
    }

    /// The leaf RDN.
    pub fn rdn(&self) -> Option<&Rdn> {
        self.rdns.first()
    }

    pub fn rdns(&self) -> &[Rdn] {
        &self.rdns
    }

    /// Immediate superior, or `None` for the root DN.
    pub fn parent(&self) -> Option<Dn> {
        if self.rdns.is_empty() {
            None
        } else {
            Some(Self {
                rdns: self.rdns[1..].to_vec(),
            })
        }
    }

    /// Returns the DN of the child named `rdn`.
    pub fn child(&self, rdn: Rdn) -> Dn {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(rdn);
        rdns.extend(self.rdns.iter().cloned());
        Self { rdns }
    }

    /// True if `self` equals `other` or is one of its ancestors.
    pub fn is_superior_or_equal_to(&self, other: &Dn) -> bool {
        if other.rdns.len() < self.rdns.len() {
            return false;
        }
        let offset = other.rdns.len() - self.rdns.len();
        other.rdns[offset..] == self.rdns[..]
    }

    /// True if `self` equals `other` or is one of its descendants.
    pub fn is_subordinate_or_equal_to(&self, other: &Dn) -> bool {
        other.is_superior_or_equal_to(self)
    }

    /// Iterates over this DN and each of its ancestors, ending with the root.
    pub fn self_and_ancestors(&self) -> impl Iterator<Item = Dn> {
        std::iter::successors(Some(self.clone()), |dn| dn.parent())
    }

    /// Case-ignore normalized string form.
    pub fn to_normalized_string(&self) -> String {
        self.rdns
            .iter()
            .map(Rdn::to_normalized_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialOrd for Dn {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Dn {
    /// Hierarchical order: RDNs are compared from the root down, so a DN sorts
    /// before all of its descendants.
    fn cmp(&self, other: &Self) -> Ordering {
        self.rdns.iter().rev().cmp(other.rdns.iter().rev())
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rdn) in self.rdns.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", rdn)?;
        }
        Ok(())
    }
}

impl std::str::FromStr for Dn {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self> {
        Dn::parse(s)
    }
}

impl Serialize for Dn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Dn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Dn::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn normalize_type(attribute_type: &str) -> Result<String> {
    let t = attribute_type.trim();
    if t.is_empty() {
        return Err(CommonError::invalid_dn("empty attribute type"));
    }
    Ok(t.to_ascii_lowercase())
}

/// Case-ignore normalization: trim, collapse inner whitespace, lowercase.
fn normalize_value(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for (i, c) in value.chars().enumerate() {
        let leading = i == 0 && (c == '#' || c == ' ');
        if leading || matches!(c, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn unescape_value(value: &str) -> Result<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'\\' {
            out.push(bytes[i]);
            i += 1;
            continue;
        }
        let rest = &bytes[i + 1..];
        match rest {
            [h, l, ..] if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {
                let hex = [*h, *l];
                let hex = std::str::from_utf8(&hex)
                    .map_err(|e| CommonError::invalid_dn(e.to_string()))?;
                let byte = u8::from_str_radix(hex, 16)
                    .map_err(|e| CommonError::invalid_dn(e.to_string()))?;
                out.push(byte);
                i += 3;
            }
            [c, ..] => {
                out.push(*c);
                i += 2;
            }
            [] => return Err(CommonError::invalid_dn("trailing escape character")),
        }
    }
    String::from_utf8(out).map_err(|e| CommonError::invalid_dn(e.to_string()))
}

fn split_unescaped(s: &str, separator: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            parts.push(&s[start..i]);
            start = i + c.len_utf8();
        }
    }
    parts.push(&s[start..]);
    parts
}

fn split_once_unescaped(s: &str, separator: char) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == separator {
            return Some((&s[..i], &s[i + c.len_utf8()..]));
        }
    }
    None
}
