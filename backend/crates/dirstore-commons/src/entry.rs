//! Directory entries.

use crate::dn::Dn;
use crate::serialization::KSerializable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A directory entry: a DN and its attribute values.
///
/// Attribute names are stored lowercased; values keep their original form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    dn: Dn,
    attributes: BTreeMap<String, Vec<String>>,
}

impl Entry {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            attributes: BTreeMap::new(),
        }
    }

    pub fn dn(&self) -> &Dn {
        &self.dn
    }

    pub fn set_dn(&mut self, dn: Dn) {
        self.dn = dn;
    }

    /// Adds one value. Duplicate values (exact match) are ignored.
    pub fn add_attribute_value(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let values = self.attributes.entry(name.to_ascii_lowercase()).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&[String]> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove_attribute(&mut self, name: &str) -> Option<Vec<String>> {
        self.attributes.remove(&name.to_ascii_lowercase())
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    pub fn object_classes(&self) -> &[String] {
        self.attribute("objectclass").unwrap_or(&[])
    }
}

impl KSerializable for Entry {}
