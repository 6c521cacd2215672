//! Product entries of the catalog record.
//!
//! Each record entry is a YAML string encoding a mapping from version to that
//! version's data. [`ProductDocument`] is the decoded form, with versions kept
//! in sorted order so re-encoding is deterministic.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use prodcat_core::document::{canonicalize, key_to_string};
use prodcat_core::error::{Error, Result};

use crate::config::ActiveMode;

/// Key of the active flag within version data.
pub const ACTIVE_KEY: &str = "active";

/// Decoded product entry: version → version data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductDocument {
    versions: BTreeMap<String, Mapping>,
}

impl ProductDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a serialized product entry.
    ///
    /// An empty entry decodes as an empty document, and a version with no
    /// data (`1.0.0:`) decodes as an empty mapping.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the entry is not a YAML mapping of
    /// scalar version keys to mappings.
    pub fn decode(raw: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(raw)
            .map_err(|e| Error::serialization(format!("invalid product entry: {e}")))?;

        let mapping = match value {
            Value::Null => return Ok(Self::new()),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(Error::serialization(format!(
                    "product entry must be a mapping, got {}",
                    prodcat_core::ValueKind::of(&other)
                )));
            }
        };

        let mut versions = BTreeMap::new();
        for (key, data) in mapping {
            let version = key_to_string(&key).ok_or_else(|| {
                Error::serialization("product entry has a non-scalar version key")
            })?;
            let data = match data {
                Value::Null => Mapping::new(),
                Value::Mapping(data) => data,
                other => {
                    return Err(Error::serialization(format!(
                        "data for version {version} must be a mapping, got {}",
                        prodcat_core::ValueKind::of(&other)
                    )));
                }
            };
            versions.insert(version, data);
        }
        Ok(Self { versions })
    }

    /// Encodes the document as YAML with sorted keys at every level.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if YAML encoding fails.
    pub fn encode(&self) -> Result<String> {
        let mapping: Mapping = self
            .versions
            .iter()
            .map(|(version, data)| {
                (
                    Value::String(version.clone()),
                    canonicalize(&Value::Mapping(data.clone())),
                )
            })
            .collect();
        serde_yaml::to_string(&Value::Mapping(mapping)).map_err(Error::serialization)
    }

    /// Returns the data of a version.
    #[must_use]
    pub fn version(&self, version: &str) -> Option<&Mapping> {
        self.versions.get(version)
    }

    /// Returns true if the version is present.
    #[must_use]
    pub fn contains(&self, version: &str) -> bool {
        self.versions.contains_key(version)
    }

    /// Inserts or replaces a version's data.
    pub fn insert(&mut self, version: impl Into<String>, data: Mapping) {
        self.versions.insert(version.into(), data);
    }

    /// Iterates versions in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Mapping)> {
        self.versions.iter().map(|(v, d)| (v.as_str(), d))
    }

    /// Number of versions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Returns true if there are no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Marks `version` active and every other version inactive.
    pub fn set_active(&mut self, version: &str) {
        for (name, data) in &mut self.versions {
            data.insert(ACTIVE_KEY.into(), Value::Bool(name == version));
        }
    }

    /// Removes the active flag from every version.
    pub fn clear_active(&mut self) {
        for data in self.versions.values_mut() {
            data.remove(ACTIVE_KEY);
        }
    }

    /// Returns true if `version` is active and no other version is.
    #[must_use]
    pub fn is_only_active(&self, version: &str) -> bool {
        self.versions
            .iter()
            .all(|(name, data)| is_active(data) == (name == version))
    }

    /// Returns true if no version carries an active flag.
    #[must_use]
    pub fn has_no_active_field(&self) -> bool {
        !self
            .versions
            .values()
            .any(|data| data.contains_key(ACTIVE_KEY))
    }

    /// Returns true if the active-flag state already matches `mode`.
    #[must_use]
    pub fn active_state_satisfied(&self, version: &str, mode: ActiveMode) -> bool {
        match mode {
            ActiveMode::Unchanged => true,
            ActiveMode::Set => self.is_only_active(version),
            ActiveMode::Clear => self.has_no_active_field(),
        }
    }
}

fn is_active(data: &Mapping) -> bool {
    matches!(data.get(ACTIVE_KEY), Some(Value::Bool(true)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAT: &str = "1.0.0:\n  active: true\n2.0.0:\n  component_versions:\n    docker: []\n";

    #[test]
    fn decode_and_encode_sorted() {
        let doc = ProductDocument::decode("2.0.0: {b: 1, a: 2}\n1.0.0: {}\n").expect("decode");
        assert_eq!(doc.len(), 2);
        assert_eq!(
            doc.encode().expect("encode"),
            "1.0.0: {}\n2.0.0:\n  a: 2\n  b: 1\n"
        );
    }

    #[test]
    fn decode_empty_entry() {
        assert!(ProductDocument::decode("").expect("decode").is_empty());
    }

    #[test]
    fn decode_null_version_data_as_empty_mapping() {
        let doc = ProductDocument::decode("1.0.0:\n").expect("decode");
        assert_eq!(doc.version("1.0.0"), Some(&Mapping::new()));
    }

    #[test]
    fn decode_numeric_version_keys() {
        let doc = ProductDocument::decode("1.5: {}\n").expect("decode");
        assert!(doc.contains("1.5"));
    }

    #[test]
    fn decode_rejects_non_mapping_versions() {
        assert!(ProductDocument::decode("1.0.0: [a]\n").is_err());
        assert!(ProductDocument::decode("- 1.0.0\n").is_err());
    }

    #[test]
    fn set_active_is_exclusive() {
        let mut doc = ProductDocument::decode(SAT).expect("decode");
        assert!(doc.is_only_active("1.0.0"));
        assert!(!doc.is_only_active("2.0.0"));

        doc.set_active("2.0.0");
        assert!(doc.is_only_active("2.0.0"));
        assert_eq!(
            doc.version("1.0.0").and_then(|d| d.get(ACTIVE_KEY)),
            Some(&Value::Bool(false))
        );
    }

    #[test]
    fn clear_active_removes_every_flag() {
        let mut doc = ProductDocument::decode(SAT).expect("decode");
        assert!(!doc.has_no_active_field());
        doc.clear_active();
        assert!(doc.has_no_active_field());
        assert!(doc.active_state_satisfied("2.0.0", ActiveMode::Clear));
    }

    #[test]
    fn unchanged_mode_always_satisfied() {
        let doc = ProductDocument::decode(SAT).expect("decode");
        assert!(doc.active_state_satisfied("9.9.9", ActiveMode::Unchanged));
    }
}
