//! Record store abstraction for the shared catalog record.
//!
//! The catalog lives in a single key/value record (a Kubernetes ConfigMap in
//! production) guarded by an opaque resource version. This module defines the
//! compare-and-swap contract every backend implements:
//!
//! - `read` returns the record's data together with its resource version
//! - `write_if` replaces the data only if the presented version is current
//!
//! A stale version is a normal outcome ([`WriteResult::Conflict`]), not an
//! error. The resource version is an opaque `String`; callers must never parse
//! it or compare it for ordering.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Default name of the catalog record.
pub const DEFAULT_RECORD_NAME: &str = "cray-product-catalog";

/// Default namespace of the catalog record.
pub const DEFAULT_RECORD_NAMESPACE: &str = "services";

/// Data held by a record: entry name to serialized entry.
pub type RecordData = BTreeMap<String, String>;

/// Identifies a record in the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Record name.
    pub name: String,
    /// Record namespace.
    pub namespace: String,
}

impl RecordKey {
    /// Creates a key from a name and namespace.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl Default for RecordKey {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_NAME, DEFAULT_RECORD_NAMESPACE)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A record snapshot and the resource version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedRecord {
    /// Record data. Empty when the record exists but holds no entries.
    pub data: RecordData,
    /// Opaque resource version token for the next conditional write.
    pub resource_version: String,
}

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteResult {
    /// Write succeeded.
    Success {
        /// The resource version after the write.
        resource_version: String,
    },
    /// The presented resource version was stale.
    Conflict {
        /// The current resource version, when the backend reports it.
        current_version: Option<String>,
    },
}

/// Compare-and-swap store for catalog records.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Reads a record and its resource version.
    ///
    /// Returns `Error::NotFound` if the record doesn't exist.
    async fn read(&self, key: &RecordKey) -> Result<VersionedRecord>;

    /// Replaces the record's data if `resource_version` is still current.
    ///
    /// Returns `WriteResult::Conflict` when it is not. Never returns an error
    /// for a version mismatch.
    async fn write_if(
        &self,
        key: &RecordKey,
        resource_version: &str,
        data: RecordData,
    ) -> Result<WriteResult>;
}

#[async_trait]
impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    async fn read(&self, key: &RecordKey) -> Result<VersionedRecord> {
        (**self).read(key).await
    }

    async fn write_if(
        &self,
        key: &RecordKey,
        resource_version: &str,
        data: RecordData,
    ) -> Result<WriteResult> {
        (**self).write_if(key, resource_version, data).await
    }
}

/// In-memory record store.
///
/// Thread-safe via `RwLock`. Resource versions are increasing integers
/// rendered as strings, like the Kubernetes API server.
#[derive(Debug, Default, Clone)]
pub struct MemoryRecordStore {
    records: Arc<RwLock<HashMap<RecordKey, StoredRecord>>>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    data: RecordData,
    version: u64,
}

impl MemoryRecordStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a record unconditionally, returning its new version.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn put(&self, key: &RecordKey, data: RecordData) -> Result<String> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let version = records.get(key).map_or(1, |r| r.version + 1);
        records.insert(key.clone(), StoredRecord { data, version });
        Ok(version.to_string())
    }

    /// Returns a copy of a record's data, if present.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn snapshot(&self, key: &RecordKey) -> Result<Option<RecordData>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(key).map(|r| r.data.clone()))
    }
}

fn poisoned() -> Error {
    Error::Internal {
        message: "lock poisoned".into(),
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn read(&self, key: &RecordKey) -> Result<VersionedRecord> {
        let records = self.records.read().map_err(|_| poisoned())?;
        records
            .get(key)
            .map(|r| VersionedRecord {
                data: r.data.clone(),
                resource_version: r.version.to_string(),
            })
            .ok_or_else(|| Error::NotFound(format!("record not found: {key}")))
    }

    async fn write_if(
        &self,
        key: &RecordKey,
        resource_version: &str,
        data: RecordData,
    ) -> Result<WriteResult> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let Some(current) = records.get_mut(key) else {
            return Err(Error::NotFound(format!("record not found: {key}")));
        };

        if current.version.to_string() != resource_version {
            return Ok(WriteResult::Conflict {
                current_version: Some(current.version.to_string()),
            });
        }

        current.version += 1;
        current.data = data;
        Ok(WriteResult::Success {
            resource_version: current.version.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: &str) -> RecordData {
        RecordData::from([(name.to_string(), value.to_string())])
    }

    #[tokio::test]
    async fn read_missing_record_is_not_found() {
        let store = MemoryRecordStore::new();
        let err = store
            .read(&RecordKey::default())
            .await
            .expect_err("should be missing");
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn write_with_current_version_succeeds() {
        let store = MemoryRecordStore::new();
        let key = RecordKey::default();
        store.put(&key, RecordData::new()).expect("seed");

        let record = store.read(&key).await.expect("read");
        assert!(record.data.is_empty());

        let result = store
            .write_if(&key, &record.resource_version, entry("sat", "{}"))
            .await
            .expect("write");
        assert!(matches!(result, WriteResult::Success { ref resource_version } if resource_version == "2"));

        let record = store.read(&key).await.expect("read");
        assert_eq!(record.data, entry("sat", "{}"));
    }

    #[tokio::test]
    async fn write_with_stale_version_conflicts() {
        let store = MemoryRecordStore::new();
        let key = RecordKey::new("catalog", "default");
        let first = store.put(&key, RecordData::new()).expect("seed");
        store.put(&key, entry("cos", "{}")).expect("bump");

        let result = store
            .write_if(&key, &first, entry("sat", "{}"))
            .await
            .expect("write");
        assert_eq!(
            result,
            WriteResult::Conflict {
                current_version: Some("2".into())
            }
        );
        assert_eq!(store.snapshot(&key).expect("snapshot"), Some(entry("cos", "{}")));
    }

    #[tokio::test]
    async fn write_to_missing_record_errors() {
        let store = MemoryRecordStore::new();
        let err = store
            .write_if(&RecordKey::default(), "1", RecordData::new())
            .await
            .expect_err("should be missing");
        assert!(err.is_not_found());
    }

    #[test]
    fn record_key_display_is_namespace_qualified() {
        assert_eq!(RecordKey::default().to_string(), "services/cray-product-catalog");
    }
}
