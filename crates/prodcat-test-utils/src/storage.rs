//! Test record store with operation tracing and fault injection.
//!
//! Wraps [`MemoryRecordStore`] and records every operation so tests can
//! assert how many reads and writes a reconcile performed. Faults are queued
//! ahead of time and consumed by the next matching operation.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use prodcat_core::error::{Error, Result};
use prodcat_core::store::{
    MemoryRecordStore, RecordData, RecordKey, RecordStore, VersionedRecord, WriteResult,
};

/// Record of a store operation for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// Read operation.
    Read {
        /// Record that was read.
        key: RecordKey,
    },
    /// Conditional write operation.
    WriteIf {
        /// Record that was written.
        key: RecordKey,
        /// Resource version presented.
        resource_version: String,
        /// Data submitted.
        data: RecordData,
    },
}

/// Failure returned by an injected read fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFault {
    /// The record appears not to exist.
    NotFound,
    /// A store-level error.
    Storage,
}

type WriteHook = Box<dyn FnOnce(&mut RecordData) + Send>;

#[derive(Default)]
struct Faults {
    reads: VecDeque<ReadFault>,
    failing_writes: u32,
    concurrent_writes: VecDeque<WriteHook>,
}

/// In-memory record store with operation tracing.
#[derive(Clone, Default)]
pub struct TracingRecordStore {
    inner: MemoryRecordStore,
    operations: Arc<Mutex<Vec<StoreOp>>>,
    faults: Arc<Mutex<Faults>>,
}

impl std::fmt::Debug for TracingRecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracingRecordStore")
            .field("inner", &self.inner)
            .field("operations", &self.operations.lock().expect("lock").len())
            .finish_non_exhaustive()
    }
}

impl TracingRecordStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a record without recording an operation.
    pub fn seed(&self, key: &RecordKey, data: RecordData) -> String {
        self.inner.put(key, data).expect("seed record")
    }

    /// Returns a record's current data.
    #[must_use]
    pub fn snapshot(&self, key: &RecordKey) -> Option<RecordData> {
        self.inner.snapshot(key).expect("snapshot record")
    }

    /// Returns all recorded operations.
    #[must_use]
    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations.lock().expect("lock").clone()
    }

    /// Number of reads attempted.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.count(|op| matches!(op, StoreOp::Read { .. }))
    }

    /// Number of conditional writes attempted.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.count(|op| matches!(op, StoreOp::WriteIf { .. }))
    }

    /// Clears recorded operations.
    pub fn clear_operations(&self) {
        self.operations.lock().expect("lock").clear();
    }

    /// Fails the next `count` reads with `fault`.
    pub fn fail_reads(&self, count: usize, fault: ReadFault) {
        let mut faults = self.faults.lock().expect("lock");
        faults.reads.extend(std::iter::repeat_n(fault, count));
    }

    /// Fails the next `count` writes with a storage error.
    pub fn fail_writes(&self, count: u32) {
        self.faults.lock().expect("lock").failing_writes += count;
    }

    /// Simulates another writer modifying the record between the next read
    /// and write.
    ///
    /// The hook edits the record and bumps its resource version, so the next
    /// conditional write conflicts.
    pub fn inject_concurrent_write(&self, hook: impl FnOnce(&mut RecordData) + Send + 'static) {
        self.faults
            .lock()
            .expect("lock")
            .concurrent_writes
            .push_back(Box::new(hook));
    }

    fn count(&self, predicate: impl Fn(&StoreOp) -> bool) -> usize {
        self.operations
            .lock()
            .expect("lock")
            .iter()
            .filter(|op| predicate(op))
            .count()
    }

    fn record(&self, op: StoreOp) {
        self.operations.lock().expect("lock").push(op);
    }
}

#[async_trait::async_trait]
impl RecordStore for TracingRecordStore {
    async fn read(&self, key: &RecordKey) -> Result<VersionedRecord> {
        self.record(StoreOp::Read { key: key.clone() });

        let fault = self.faults.lock().expect("lock").reads.pop_front();
        match fault {
            Some(ReadFault::NotFound) => {
                Err(Error::NotFound(format!("injected: record not found: {key}")))
            }
            Some(ReadFault::Storage) => Err(Error::storage(format!("injected read failure: {key}"))),
            None => self.inner.read(key).await,
        }
    }

    async fn write_if(
        &self,
        key: &RecordKey,
        resource_version: &str,
        data: RecordData,
    ) -> Result<WriteResult> {
        self.record(StoreOp::WriteIf {
            key: key.clone(),
            resource_version: resource_version.to_string(),
            data: data.clone(),
        });

        let (fail, hook) = {
            let mut faults = self.faults.lock().expect("lock");
            let fail = faults.failing_writes > 0;
            if fail {
                faults.failing_writes -= 1;
            }
            (fail, faults.concurrent_writes.pop_front())
        };

        if fail {
            return Err(Error::storage(format!("injected write failure: {key}")));
        }

        if let Some(hook) = hook {
            let mut current = self.inner.snapshot(key)?.unwrap_or_default();
            hook(&mut current);
            self.inner.put(key, current)?;
        }

        self.inner.write_if(key, resource_version, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_operations() {
        let store = TracingRecordStore::new();
        let key = RecordKey::default();
        let version = store.seed(&key, RecordData::new());

        store.read(&key).await.expect("read");
        store
            .write_if(&key, &version, RecordData::new())
            .await
            .expect("write");

        assert_eq!(store.read_count(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn injected_read_faults_are_consumed_in_order() {
        let store = TracingRecordStore::new();
        let key = RecordKey::default();
        store.seed(&key, RecordData::new());
        store.fail_reads(1, ReadFault::NotFound);
        store.fail_reads(1, ReadFault::Storage);

        assert!(store.read(&key).await.expect_err("first").is_not_found());
        let err = store.read(&key).await.expect_err("second");
        assert!(!err.is_not_found());
        store.read(&key).await.expect("third");
    }

    #[tokio::test]
    async fn concurrent_write_causes_conflict() {
        let store = TracingRecordStore::new();
        let key = RecordKey::default();
        let version = store.seed(&key, RecordData::new());
        store.inject_concurrent_write(|data| {
            data.insert("cos".into(), "1.0.0: {}\n".into());
        });

        let result = store
            .write_if(&key, &version, RecordData::new())
            .await
            .expect("write");
        assert!(matches!(result, WriteResult::Conflict { .. }));
        assert!(store.snapshot(&key).expect("record").contains_key("cos"));
    }

    #[tokio::test]
    async fn injected_write_failure() {
        let store = TracingRecordStore::new();
        let key = RecordKey::default();
        let version = store.seed(&key, RecordData::new());
        store.fail_writes(1);

        assert!(store.write_if(&key, &version, RecordData::new()).await.is_err());
        store
            .write_if(&key, &version, RecordData::new())
            .await
            .expect("second write succeeds");
    }
}
