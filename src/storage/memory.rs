//! In-process backend, newest record first.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::storage::{StorageError, StoreConfig, TelemetryRecord, TelemetryStore};

/// Records kept before the oldest ones are evicted.
pub const MEMORY_CAPACITY: usize = 10_000;

#[derive(Debug)]
pub struct MemoryStore {
    records: Mutex<VecDeque<TelemetryRecord>>,
    capacity: usize,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity,
        }
    }

    pub fn open(_config: &StoreConfig) -> Result<Box<dyn TelemetryStore>, StorageError> {
        Ok(Box::new(Self::new(MEMORY_CAPACITY)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<TelemetryRecord>>, StorageError> {
        self.records
            .lock()
            .map_err(|_| StorageError::Backend("memory store mutex poisoned".into()))
    }
}

impl TelemetryStore for MemoryStore {
    fn insert(&self, record: &TelemetryRecord) -> Result<(), StorageError> {
        let mut records = self.lock()?;
        records.push_front(record.clone());
        records.truncate(self.capacity);
        Ok(())
    }

    fn fetch_by_uuid(&self, uuid: &str) -> Result<TelemetryRecord, StorageError> {
        self.lock()?
            .iter()
            .find(|record| record.uuid == uuid)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(uuid.to_string()))
    }

    fn fetch_last(&self, limit: usize) -> Result<Vec<TelemetryRecord>, StorageError> {
        Ok(self.lock()?.iter().take(limit).cloned().collect())
    }
}
