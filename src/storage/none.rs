//! Backend that accepts writes and stores nothing.

use crate::storage::{StorageError, StoreConfig, TelemetryRecord, TelemetryStore};

#[derive(Debug, Default)]
pub struct NoneStore;

impl NoneStore {
    pub fn open(_config: &StoreConfig) -> Result<Box<dyn TelemetryStore>, StorageError> {
        Ok(Box::new(NoneStore))
    }
}

impl TelemetryStore for NoneStore {
    fn insert(&self, _record: &TelemetryRecord) -> Result<(), StorageError> {
        Ok(())
    }

    fn fetch_by_uuid(&self, _uuid: &str) -> Result<TelemetryRecord, StorageError> {
        Ok(TelemetryRecord::default())
    }

    fn fetch_last(&self, _limit: usize) -> Result<Vec<TelemetryRecord>, StorageError> {
        Ok(Vec::new())
    }
}
