//! Telemetry storage subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     database_type → registry.rs → Box<dyn TelemetryStore>
//!
//! POST /results/telemetry → TelemetryStore::insert
//! /stats?id=L100          → TelemetryStore::fetch_last(100)
//! /stats?id=<uuid>        → TelemetryStore::fetch_by_uuid
//! ```
//!
//! # Design Decisions
//! - Backends are blocking; handlers call them on the blocking pool
//! - Adding a backend means adding one registry entry
//! - Failures are reported once, never retried

pub mod memory;
pub mod none;
pub mod record;
pub mod registry;

use std::sync::Arc;

use thiserror::Error;

use crate::config::SpeedtestConfig;

pub use record::TelemetryRecord;

/// Number of records shown by the stats viewer's "last results" page.
pub const LAST_RESULTS: usize = 100;

/// Errors surfaced by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("unsupported database type: {0}")]
    UnknownBackend(String),

    #[error("database type {0} is not compiled into this build")]
    NotCompiledIn(String),

    #[error("no record with id {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Connection settings handed to backend constructors.
#[derive(Debug, Clone, Default)]
pub struct StoreConfig {
    pub file: String,
    pub hostname: String,
    pub username: String,
    pub password: String,
    pub database: String,
}

impl From<&SpeedtestConfig> for StoreConfig {
    fn from(config: &SpeedtestConfig) -> Self {
        Self {
            file: config.database_file.clone(),
            hostname: config.database_hostname.clone(),
            username: config.database_username.clone(),
            password: config.database_password.clone(),
            database: config.database_name.clone(),
        }
    }
}

/// Capability interface every storage backend implements.
pub trait TelemetryStore: Send + Sync {
    fn insert(&self, record: &TelemetryRecord) -> Result<(), StorageError>;

    fn fetch_by_uuid(&self, uuid: &str) -> Result<TelemetryRecord, StorageError>;

    /// Up to `limit` records, most recent first.
    fn fetch_last(&self, limit: usize) -> Result<Vec<TelemetryRecord>, StorageError>;
}

/// Shared handle stored in the application state.
pub type SharedStore = Arc<dyn TelemetryStore>;

/// Open the backend selected by the configuration.
pub fn open_store(config: &SpeedtestConfig) -> Result<SharedStore, StorageError> {
    registry::open(&config.database_type, &StoreConfig::from(config)).map(Arc::from)
}
