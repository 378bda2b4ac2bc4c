//! Startup-time mapping from `database_type` names to backend constructors.

use crate::storage::memory::MemoryStore;
use crate::storage::none::NoneStore;
use crate::storage::{StorageError, StoreConfig, TelemetryStore};

type Opener = fn(&StoreConfig) -> Result<Box<dyn TelemetryStore>, StorageError>;

/// Backends compiled into this binary.
const OPENERS: &[(&str, Opener)] = &[("memory", MemoryStore::open), ("none", NoneStore::open)];

/// Names that are recognised but whose drivers are not part of this build.
const EXTERNAL: &[&str] = &["postgresql", "mysql", "bolt"];

/// Whether `name` is a recognised backend name.
pub fn is_known(name: &str) -> bool {
    OPENERS.iter().any(|(n, _)| *n == name) || EXTERNAL.contains(&name)
}

/// Open the backend registered under `name`.
pub fn open(name: &str, config: &StoreConfig) -> Result<Box<dyn TelemetryStore>, StorageError> {
    if let Some((_, opener)) = OPENERS.iter().find(|(n, _)| *n == name) {
        tracing::info!(database_type = %name, "Opening telemetry store");
        return opener(config);
    }
    if EXTERNAL.contains(&name) {
        return Err(StorageError::NotCompiledIn(name.to_string()));
    }
    Err(StorageError::UnknownBackend(name.to_string()))
}
