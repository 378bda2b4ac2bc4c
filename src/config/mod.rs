//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! settings.toml (optional)
//!     → loader.rs (parse, SPEEDTEST_* environment overlay)
//!     → validation.rs (semantic checks)
//!     → SpeedtestConfig (validated, immutable)
//!     → consumed once by lifecycle::startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::SpeedtestConfig;
pub use validation::ValidationError;
