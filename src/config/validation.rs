//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject settings that are deprecated or mutually inconsistent
//! - Validate value ranges (ports, chunk counts, CIDR ranges)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SpeedtestConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;

use crate::config::schema::SpeedtestConfig;
use crate::measure::chunk::MAX_CHUNKS;
use crate::security::allow_list::ProxyAllowList;
use crate::storage::registry;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("proxyprotocol_port is deprecated, use enable_proxyprotocol")]
    DeprecatedProxyPort,

    #[error("listen_port {0:?} is not a valid port")]
    InvalidPort(String),

    #[error("proxyprotocol_allowed_ips entry {entry:?} is not a valid CIDR: {reason}")]
    InvalidCidr { entry: String, reason: String },

    #[error("enable_tls is set but {0} is empty")]
    MissingTlsFile(&'static str),

    #[error("unsupported database type: {0}")]
    UnknownDatabase(String),

    #[error("download_chunks {0} exceeds the maximum of 1024")]
    TooManyChunks(u32),
}

/// Validate a freshly loaded configuration.
pub fn validate_config(config: &SpeedtestConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.uses_legacy_proxy_port() {
        errors.push(ValidationError::DeprecatedProxyPort);
    }

    if !config.listen_port.is_empty() && config.listen_port.parse::<u16>().is_err() {
        errors.push(ValidationError::InvalidPort(config.listen_port.clone()));
    }

    if let Err(e) = ProxyAllowList::from_cidrs(&config.proxyprotocol_allowed_ips) {
        errors.push(ValidationError::InvalidCidr {
            entry: e.entry,
            reason: e.reason,
        });
    }

    if config.enable_tls {
        if config.tls_cert_file.is_empty() {
            errors.push(ValidationError::MissingTlsFile("tls_cert_file"));
        }
        if config.tls_key_file.is_empty() {
            errors.push(ValidationError::MissingTlsFile("tls_key_file"));
        }
    }

    if !registry::is_known(&config.database_type) {
        errors.push(ValidationError::UnknownDatabase(config.database_type.clone()));
    }

    if config.download_chunks > MAX_CHUNKS {
        errors.push(ValidationError::TooManyChunks(config.download_chunks));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
