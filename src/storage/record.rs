//! Telemetry record passed through to storage backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One submitted speed test result.
///
/// Measurement fields are stored exactly as the client sent them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub timestamp: DateTime<Utc>,
    pub ip_address: String,
    pub isp_info: String,
    pub extra: String,
    pub user_agent: String,
    pub language: String,
    pub download: String,
    pub upload: String,
    pub ping: String,
    pub jitter: String,
    pub log: String,
    pub uuid: String,
}
