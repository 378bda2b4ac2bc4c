//! Configuration schema definitions.
//!
//! The key names follow the `settings.toml` files already deployed next to
//! the speed test frontend, so the structure is intentionally flat.

use serde::{Deserialize, Serialize};

/// Placeholder password that means "statistics password not configured".
pub const PLACEHOLDER_STATS_PASSWORD: &str = "PASSWORD";

/// Root configuration for the speed test backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SpeedtestConfig {
    /// Address to bind when no socket is inherited. Empty binds all interfaces.
    pub bind_address: String,

    /// Port to bind when no socket is inherited. Empty binds an ephemeral port.
    pub listen_port: String,

    /// Prefix every route is mounted under (e.g. "/speedtest").
    pub url_base: String,

    /// Deprecated dedicated PROXY-protocol port. Must stay "0" or empty.
    pub proxyprotocol_port: String,

    /// Decode PROXY protocol headers on accepted connections.
    pub enable_proxyprotocol: bool,

    /// Upstreams trusted to send PROXY headers. Empty trusts every peer.
    pub proxyprotocol_allowed_ips: Vec<String>,

    /// Server latitude used for distance scoring (0 = look it up).
    pub server_lat: f64,

    /// Server longitude used for distance scoring (0 = look it up).
    pub server_lng: f64,

    /// ipinfo.io API token.
    pub ipinfo_api_key: String,

    /// Base URL of the ipinfo.io compatible lookup service.
    pub ipinfo_url: String,

    /// Password gating the stats viewer.
    pub statistics_password: String,

    /// Scrub client addresses before persisting telemetry.
    pub redact_ip_addresses: bool,

    /// Storage backend name (see `storage::registry`).
    pub database_type: String,
    pub database_hostname: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,
    pub database_file: String,

    /// Enable HTTP/2 (ALPN `h2` with TLS, h2c without).
    pub enable_http2: bool,

    /// Terminate TLS on the listener.
    pub enable_tls: bool,
    pub tls_cert_file: String,
    pub tls_key_file: String,

    /// Default number of chunks streamed by the download endpoint.
    pub download_chunks: u32,

    /// Seconds in-flight connections get to finish once shutdown starts.
    pub shutdown_grace_secs: u64,

    /// Honor `X-Real-IP` / `X-Forwarded-For` style headers for the client address.
    pub trust_forwarded_headers: bool,

    /// Prometheus scrape address. Empty disables the exporter.
    pub metrics_address: String,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for SpeedtestConfig {
    fn default() -> Self {
        Self {
            bind_address: String::new(),
            listen_port: "8989".to_string(),
            url_base: String::new(),
            proxyprotocol_port: "0".to_string(),
            enable_proxyprotocol: false,
            proxyprotocol_allowed_ips: vec!["127.0.0.1/32".to_string(), "::1/128".to_string()],
            server_lat: 0.0,
            server_lng: 0.0,
            ipinfo_api_key: String::new(),
            ipinfo_url: "https://ipinfo.io/".to_string(),
            statistics_password: PLACEHOLDER_STATS_PASSWORD.to_string(),
            redact_ip_addresses: false,
            database_type: "none".to_string(),
            database_hostname: "localhost".to_string(),
            database_name: "speedtest".to_string(),
            database_username: "postgres".to_string(),
            database_password: String::new(),
            database_file: "speedtest.db".to_string(),
            enable_http2: false,
            enable_tls: false,
            tls_cert_file: String::new(),
            tls_key_file: String::new(),
            download_chunks: 4,
            shutdown_grace_secs: 10,
            trust_forwarded_headers: true,
            metrics_address: String::new(),
            log_level: "info".to_string(),
        }
    }
}

impl SpeedtestConfig {
    /// Whether the stats password is still the shipped placeholder.
    pub fn stats_password_unset(&self) -> bool {
        self.statistics_password == PLACEHOLDER_STATS_PASSWORD
    }

    /// Whether an explicit bind address or port is configured.
    pub fn has_explicit_bind(&self) -> bool {
        !self.bind_address.is_empty() || !self.listen_port.is_empty()
    }

    /// Whether the legacy proxy-protocol port setting is in use.
    pub fn uses_legacy_proxy_port(&self) -> bool {
        !self.proxyprotocol_port.is_empty() && self.proxyprotocol_port != "0"
    }
}
