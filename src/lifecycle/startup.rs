//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Resolve the server coordinate and the download chunk once
//! - Bind the listener and begin accepting traffic
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::future::Future;
use std::net::SocketAddr;

use metrics_exporter_prometheus::BuildError;
use thiserror::Error;

use crate::config::SpeedtestConfig;
use crate::geo::ipinfo::resolve_server_coordinate;
use crate::geo::{Coordinate, GeoError, IpInfoClient};
use crate::http::{AppState, HttpServer, ServeError};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::spawn_signal_handler;
use crate::measure::RandomChunk;
use crate::net::{bind_listener, ListenerError};
use crate::observability::init_metrics;
use crate::storage::{open_store, StorageError};

/// Anything that stops the server from starting or keeps it from serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid metrics address {0:?}")]
    MetricsAddress(String),

    #[error("failed to install metrics exporter: {0}")]
    Metrics(#[from] BuildError),

    #[error("failed to build ipinfo client: {0}")]
    Geo(#[from] GeoError),

    #[error("failed to generate download chunk: {0}")]
    Random(#[from] rand::Error),

    #[error("failed to open storage: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to bind listener: {0}")]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Serve(#[from] ServeError),
}

/// Build a ready-to-run server from a validated configuration.
///
/// Does not bind any socket.
pub async fn build_server(config: &SpeedtestConfig) -> Result<HttpServer, StartupError> {
    if forwarded_headers_bypass_proxy_trust(config) {
        tracing::warn!(
            "trust_forwarded_headers is on with PROXY protocol enabled; any client can set its address \
             with X-Real-IP or X-Forwarded-For regardless of proxyprotocol_allowed_ips"
        );
    }

    let ipinfo = IpInfoClient::new(&config.ipinfo_url, &config.ipinfo_api_key)?;
    let configured = Coordinate::new(config.server_lat, config.server_lng);
    let coordinate = resolve_server_coordinate(configured, &ipinfo).await;

    let chunk = RandomChunk::generate()?;
    tracing::debug!(bytes = chunk.len(), "Download chunk generated");

    let store = open_store(config)?;
    tracing::info!(database_type = %config.database_type, "Telemetry storage ready");

    let state = AppState::new(config, chunk, coordinate, ipinfo, store);
    Ok(HttpServer::new(config, state)?)
}

/// Forwarding headers are honored from every peer, so they override the PROXY allow-list.
fn forwarded_headers_bypass_proxy_trust(config: &SpeedtestConfig) -> bool {
    config.enable_proxyprotocol && config.trust_forwarded_headers
}

/// Serve an already built server until `shutdown` resolves.
pub async fn serve<F>(config: &SpeedtestConfig, server: HttpServer, shutdown: F) -> Result<(), StartupError>
where
    F: Future<Output = ()> + Send,
{
    let listener = bind_listener(config).await?;
    let local_addr = listener.local_addr().map_err(ServeError::Io)?;
    tracing::info!(
        address = %local_addr,
        tls = config.enable_tls,
        proxy_protocol = config.enable_proxyprotocol,
        "Listening for connections"
    );

    server.run(listener, shutdown).await?;
    Ok(())
}

/// Run the server until SIGINT or SIGTERM.
pub async fn run(config: SpeedtestConfig) -> Result<(), StartupError> {
    if !config.metrics_address.is_empty() {
        let addr: SocketAddr = config
            .metrics_address
            .parse()
            .map_err(|_| StartupError::MetricsAddress(config.metrics_address.clone()))?;
        init_metrics(addr)?;
    }

    let server = build_server(&config).await?;

    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();
    let _signals = spawn_signal_handler(shutdown);

    serve(&config, server, signalled).await?;
    tracing::info!("Shutdown complete");
    Ok(())
}
