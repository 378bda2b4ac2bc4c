//! Speed test backend
//!
//! Serves the endpoints a browser-based speed test client talks to.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ net::listener ──▶ net::proxy_protocol ──▶ net::tls
//!                                                                  │
//!                                                                  ▼
//!                                                       http::server (h1/h2)
//!                                                                  │
//!                                                                  ▼
//!                                                       http::routes (no-cache, CORS)
//!                                                                  │
//!           ┌──────────────┬──────────────┬───────────────────┬────┴────────┐
//!           ▼              ▼              ▼                   ▼             ▼
//!       /garbage        /empty         /getIP        /results/telemetry   /stats
//!       measure         drain          geo           storage             storage
//! ```

use std::path::PathBuf;

use clap::Parser;

use speedtest_backend::config::load_config;
use speedtest_backend::lifecycle;
use speedtest_backend::observability::init_logging;

#[derive(Parser)]
#[command(name = "speedtest-backend")]
#[command(about = "Speed test backend server", long_about = None)]
struct Cli {
    /// Path to settings.toml; SPEEDTEST_* environment variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    init_logging(&config.log_level)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "speedtest-backend starting");
    tracing::info!(
        bind_address = %config.bind_address,
        listen_port = %config.listen_port,
        url_base = %config.url_base,
        database_type = %config.database_type,
        "Configuration loaded"
    );

    lifecycle::run(config).await?;
    Ok(())
}
