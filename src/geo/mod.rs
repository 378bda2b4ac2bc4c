//! Address classification and geolocation subsystem.
//!
//! # Data Flow
//! ```text
//! GET /getIP
//!     → classify.rs (ordered textual rules, first match wins)
//!     → special address: "<ip> - <description>", done
//!     → public + isp=true:
//!         ipinfo.rs (external lookup, degrades to empty record)
//!         → distance.rs (haversine to the server coordinate)
//! ```
//!
//! # Design Decisions
//! - The server coordinate is resolved once at startup and injected read-only
//! - Lookup and coordinate failures never fail the classification response

pub mod classify;
pub mod distance;
pub mod ipinfo;

use thiserror::Error;

pub use classify::{ClientClassification, IpFamily};
pub use distance::{Coordinate, Distance, DistanceUnit};
pub use ipinfo::{IpInfo, IpInfoClient};

/// Errors from geolocation lookups and coordinate parsing.
#[derive(Debug, Error)]
pub enum GeoError {
    #[error("unknown location format: {0}")]
    LocationFormat(String),

    #[error("invalid coordinate value: {0}")]
    LocationNumber(String),

    #[error("lookup base URL cannot carry a path: {0}")]
    BaseUrl(String),

    #[error("invalid lookup URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("lookup request failed: {0}")]
    Http(#[from] reqwest::Error),
}
