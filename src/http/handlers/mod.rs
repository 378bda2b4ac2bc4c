//! Endpoint handlers.

pub mod download;
pub mod ip;
pub mod stats;
pub mod telemetry;
pub mod upload;
