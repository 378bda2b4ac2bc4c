//! Speed test backend library.

pub mod config;
pub mod geo;
pub mod http;
pub mod lifecycle;
pub mod measure;
pub mod net;
pub mod observability;
pub mod security;
pub mod storage;

pub use config::SpeedtestConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
