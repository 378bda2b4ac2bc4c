//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (accept loop, protocol negotiation, draining)
//!     → routes.rs (route table, middleware)
//!     → request.rs (effective client address, parameters)
//!     → handlers/ (garbage, empty, getIP, telemetry, stats)
//!     → response.rs (streamed download body)
//!     → Send to client
//! ```

pub mod handlers;
pub mod request;
pub mod response;
pub mod routes;
pub mod server;
pub mod state;

pub use request::ClientIp;
pub use routes::build_router;
pub use server::{HttpServer, ServeError, ServerState};
pub use state::AppState;
