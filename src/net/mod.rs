//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Socket activation fds / bind_address+listen_port
//!     → listener.rs (choose exactly one listener)
//!
//! Accepted TCP connection
//!     → proxy_protocol.rs (optional PROXY v1/v2 header, trusted peers only)
//!     → tls.rs (optional TLS handshake, ALPN h2/http1.1)
//!     → connection.rs (lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The listener decision is made once at startup and never changes
//! - PROXY headers are consumed before TLS so the handshake sees clean bytes
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod proxy_protocol;
pub mod tls;

pub use listener::{bind_listener, ListenerError, ListenerSource};
pub use proxy_protocol::{ProxyHeader, ProxyHeaderError, ProxyUnwrapper};
pub use tls::{load_tls_acceptor, TlsError};
