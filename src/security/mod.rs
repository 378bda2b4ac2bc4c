//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Accepted connection:
//!     → allow_list.rs (may this peer supply a PROXY header?)
//!
//! Every response:
//!     → headers.rs (CORS, no-cache)
//!
//! Stats request:
//!     → stats_gate.rs (password / bearer check)
//! ```
//!
//! # Design Decisions
//! - Fail closed: an unconfigured stats password authorizes nobody
//! - No trust in client input: PROXY headers only from allow-listed peers

pub mod allow_list;
pub mod headers;
pub mod stats_gate;

pub use allow_list::{AllowListError, ProxyAllowList};
pub use stats_gate::{PasswordGate, StatsGate};
