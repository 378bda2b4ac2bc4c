//! Measurement primitives shared by the download and upload endpoints.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     chunk.rs (RandomChunk::generate, once)
//!     → stored in AppState, shared by every request
//!
//! GET /garbage?ckSize=N:
//!     chunk.rs (chunk_count: parse, clamp, default)
//!     → handlers::download streams the same buffer N times
//! ```
//!
//! # Design Decisions
//! - The buffer is generated once from the OS CSPRNG and never mutated
//! - Cloning a chunk is a reference-count bump, not a copy
//! - Throughput is timed by the client; nothing is measured server-side

pub mod chunk;

pub use chunk::{chunk_count, RandomChunk, CHUNK_SIZE, DEFAULT_CHUNKS, MAX_CHUNKS};
