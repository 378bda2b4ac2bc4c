//! Response bodies.
//!
//! # Responsibilities
//! - Stream the shared random chunk without copying it
//! - Notice when a client goes away mid-download
//!
//! # Design Decisions
//! - Each yielded frame is a refcounted clone of one buffer
//! - A stream dropped after it started but before completion is logged, never retried
//! - A stream that never yielded (HEAD, rejected request) is not an early end

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;

use crate::observability::metrics;

/// Yields `chunk` exactly `remaining` times.
#[derive(Debug)]
pub struct ChunkStream {
    chunk: Bytes,
    remaining: u32,
    started: bool,
}

impl ChunkStream {
    pub fn new(chunk: Bytes, count: u32) -> Self {
        Self {
            chunk,
            remaining: count,
            started: false,
        }
    }

    /// Total body length in bytes.
    pub fn total_len(&self) -> u64 {
        self.chunk.len() as u64 * u64::from(self.remaining)
    }

    /// Whether the client stopped reading after the first chunk went out.
    pub fn ended_early(&self) -> bool {
        self.started && self.remaining > 0
    }
}

impl Stream for ChunkStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.remaining == 0 {
            return Poll::Ready(None);
        }
        self.remaining -= 1;
        self.started = true;
        metrics::record_download_bytes(self.chunk.len() as u64);
        Poll::Ready(Some(Ok(self.chunk.clone())))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining as usize;
        (n, Some(n))
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        if self.ended_early() {
            tracing::debug!(chunks_left = self.remaining, "Download ended early");
        }
    }
}
