//! Pseudorandom payload for download tests.

use bytes::Bytes;
use rand::rngs::OsRng;
use rand::RngCore;

/// Size of one download chunk (1 MiB).
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Chunks streamed when the client does not ask for a count.
pub const DEFAULT_CHUNKS: u32 = 4;

/// Upper bound on chunks per download request.
pub const MAX_CHUNKS: u32 = 1024;

/// Immutable random buffer shared by all download requests.
#[derive(Debug, Clone)]
pub struct RandomChunk {
    data: Bytes,
}

impl RandomChunk {
    /// Generate a `CHUNK_SIZE` buffer from the OS random source.
    pub fn generate() -> Result<Self, rand::Error> {
        Self::with_size(CHUNK_SIZE)
    }

    /// Generate a buffer of arbitrary size.
    pub fn with_size(size: usize) -> Result<Self, rand::Error> {
        let mut data = vec![0u8; size];
        OsRng.try_fill_bytes(&mut data)?;
        Ok(Self {
            data: Bytes::from(data),
        })
    }

    /// A cheap handle to the shared bytes.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Resolve the number of chunks to stream for a `ckSize` query value.
///
/// Missing values use `default`. Values that are not non-negative integers
/// fall back to `default` with a warning. Larger values clamp to `MAX_CHUNKS`.
pub fn chunk_count(requested: Option<&str>, default: u32) -> u32 {
    let Some(raw) = requested.filter(|raw| !raw.is_empty()) else {
        return default;
    };

    match raw.parse::<u64>() {
        Ok(n) if n > u64::from(MAX_CHUNKS) => MAX_CHUNKS,
        Ok(n) => n as u32,
        Err(e) => {
            tracing::warn!(ck_size = %raw, error = %e, default, "Invalid chunk size, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_has_fixed_size() {
        let chunk = RandomChunk::generate().unwrap();
        assert_eq!(chunk.len(), CHUNK_SIZE);
    }

    #[test]
    fn handles_share_the_same_buffer() {
        let chunk = RandomChunk::with_size(64).unwrap();
        let a = chunk.bytes();
        let b = chunk.bytes();
        assert_eq!(a.as_ptr(), b.as_ptr());
        assert_eq!(a, b);
    }

    #[test]
    fn random_content_is_not_all_zero() {
        let chunk = RandomChunk::with_size(4096).unwrap();
        assert!(chunk.bytes().iter().any(|&b| b != 0));
    }

    #[test]
    fn count_defaults() {
        assert_eq!(chunk_count(None, DEFAULT_CHUNKS), 4);
        assert_eq!(chunk_count(Some(""), DEFAULT_CHUNKS), 4);
        assert_eq!(chunk_count(Some("abc"), DEFAULT_CHUNKS), 4);
        assert_eq!(chunk_count(Some("-3"), DEFAULT_CHUNKS), 4);
        assert_eq!(chunk_count(Some("2.5"), DEFAULT_CHUNKS), 4);
    }

    #[test]
    fn count_clamps() {
        assert_eq!(chunk_count(Some("0"), DEFAULT_CHUNKS), 0);
        assert_eq!(chunk_count(Some("1"), DEFAULT_CHUNKS), 1);
        assert_eq!(chunk_count(Some("1024"), DEFAULT_CHUNKS), 1024);
        assert_eq!(chunk_count(Some("1025"), DEFAULT_CHUNKS), 1024);
        assert_eq!(chunk_count(Some("99999999999999999999"), DEFAULT_CHUNKS), 4);
    }
}
