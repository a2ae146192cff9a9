/// Audio payloads and how they are cut into streamed chunks.
///
/// Paced sessions send fixed 250 ms chunks of 16-bit PCM, so a payload must be
/// an exact multiple of the chunk size. Unpaced sessions send blocks of
/// `sample_rate` bytes and accept a shorter trailing block.

use std::sync::Arc;

use thiserror::Error;

use crate::{BYTES_PER_SAMPLE, CHUNK_DURATION_MS};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("sample rate {0} yields a zero-byte chunk")]
    ZeroChunk(u32),

    #[error("audio payload is empty")]
    Empty,

    #[error("wrong audio len {len} % {chunk_size} != 0")]
    NotChunkAligned { len: usize, chunk_size: usize },
}

/// Named raw PCM buffer, loaded once and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl AudioPayload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Bytes in one 250 ms chunk at `sample_rate`.
pub fn chunk_size(sample_rate: u32) -> usize {
    sample_rate as usize * BYTES_PER_SAMPLE * CHUNK_DURATION_MS / 1000
}

/// Block size used by the unpaced protocol: `sample_rate` bytes (half a second).
pub fn unpaced_block_size(sample_rate: u32) -> usize {
    sample_rate as usize
}

/// Chunk geometry for one payload in the paced protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    chunk_size: usize,
    chunk_count: u32,
}

impl ChunkLayout {
    /// Validate `len` bytes against the chunk size for `sample_rate`.
    pub fn new(len: usize, sample_rate: u32) -> Result<Self, LayoutError> {
        let chunk_size = chunk_size(sample_rate);
        if chunk_size == 0 {
            return Err(LayoutError::ZeroChunk(sample_rate));
        }
        if len == 0 {
            return Err(LayoutError::Empty);
        }
        if len % chunk_size != 0 {
            return Err(LayoutError::NotChunkAligned { len, chunk_size });
        }
        Ok(Self {
            chunk_size,
            chunk_count: (len / chunk_size) as u32,
        })
    }

    pub fn for_payload(payload: &AudioPayload, sample_rate: u32) -> Result<Self, LayoutError> {
        Self::new(payload.len(), sample_rate)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_count
    }

    /// Iterate over the chunks of `bytes`. `bytes` must be the payload this
    /// layout was validated against.
    pub fn chunks<'a>(&self, bytes: &'a [u8]) -> std::slice::Chunks<'a, u8> {
        bytes.chunks(self.chunk_size)
    }
}
