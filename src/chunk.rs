//! Chunker (§4.6): deterministic, overlap-aware text splitting.
//!
//! Grounded on the teacher's pure-function style (`engine/hashing.rs`,
//! `engine/tools.rs` — free functions over borrowed data, no hidden state)
//! and its `blake3` dependency, reused here for `chunk_hash`.

use crate::error::CrawlError;

/// One produced chunk: byte offset into the source text and its content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub start: usize,
    pub content: String,
}

/// Validated `(chunk_size, overlap)` pair enforcing `overlap < chunk_size`
/// (spec §4.6, §9 open question 3). Defaults match SPEC_FULL §9 item 3.
#[derive(Clone, Copy, Debug)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, CrawlError> {
        if overlap >= chunk_size {
            return Err(CrawlError::ConfigInvalid(format!(
                "overlap ({overlap}) must be less than chunk_size ({chunk_size})"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        split(text, self.chunk_size, self.overlap)
    }
}

/// Split `text` into overlapping chunks. `chunk_size` must be greater than
/// `overlap` (spec §4.6, §9 open question 3). Empty input still produces one
/// empty chunk so chunk-0 metadata has somewhere to live.
///
/// Prefer [`ChunkConfig::split`] at call sites that source sizes from user
/// configuration; this free function is the primitive used by tests and by
/// `ChunkConfig` itself, and still asserts the invariant since callers that
/// reach it directly are expected to have validated it already.
pub fn split(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    assert!(
        chunk_size > overlap,
        "chunk_size ({chunk_size}) must be greater than overlap ({overlap})"
    );

    if text.is_empty() {
        return vec![Chunk {
            index: 0,
            start: 0,
            content: String::new(),
        }];
    }

    let bytes = text.as_bytes();
    let len = bytes.len();
    let stride = chunk_size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut index = 0u32;
    while start < len {
        let end = (start + chunk_size).min(len);
        // `text` is valid UTF-8; start/end land on byte offsets computed
        // from ASCII-oriented sizes, so guard against splitting a
        // multi-byte codepoint by backing off to the nearest char boundary.
        let safe_end = floor_char_boundary(text, end);
        let content = text[start..safe_end].to_string();
        chunks.push(Chunk {
            index,
            start,
            content,
        });
        index += 1;
        if safe_end >= len {
            break;
        }
        start += stride;
    }
    chunks
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Stable digest of `(file_path, chunk_index, chunk_content)` (spec §4.6).
pub fn chunk_hash(file_path: &str, chunk_index: u32, content: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(file_path.as_bytes());
    hasher.update(&chunk_index.to_le_bytes());
    hasher.update(content.as_bytes());
    hasher.finalize().to_hex().to_string()
}
