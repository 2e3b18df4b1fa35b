//! Token-window chunking aligned with the embedding model's tokenizer.

pub mod tokenizer;

use std::ops::Range;
use std::sync::Arc;

pub use tokenizer::{HfTokenizer, TokenCodec, WordTokenizer};

/// Splits raw text into bounded, overlapping token windows.
#[derive(Clone)]
pub struct Chunker {
    codec: Arc<dyn TokenCodec>,
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// `chunk_size` is clamped to at least 1 and `overlap` to below `chunk_size`.
    pub fn new(codec: Arc<dyn TokenCodec>, chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            codec,
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk `text` into windows of at most `chunk_size` tokens.
    ///
    /// If the tokenizer fails the original text comes back as a single chunk.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let scoped = self.codec.scoped();
        let codec = scoped.as_deref().unwrap_or(&*self.codec);

        let ids = match codec.encode(text) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::warn!("Tokenizer failed, keeping text as one chunk: {e:#}");
                return vec![text.to_string()];
            }
        };

        let mut chunks = Vec::new();
        for window in token_windows(ids.len(), self.chunk_size, self.overlap) {
            match codec.decode(&ids[window]) {
                Ok(decoded) => chunks.push(decoded),
                Err(e) => {
                    tracing::warn!("Token decode failed, keeping text as one chunk: {e:#}");
                    return vec![text.to_string()];
                }
            }
        }
        chunks
    }
}

/// Token ranges for sliding windows over `len` tokens.
///
/// Window `i` starts at `i * (chunk_size - overlap)`. The last window is the
/// first one that reaches the end, so no window is contained in its predecessor.
pub fn token_windows(len: usize, chunk_size: usize, overlap: usize) -> Vec<Range<usize>> {
    if len == 0 || chunk_size == 0 || overlap >= chunk_size {
        return Vec::new();
    }

    let step = chunk_size - overlap;
    let mut windows = Vec::with_capacity(len / step + 1);
    let mut start = 0usize;
    loop {
        let end = (start + chunk_size).min(len);
        windows.push(start..end);
        if end == len {
            break;
        }
        start += step;
    }
    windows
}
