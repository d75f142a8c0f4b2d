//! Overlapping fixed-size text chunker.
//!
//! Splits document text into [`Chunk`]s of at most `chunk_size` characters,
//! where adjacent chunks share exactly `chunk_overlap` characters. The unit
//! is the Unicode scalar value (`char`), never bytes, so multi-byte text is
//! never cut inside a character.
//!
//! # Algorithm
//!
//! 1. Start a window at char position `start` (initially 0).
//! 2. The hard end is `min(start + chunk_size, len)`.
//! 3. When boundary mode is on and the window is not the last one, pull the
//!    end back to the latest natural break after `start + overlap`: a
//!    paragraph break, then a line break, then a sentence end, then any
//!    whitespace. With no break available the window ends mid-token.
//! 4. Emit `text[start..end]` verbatim (no trimming), unless the window is
//!    whitespace only. Those windows are dropped and indices stay contiguous.
//! 5. The next window starts at `end - overlap`.
//!
//! Because windows are emitted verbatim, dropping the first `overlap` chars of
//! every chunk after the first and concatenating reproduces the input exactly
//! when no window was dropped. Every chunk's `char_offset` always locates its
//! text in the input.
//!
//! # Example
//!
//! ```rust
//! use docqa::chunk::Chunker;
//! use docqa::models::Document;
//!
//! let chunker = Chunker::new(50, 0).unwrap();
//! let chunks = chunker.split(&Document::new("a.pdf", "A is the capital of X."));
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].text, "A is the capital of X.");
//! ```

use sha2::{Digest, Sha256};

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::models::{Chunk, Document};

/// Splits documents into overlapping windows.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
    respect_boundaries: bool,
}

impl Chunker {
    /// Create a boundary-aware chunker.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] unless `0 <= chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be > 0".into()));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
            respect_boundaries: true,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Ok(Self::new(config.chunk_size, config.chunk_overlap)?
            .with_boundaries(config.respect_boundaries))
    }

    /// Toggle natural-boundary preference. When off, every window but the
    /// last is exactly `chunk_size` chars.
    pub fn with_boundaries(mut self, respect_boundaries: bool) -> Self {
        self.respect_boundaries = respect_boundaries;
        self
    }

    /// Split one document. Returns no chunks for empty or blank text.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = document.text.as_str();
        if text.is_empty() {
            return Vec::new();
        }

        let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let byte_at = |pos: usize| if pos == total { text.len() } else { offsets[pos] };

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end < total && self.respect_boundaries {
                find_break(&chars, start + self.chunk_overlap + 1, hard_end).unwrap_or(hard_end)
            } else {
                hard_end
            };

            let piece = &text[byte_at(start)..byte_at(end)];
            if !piece.trim().is_empty() {
                chunks.push(make_chunk(&document.source, chunks.len(), start, piece));
            }

            if end == total {
                break;
            }
            start = end - self.chunk_overlap;
        }

        chunks
    }

    /// Split several documents, preserving their order.
    pub fn split_all(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|d| self.split(d)).collect()
    }
}

/// Split `document` into windows of at most `max_size` chars sharing
/// `overlap` chars, preferring natural breaks.
pub fn split_document(document: &Document, max_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    Ok(Chunker::new(max_size, overlap)?.split(document))
}

/// Latest cut position `p` in `lo..=hi` that ends on a natural break.
///
/// A cut at `p` means the chunk ends just before `chars[p]`.
fn find_break(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
    if lo > hi {
        return None;
    }
    let candidates = || (lo.max(1)..=hi).rev();

    candidates()
        .find(|&p| p >= 2 && chars[p - 1] == '\n' && chars[p - 2] == '\n')
        .or_else(|| candidates().find(|&p| chars[p - 1] == '\n'))
        .or_else(|| {
            candidates().find(|&p| {
                p >= 2 && chars[p - 1].is_whitespace() && matches!(chars[p - 2], '.' | '!' | '?')
            })
        })
        .or_else(|| candidates().find(|&p| chars[p - 1].is_whitespace()))
}

/// Create a single [`Chunk`] with its SHA-256 content hash.
fn make_chunk(source: &str, index: usize, char_offset: usize, text: &str) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        source: source.to_string(),
        chunk_index: index,
        char_offset,
        text: text.to_string(),
        hash,
    }
}
