//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, chunks, retrieval results, and
//! answers that flow from the PDF loader to the HTTP API.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Extracted text of one source file.
#[derive(Debug, Clone)]
pub struct Document {
    /// Path relative to the document root (e.g. `handbook/rules.pdf`).
    pub source: String,
    pub text: String,
}

impl Document {
    pub fn new(source: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            text: text.into(),
        }
    }
}

/// A contiguous window of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Source identifier of the parent document.
    pub source: String,
    /// Position of this chunk within its document, starting at 0.
    pub chunk_index: usize,
    /// Offset of the first character within the document, in chars.
    pub char_offset: usize,
    pub text: String,
    /// SHA-256 of `text`, hex encoded.
    pub hash: String,
}

/// A chunk paired with its relevance to a query.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`; higher is more relevant.
    pub score: f32,
}

/// Ranked chunks for one query, most relevant first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn top(&self) -> Option<&ScoredChunk> {
        self.hits.first()
    }
}

/// A composed answer with the context it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub retrieval: RetrievalResult,
    /// Wall-clock time spent in the language model call.
    pub processing_time: Duration,
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// One entry of the in-process chat history.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: u64,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}
