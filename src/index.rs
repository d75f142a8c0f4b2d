//! In-memory vector index.
//!
//! A [`VectorIndex`] is built once from a full set of chunks and never
//! mutated afterwards; a rebuild produces a new index that replaces the old
//! one wholesale. Search is exact brute-force cosine similarity, which is
//! fast enough for corpora of a few thousand chunks.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::embedding::{check_vectors, cosine_similarity, Embedder};
use crate::error::{Error, Result};
use crate::models::{Chunk, RetrievalResult, ScoredChunk};

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// An immutable set of embedded chunks, kept in ingestion order.
pub struct VectorIndex {
    build_id: String,
    built_at: DateTime<Utc>,
    dims: usize,
    documents: usize,
    digest: String,
    entries: Vec<Entry>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("build_id", &self.build_id)
            .field("built_at", &self.built_at)
            .field("dims", &self.dims)
            .field("documents", &self.documents)
            .field("chunks", &self.entries.len())
            .finish()
    }
}

impl VectorIndex {
    /// Embed `chunks` in batches of `batch_size` and assemble a new index.
    ///
    /// Fails with [`Error::EmptyCorpus`] when there is nothing to index.
    /// Any embedding failure aborts the build; no partial index is returned.
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus("no chunks to index".into()));
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed_batch(&texts).await?;
            check_vectors(embedder.provider(), texts.len(), embedder.dims(), &embedded)?;
            tracing::debug!(batch = batch_no, size = texts.len(), "embedded batch");
            vectors.extend(embedded);
        }

        Self::from_parts(chunks, vectors)
    }

    /// Assemble an index from pre-computed vectors, one per chunk.
    pub fn from_parts(chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus("no chunks to index".into()));
        }
        if chunks.len() != vectors.len() {
            return Err(Error::embedding(
                "index",
                format!("{} vectors for {} chunks", vectors.len(), chunks.len()),
            ));
        }
        let dims = vectors[0].len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(Error::embedding(
                "index",
                "vectors do not share a single non-zero dimension",
            ));
        }

        let documents = chunks
            .iter()
            .map(|c| c.source.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        let digest = corpus_digest(&chunks);
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| Entry { chunk, vector })
            .collect();

        Ok(Self {
            build_id: uuid::Uuid::new_v4().to_string(),
            built_at: Utc::now(),
            dims,
            documents,
            digest,
            entries,
        })
    }

    /// Rank all chunks against `query` and return the best `k`.
    ///
    /// Scores descend; equal scores keep ingestion order. `k` larger than
    /// the corpus returns every chunk, and `k == 0` returns nothing.
    pub fn search(&self, query: &[f32], k: usize) -> Result<RetrievalResult> {
        if query.len() != self.dims {
            return Err(Error::embedding(
                "index",
                format!(
                    "query has {} dimensions, index has {}",
                    query.len(),
                    self.dims
                ),
            ));
        }
        if k == 0 {
            return Ok(RetrievalResult::default());
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, e)| (pos, cosine_similarity(query, &e.vector)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);

        let hits = scored
            .into_iter()
            .map(|(pos, score)| ScoredChunk {
                chunk: self.entries[pos].chunk.clone(),
                score,
            })
            .collect();
        Ok(RetrievalResult { hits })
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of distinct source documents.
    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// SHA-256 over the ordered chunk hashes; identical corpora share a digest.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}

fn corpus_digest(chunks: &[Chunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.hash.as_bytes());
        hasher.update([b'\n']);
    }
    format!("{:x}", hasher.finalize())
}
