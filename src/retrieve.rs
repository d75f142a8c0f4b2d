//! Query-time retrieval: embed the question, search the current index.

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::models::RetrievalResult;

/// Return the `k` chunks most similar to `query`.
///
/// `index` is `None` until the first successful build, which yields
/// [`Error::NotReady`]. Blank queries are rejected before embedding.
pub async fn retrieve(
    index: Option<&VectorIndex>,
    embedder: &dyn Embedder,
    query: &str,
    k: usize,
) -> Result<RetrievalResult> {
    let index = index.ok_or(Error::NotReady)?;
    let query = query.trim();
    if query.is_empty() {
        return Err(Error::InvalidInput("question must not be empty".into()));
    }

    let vector = embedder.embed(query).await?;
    let result = index.search(&vector, k)?;
    tracing::debug!(
        k,
        hits = result.len(),
        top_score = result.top().map(|h| h.score),
        "retrieved context"
    );
    Ok(result)
}
