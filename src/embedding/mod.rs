//! Embedding providers.
//!
//! The [`Embedder`] trait turns text into fixed-dimension vectors. Three
//! implementations ship with the crate:
//! - **[`OpenAIEmbedder`]**: `POST {base}/embeddings` on the OpenAI API.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on an Ollama instance.
//! - **`LocalEmbedder`**: in-process inference via fastembed (default) or
//!   tract (`local-embeddings-tract`). The model loads on first use and is
//!   reused afterwards.
//!
//! Use [`create_embedder`] to pick one from configuration.
//!
//! # Retry Strategy
//!
//! The HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 and 5xx → retry
//! - other 4xx → fail immediately
//! - network errors → retry
//! - backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

#[cfg(feature = "local-embeddings-tract")]
mod local_tract;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Default model for the local provider.
pub const DEFAULT_LOCAL_MODEL: &str = "all-minilm-l6-v2";

/// Maps text to vectors of a single, fixed dimensionality.
///
/// Implementations must return exactly one vector per input, in input order,
/// each of length [`dims`](Embedder::dims). Blank input is rejected.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider label (`"openai"`, `"ollama"`, `"local"`, ...).
    fn provider(&self) -> &str;

    fn model_name(&self) -> &str;

    fn dims(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed one text. Equivalent to a batch of one.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(vector), true) => Ok(vector),
            _ => Err(Error::embedding(
                self.provider(),
                "expected exactly one vector for one input",
            )),
        }
    }
}

/// Reject empty batches and blank entries before they reach a provider.
pub fn check_inputs(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(Error::InvalidInput("nothing to embed".into()));
    }
    if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
        return Err(Error::InvalidInput(format!(
            "cannot embed blank text (input {})",
            pos
        )));
    }
    Ok(())
}

/// Check a provider response against the request: one vector per input,
/// each of the expected length.
pub fn check_vectors(
    provider: &str,
    expected_count: usize,
    dims: usize,
    vectors: &[Vec<f32>],
) -> Result<()> {
    if vectors.len() != expected_count {
        return Err(Error::embedding(
            provider,
            format!(
                "returned {} vectors for {} inputs",
                vectors.len(),
                expected_count
            ),
        ));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(Error::embedding(
            provider,
            format!("returned a {}-dimensional vector, expected {}", bad.len(), dims),
        ));
    }
    Ok(())
}

// ============ HTTP plumbing ============

fn http_client(provider: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::embedding(provider, format!("failed to build HTTP client: {}", e)))
}

/// Send a JSON request built by `request`, retrying 429/5xx/network errors.
async fn post_with_retry<F>(provider: &str, max_retries: u32, request: F) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(provider, attempt, ?delay, "retrying embedding request");
            tokio::time::sleep(delay).await;
        }

        match request().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response.json().await.map_err(|e| {
                        Error::embedding(provider, format!("invalid response body: {}", e))
                    });
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = Error::embedding(provider, format!("API error {}: {}", status, body_text));
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(provider, %status, "transient embedding failure");
                    last_err = Some(err);
                    continue;
                }
                return Err(err);
            }
            Err(e) => {
                tracing::warn!(provider, error = %e, "embedding request failed");
                last_err = Some(Error::embedding(provider, format!("request failed: {}", e)));
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::embedding(provider, "embedding failed after retries")))
}

fn json_vector(provider: &str, value: &serde_json::Value) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| Error::embedding(provider, "embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::embedding(provider, "embedding contains a non-number"))
        })
        .collect()
}

// ============ OpenAI ============

/// Embedder backed by the OpenAI embeddings API.
///
/// Requires `OPENAI_API_KEY`. `embedding.url` overrides the API base.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("OPENAI_API_KEY environment variable not set".into()))?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let (model, dims) = require_model_and_dims(config, "openai")?;
        Ok(Self {
            client: http_client("openai", config.timeout_secs)?,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn provider(&self) -> &str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        check_inputs(texts)?;
        let url = format!("{}/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_with_retry("openai", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let vectors = parse_openai_response(&json)?;
        check_vectors("openai", texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::embedding("openai", "missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| Error::embedding("openai", "missing embedding"))?;
        indexed.push((index, json_vector("openai", embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder backed by a running Ollama instance (default `http://localhost:11434`).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    max_retries: u32,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model, dims) = require_model_and_dims(config, "ollama")?;
        Ok(Self {
            client: http_client("ollama", config.timeout_secs)?,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            model,
            dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        check_inputs(texts)?;
        let url = format!("{}/api/embed", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_with_retry("ollama", self.max_retries, || {
            self.client.post(&url).json(&body)
        })
        .await?;

        let vectors = parse_ollama_response(&json)?;
        check_vectors("ollama", texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::embedding("ollama", "missing embeddings array"))?
        .iter()
        .map(|e| json_vector("ollama", e))
        .collect()
}

fn require_model_and_dims(config: &EmbeddingConfig, provider: &str) -> Result<(String, usize)> {
    let model = config.model.clone().ok_or_else(|| {
        Error::Config(format!("embedding.model required for {} provider", provider))
    })?;
    let dims = config
        .dims
        .filter(|d| *d > 0)
        .ok_or_else(|| Error::Config(format!("embedding.dims required for {} provider", provider)))?;
    Ok((model, dims))
}

// ============ Local (fastembed or tract) ============

#[cfg(feature = "local-embeddings-fastembed")]
type LocalEngine = fastembed::TextEmbedding;

#[cfg(all(
    feature = "local-embeddings-tract",
    not(feature = "local-embeddings-fastembed")
))]
type LocalEngine = local_tract::TractEncoder;

/// In-process embedder. No network calls after the model is cached.
#[cfg(any(
    feature = "local-embeddings-fastembed",
    feature = "local-embeddings-tract"
))]
pub struct LocalEmbedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    engine: Arc<std::sync::Mutex<Option<LocalEngine>>>,
}

#[cfg(any(
    feature = "local-embeddings-fastembed",
    feature = "local-embeddings-tract"
))]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_name, dims) = resolve_local_model(config);
        #[cfg(feature = "local-embeddings-fastembed")]
        config_to_fastembed_model(&model_name)?;
        Ok(Self {
            model_name,
            dims,
            batch_size: config.batch_size,
            engine: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(any(
    feature = "local-embeddings-fastembed",
    feature = "local-embeddings-tract"
))]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn provider(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        check_inputs(texts)?;
        let engine = Arc::clone(&self.engine);
        let model_name = self.model_name.clone();
        let batch_size = self.batch_size;
        let inputs = texts.to_vec();

        let vectors = tokio::task::spawn_blocking(move || {
            let mut slot = engine
                .lock()
                .map_err(|_| Error::embedding("local", "model lock poisoned"))?;
            if slot.is_none() {
                tracing::info!(model = %model_name, "loading local embedding model");
                *slot = Some(load_engine(&model_name)?);
            }
            let model = slot
                .as_mut()
                .ok_or_else(|| Error::embedding("local", "model failed to load"))?;
            run_engine(model, inputs, batch_size)
        })
        .await
        .map_err(|e| Error::embedding("local", format!("embedding task failed: {}", e)))??;

        check_vectors("local", texts.len(), self.dims, &vectors)?;
        Ok(vectors)
    }
}

#[cfg(any(
    feature = "local-embeddings-fastembed",
    feature = "local-embeddings-tract"
))]
fn resolve_local_model(config: &EmbeddingConfig) -> (String, usize) {
    let model_name = config
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_LOCAL_MODEL.to_string());

    let dims = config.dims.unwrap_or(match model_name.as_str() {
        "bge-base-en-v1.5" | "multilingual-e5-base" => 768,
        "nomic-embed-text-v1" | "nomic-embed-text-v1.5" => 768,
        "bge-large-en-v1.5" | "multilingual-e5-large" => 1024,
        _ => 384,
    });

    (model_name, dims)
}

#[cfg(feature = "local-embeddings-fastembed")]
fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    use fastembed::EmbeddingModel as M;
    match name {
        "all-minilm-l6-v2" => Ok(M::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(M::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(M::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(M::BGELargeENV15),
        "nomic-embed-text-v1" => Ok(M::NomicEmbedTextV1),
        "nomic-embed-text-v1.5" => Ok(M::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(M::MultilingualE5Small),
        "multilingual-e5-base" => Ok(M::MultilingualE5Base),
        "multilingual-e5-large" => Ok(M::MultilingualE5Large),
        other => Err(Error::Config(format!(
            "unknown local embedding model '{}'",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn load_engine(model_name: &str) -> Result<LocalEngine> {
    let model = config_to_fastembed_model(model_name)?;
    fastembed::TextEmbedding::try_new(
        fastembed::InitOptions::new(model).with_show_download_progress(false),
    )
    .map_err(|e| Error::embedding("local", format!("failed to initialize model: {}", e)))
}

#[cfg(feature = "local-embeddings-fastembed")]
fn run_engine(
    engine: &mut LocalEngine,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    engine
        .embed(texts, Some(batch_size))
        .map_err(|e| Error::embedding("local", e.to_string()))
}

#[cfg(all(
    feature = "local-embeddings-tract",
    not(feature = "local-embeddings-fastembed")
))]
fn load_engine(model_name: &str) -> Result<LocalEngine> {
    local_tract::TractEncoder::load(model_name)
}

#[cfg(all(
    feature = "local-embeddings-tract",
    not(feature = "local-embeddings-fastembed")
))]
fn run_engine(
    engine: &mut LocalEngine,
    texts: Vec<String>,
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    engine.encode(&texts, batch_size)
}

/// Create the [`Embedder`] selected by `config.provider`.
///
/// | Config Value | Embedder |
/// |-------------|----------|
/// | `"local"` | `LocalEmbedder` (fastembed or tract, see features) |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        #[cfg(any(
            feature = "local-embeddings-fastembed",
            feature = "local-embeddings-tract"
        ))]
        "local" => Ok(Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(any(
            feature = "local-embeddings-fastembed",
            feature = "local-embeddings-tract"
        )))]
        "local" => Err(Error::Config(
            "local embedding provider requires --features local-embeddings-fastembed or local-embeddings-tract"
                .into(),
        )),
        other => Err(Error::Config(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

/// Cosine similarity of two vectors, in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, mismatched lengths, or a zero vector.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}
