//! Configuration loading.
//!
//! Settings come from an optional TOML file, then environment variables
//! override selected fields. Every section has defaults, so running without a
//! config file is supported.
//!
//! ```toml
//! [documents]
//! root = "files"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 10
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [llm]
//! model = "llama3-70b-8192"
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            root: default_documents_root(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_documents_root() -> PathBuf {
    PathBuf::from("files")
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk length in characters.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// End windows early at paragraph/sentence/word breaks when possible.
    #[serde(default = "default_true")]
    pub respect_boundaries: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            respect_boundaries: true,
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// API base override for the HTTP providers.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider label used in logs and errors.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// OpenAI-compatible API base (the `/chat/completions` path is appended).
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Retries for transient failures. Zero surfaces every failure as-is.
    #[serde(default)]
    pub max_retries: u32,
    /// Resolved from `api_key_env` by [`Config::apply_env`].
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            temperature: None,
            timeout_secs: default_llm_timeout_secs(),
            max_retries: 0,
            api_key: None,
        }
    }
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_llm_model() -> String {
    "llama3-70b-8192".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum chat messages kept for `GET /api/messages`.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}
fn default_history_limit() -> usize {
    200
}

/// LangSmith run reporting. Disabled unless an API key is present.
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_telemetry_project")]
    pub project: String,
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_telemetry_endpoint(),
            project: default_telemetry_project(),
            api_key: None,
        }
    }
}

fn default_telemetry_endpoint() -> String {
    "https://api.smith.langchain.com".to_string()
}
fn default_telemetry_project() -> String {
    "docqa".to_string()
}

impl TelemetryConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

impl Config {
    /// Overlay environment variables onto the file settings.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DOCS_DIR` | `documents.root` |
    /// | `DOCQA_BIND` | `server.bind` |
    /// | `$llm.api_key_env` (default `GROQ_API_KEY`) | `llm.api_key` |
    /// | `LANGSMITH_API_KEY` | `telemetry.api_key` |
    /// | `LANGSMITH_PROJECT` | `telemetry.project` |
    /// | `LANGSMITH_ENDPOINT` | `telemetry.endpoint` |
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env`](Config::apply_env) with an injectable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DOCS_DIR") {
            self.documents.root = PathBuf::from(dir);
        }
        if let Some(bind) = get("DOCQA_BIND") {
            self.server.bind = bind;
        }
        self.llm.api_key = get(&self.llm.api_key_env);
        self.telemetry.api_key = get("LANGSMITH_API_KEY");
        if let Some(project) = get("LANGSMITH_PROJECT") {
            self.telemetry.project = project;
        }
        if let Some(endpoint) = get("LANGSMITH_ENDPOINT") {
            self.telemetry.endpoint = endpoint;
        }
    }

    /// Fail unless the language model credential is present.
    ///
    /// Only commands that call the model need this; `index` does not.
    pub fn require_llm_key(&self) -> Result<&str> {
        self.llm.api_key.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "{} environment variable is not set",
                self.llm.api_key_env
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config("chunking.chunk_size must be > 0".into()));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(format!(
                "chunking.chunk_overlap ({}) must be less than chunking.chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be >= 1".into()));
        }
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be > 0".into()));
        }

        match self.embedding.provider.as_str() {
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    return Err(Error::Config(format!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    )));
                }
                if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                    return Err(Error::Config(format!(
                        "embedding.dims must be > 0 when provider is '{}'",
                        self.embedding.provider
                    )));
                }
            }
            "local" => {}
            other => {
                return Err(Error::Config(format!(
                    "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
                    other
                )))
            }
        }

        if self.llm.model.trim().is_empty() {
            return Err(Error::Config("llm.model must not be empty".into()));
        }

        Ok(())
    }
}

/// Load configuration from `path` (or defaults when `None`), apply
/// environment overrides, and validate.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            parse_config(&content)?
        }
        None => Config::default(),
    };

    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Parse TOML text into a [`Config`] without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))
}
