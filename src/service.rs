//! Service orchestrator.
//!
//! [`QaService`] owns the live index and wires the pipeline together:
//!
//! ```text
//! rebuild():  DocumentSource ─► Chunker ─► Embedder ─► VectorIndex ─► publish
//! ask(q):     snapshot index ─► retrieve ─► compose (LanguageModel) ─► Answer
//! ```
//!
//! Lifecycle: `Uninitialized → Building → Ready`, and `Ready → Building →
//! Ready` on every rebuild. Questions are answered from whichever index is
//! current when they arrive; a rebuild publishes its index with a single
//! pointer swap, so readers see the old corpus or the new one, never a mix.
//! A failed rebuild leaves the previous index serving.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::chunk::Chunker;
use crate::compose::compose;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::loader::{DocumentSource, PdfDirectory};
use crate::models::{Answer, ChatMessage, Sender};
use crate::retrieve::retrieve;
use crate::telemetry::{RunRecord, Telemetry};

/// Coarse lifecycle state reported by [`QaService::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Uninitialized,
    Building,
    Ready,
}

/// Snapshot of the service for health checks and the CLI.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub build_id: Option<String>,
    pub built_at: Option<DateTime<Utc>>,
    pub documents: usize,
    pub chunks: usize,
    /// Message of the most recent failed rebuild, cleared on success.
    pub last_error: Option<String>,
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: String,
    pub built_at: DateTime<Utc>,
    pub documents: usize,
    pub chunks: usize,
    pub digest: String,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
}

fn as_secs_f64<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

struct History {
    limit: usize,
    next_id: AtomicU64,
    messages: Mutex<VecDeque<ChatMessage>>,
}

impl History {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            next_id: AtomicU64::new(1),
            messages: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, text: String, sender: Sender) {
        if self.limit == 0 {
            return;
        }
        let message = ChatMessage {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            text,
            sender,
            timestamp: Utc::now(),
        };
        let mut messages = self.messages.lock().unwrap_or_else(PoisonError::into_inner);
        messages.push_back(message);
        while messages.len() > self.limit {
            messages.pop_front();
        }
    }

    fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// Clears the building flag even if the build future is dropped.
struct BuildingFlag<'a>(&'a AtomicBool);

impl<'a> BuildingFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for BuildingFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Document question-answering service.
pub struct QaService {
    source: Arc<dyn DocumentSource>,
    chunker: Chunker,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn LanguageModel>,
    top_k: usize,
    batch_size: usize,
    telemetry: Telemetry,
    current: RwLock<Option<Arc<VectorIndex>>>,
    build_lock: tokio::sync::Mutex<()>,
    building: AtomicBool,
    last_error: Mutex<Option<String>>,
    history: History,
}

impl QaService {
    /// Create a service with default retrieval settings (top-k 10, batch 64,
    /// 200 history messages) and telemetry disabled.
    pub fn new(
        source: Arc<dyn DocumentSource>,
        chunker: Chunker,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            source,
            chunker,
            embedder,
            model,
            top_k: 10,
            batch_size: 64,
            telemetry: Telemetry::disabled(),
            current: RwLock::new(None),
            build_lock: tokio::sync::Mutex::new(()),
            building: AtomicBool::new(false),
            last_error: Mutex::new(None),
            history: History::new(200),
        }
    }

    /// Wire a service from configuration with the given providers.
    pub fn from_config(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let source = Arc::new(PdfDirectory::from_config(&config.documents));
        Ok(Self::new(source, Chunker::from_config(&config.chunking)?, embedder, model)
            .with_top_k(config.retrieval.top_k)
            .with_batch_size(config.embedding.batch_size)
            .with_history_limit(config.server.history_limit)
            .with_telemetry(Telemetry::from_config(&config.telemetry)))
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history = History::new(limit);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// The index currently serving questions, if any.
    pub fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish(&self, index: Arc<VectorIndex>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(index);
    }

    /// Answer `question` from the current index.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let start_time = Utc::now();
        let snapshot = self.current_index();

        let outcome = async {
            let result = retrieve(
                snapshot.as_deref(),
                self.embedder.as_ref(),
                question,
                self.top_k,
            )
            .await?;
            compose(question, result, self.model.as_ref()).await
        }
        .await;

        match &outcome {
            Ok(answer) => {
                self.history.push(question.trim().to_string(), Sender::User);
                self.history.push(answer.text.clone(), Sender::Ai);
            }
            Err(err) => {
                tracing::warn!(code = err.code(), error = %err, "question failed");
            }
        }

        self.telemetry.report(RunRecord {
            question: question.to_string(),
            answer: outcome.as_ref().ok().map(|a| a.text.clone()),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            sources: outcome
                .as_ref()
                .map(|a| a.retrieval.hits.iter().map(|h| h.chunk.source.clone()).collect())
                .unwrap_or_default(),
            start_time,
            end_time: Utc::now(),
        });

        outcome
    }

    /// Reload the corpus, rebuild the index, and publish it.
    ///
    /// Only one rebuild runs at a time; a second caller gets
    /// [`Error::BuildInProgress`] immediately. On failure the previous index,
    /// if any, keeps serving.
    pub async fn rebuild(&self) -> Result<BuildReport> {
        let _guard = self
            .build_lock
            .try_lock()
            .map_err(|_| Error::BuildInProgress)?;
        let _flag = BuildingFlag::raise(&self.building);

        let started = Instant::now();
        tracing::info!(source = %self.source.describe(), "index build started");

        match self.build_index().await {
            Ok(index) => {
                let index = Arc::new(index);
                let report = BuildReport {
                    build_id: index.build_id().to_string(),
                    built_at: index.built_at(),
                    documents: index.document_count(),
                    chunks: index.len(),
                    digest: index.digest().to_string(),
                    elapsed: started.elapsed(),
                };
                self.publish(index);
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
                tracing::info!(
                    build_id = %report.build_id,
                    documents = report.documents,
                    chunks = report.chunks,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "index published"
                );
                Ok(report)
            }
            Err(err) => {
                let serving = self.current_index().map(|i| i.build_id().to_string());
                tracing::error!(
                    code = err.code(),
                    error = %err,
                    serving = serving.as_deref().unwrap_or("none"),
                    "index build failed; keeping previous index"
                );
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn build_index(&self) -> Result<VectorIndex> {
        let source = Arc::clone(&self.source);
        let documents = tokio::task::spawn_blocking(move || source.load())
            .await
            .map_err(|e| Error::Documents(format!("document loading task failed: {}", e)))??;

        if documents.is_empty() {
            return Err(Error::EmptyCorpus(self.source.describe()));
        }

        let chunks = self.chunker.split_all(&documents);
        if chunks.is_empty() {
            return Err(Error::EmptyCorpus(self.source.describe()));
        }
        tracing::info!(
            documents = documents.len(),
            chunks = chunks.len(),
            "chunked corpus"
        );

        VectorIndex::build(chunks, self.embedder.as_ref(), self.batch_size).await
    }

    pub fn status(&self) -> ServiceStatus {
        let index = self.current_index();
        let state = if self.building.load(Ordering::SeqCst) {
            ServiceState::Building
        } else if index.is_some() {
            ServiceState::Ready
        } else {
            ServiceState::Uninitialized
        };
        ServiceStatus {
            state,
            build_id: index.as_ref().map(|i| i.build_id().to_string()),
            built_at: index.as_ref().map(|i| i.built_at()),
            documents: index.as_ref().map_or(0, |i| i.document_count()),
            chunks: index.as_ref().map_or(0, |i| i.len()),
            last_error: self
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Chat history, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.history.snapshot()
    }
}
