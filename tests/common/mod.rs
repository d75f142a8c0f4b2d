//! Deterministic stand-ins for the external providers.
#![allow(dead_code)]

use async_trait::async_trait;
use docqa::chunk::Chunker;
use docqa::embedding::{check_inputs, Embedder};
use docqa::error::{Error, Result};
use docqa::llm::LanguageModel;
use docqa::loader::DocumentSource;
use docqa::models::Document;
use docqa::service::QaService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tokio::sync::Notify;

pub const DIMS: usize = 512;

/// Bag-of-words embedder: every distinct lowercase word gets its own slot.
pub struct KeywordEmbedder {
    vocab: Mutex<HashMap<String, usize>>,
    failing: AtomicBool,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self {
            vocab: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut vocab = self.vocab.lock().unwrap();
        let mut v = vec![0.0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let word = word.to_lowercase();
            let next = vocab.len();
            let slot = *vocab.entry(word).or_insert(next) % DIMS;
            v[slot] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    fn provider(&self) -> &str {
        "keyword"
    }

    fn model_name(&self) -> &str {
        "keyword-bag"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        check_inputs(texts)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Embedding {
                provider: "keyword".into(),
                message: "provider unavailable".into(),
            });
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

/// Answers with the top-ranked context passage, verbatim.
pub struct EchoModel {
    pub prompts: Mutex<Vec<String>>,
}

impl EchoModel {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for EchoModel {
    fn provider(&self) -> &str {
        "echo"
    }

    fn model_name(&self) -> &str {
        "echo-1"
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let answer = prompt
            .split_once("[1] (source: ")
            .and_then(|(_, rest)| rest.split_once('\n'))
            .map(|(_, body)| body.split("\n\n").next().unwrap_or("").trim().to_string())
            .unwrap_or_else(|| "I don't know.".to_string());
        Ok(answer)
    }
}

/// A replaceable in-memory corpus, optionally held at a gate during loading.
pub struct MemorySource {
    docs: Mutex<Vec<Document>>,
    gate: Arc<(Mutex<bool>, Condvar)>,
    pub entered: Arc<Notify>,
}

impl MemorySource {
    pub fn new(docs: Vec<Document>) -> Self {
        Self {
            docs: Mutex::new(docs),
            gate: Arc::new((Mutex::new(true), Condvar::new())),
            entered: Arc::new(Notify::new()),
        }
    }

    pub fn set(&self, docs: Vec<Document>) {
        *self.docs.lock().unwrap() = docs;
    }

    /// Hold subsequent loads until [`open`](Self::open) is called.
    pub fn close(&self) {
        *self.gate.0.lock().unwrap() = false;
    }

    pub fn open(&self) {
        *self.gate.0.lock().unwrap() = true;
        self.gate.1.notify_all();
    }
}

impl DocumentSource for MemorySource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Result<Vec<Document>> {
        let (lock, cvar) = &*self.gate;
        let mut open = lock.lock().unwrap();
        if !*open {
            self.entered.notify_one();
        }
        while !*open {
            open = cvar.wait(open).unwrap();
        }
        drop(open);
        Ok(self.docs.lock().unwrap().clone())
    }
}

pub struct Harness {
    pub service: Arc<QaService>,
    pub source: Arc<MemorySource>,
    pub embedder: Arc<KeywordEmbedder>,
    pub model: Arc<EchoModel>,
}

pub fn harness(docs: Vec<Document>, chunk_size: usize, overlap: usize) -> Harness {
    let source = Arc::new(MemorySource::new(docs));
    let embedder = Arc::new(KeywordEmbedder::new());
    let model = Arc::new(EchoModel::new());
    let service = QaService::new(
        source.clone(),
        Chunker::new(chunk_size, overlap).unwrap(),
        embedder.clone(),
        model.clone(),
    )
    .with_top_k(10)
    .with_batch_size(4);
    Harness {
        service: Arc::new(service),
        source,
        embedder,
        model,
    }
}

pub fn capitals() -> Vec<Document> {
    vec![
        Document::new("a.pdf", "A is the capital of X."),
        Document::new("b.pdf", "B is the capital of Y."),
    ]
}

pub fn rivers() -> Vec<Document> {
    vec![
        Document::new("rivers.pdf", "The Nile flows north through Egypt."),
        Document::new("lakes.pdf", "Lake Baikal is the deepest lake."),
    ]
}

/// A one-page PDF whose content stream shows `phrase` in Helvetica.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >> stream\n{}\nendstream", stream.len(), stream),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
