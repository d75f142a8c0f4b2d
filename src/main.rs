//! # docqa CLI
//!
//! Answers questions about a directory of PDF documents.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa serve` | Build the index, then serve the HTTP API |
//! | `docqa index` | Build the index once and print a summary |
//! | `docqa ask "<question>"` | Build the index and answer one question |
//!
//! ## Examples
//!
//! ```bash
//! export GROQ_API_KEY=gsk_...
//! DOCS_DIR=./files docqa serve
//! docqa --config ./docqa.toml ask "What is the refund policy?"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use docqa::chunk::Chunker;
use docqa::config::{load_config, Config};
use docqa::embedding::{create_embedder, Embedder};
use docqa::index::VectorIndex;
use docqa::llm::ChatCompletionsModel;
use docqa::loader::load_documents;
use docqa::service::QaService;

/// Question answering over a folder of PDFs.
#[derive(Parser)]
#[command(name = "docqa", version, about)]
struct Cli {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from the document directory, then serve the HTTP API.
    ///
    /// Startup fails if the initial build fails.
    Serve {
        /// Override `server.bind` (e.g. `0.0.0.0:8000`).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Build the index once and report what was indexed.
    ///
    /// Does not contact the language model and needs no API key.
    Index,

    /// Build the index and answer a single question.
    Ask {
        question: String,

        /// Number of context chunks (overrides `retrieval.top_k`).
        #[arg(long)]
        top_k: Option<usize>,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DOCQA_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_service(config: &Config) -> anyhow::Result<Arc<QaService>> {
    let api_key = config.require_llm_key()?;
    let embedder = create_embedder(&config.embedding)?;
    let model = Arc::new(ChatCompletionsModel::new(&config.llm, api_key)?);
    tracing::info!(
        embedder = embedder.model_name(),
        model = %config.llm.model,
        docs = %config.documents.root.display(),
        "service configured"
    );
    Ok(Arc::new(QaService::from_config(config, embedder, model)?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            let service = build_service(&config)?;
            let report = service
                .rebuild()
                .await
                .context("initial index build failed")?;
            tracing::info!(
                documents = report.documents,
                chunks = report.chunks,
                "initial index ready"
            );
            docqa::server::run_server(&config.server.bind, service).await?;
        }
        Commands::Index => {
            let embedder = create_embedder(&config.embedding)?;
            let chunker = Chunker::from_config(&config.chunking)?;
            let docs_config = config.documents.clone();
            let documents = tokio::task::spawn_blocking(move || load_documents(&docs_config))
                .await
                .context("document loading task failed")??;
            let chunks = chunker.split_all(&documents);
            let index =
                VectorIndex::build(chunks, embedder.as_ref(), config.embedding.batch_size).await?;

            println!("Indexed {}", config.documents.root.display());
            println!("  documents: {}", index.document_count());
            println!("  chunks:    {}", index.len());
            println!("  dims:      {}", index.dims());
            println!("  digest:    {}", index.digest());
        }
        Commands::Ask { question, top_k } => {
            if let Some(k) = top_k {
                config.retrieval.top_k = k;
            }
            let service = build_service(&config)?;
            service.rebuild().await.context("index build failed")?;
            let answer = service.ask(&question).await?;

            println!("{}\n", answer.text);
            println!("Sources ({:.2}s):", answer.processing_time.as_secs_f64());
            for (i, hit) in answer.retrieval.hits.iter().enumerate() {
                println!(
                    "  {}. {} #{} (score {:.3})",
                    i + 1,
                    hit.chunk.source,
                    hit.chunk.chunk_index,
                    hit.score
                );
            }
        }
    }

    Ok(())
}
