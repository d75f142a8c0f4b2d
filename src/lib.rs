//! # docqa
//!
//! Document-grounded question answering over a directory of PDFs.
//!
//! PDFs are extracted and split into overlapping chunks, embedded into an
//! in-memory vector index, and queried by similarity. The top chunks are
//! handed to a language model with an instruction to answer only from that
//! context. An HTTP API exposes chat and on-demand reprocessing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌──────────┐   ┌─────────────┐
//! │  Loader  │──▶│ Chunker │──▶│ Embedder │──▶│ VectorIndex │
//! │ PDF dir  │   └─────────┘   └──────────┘   └──────┬──────┘
//! └──────────┘                                       │ search
//!                                                    ▼
//!   question ─────────────────────────────────▶ Retriever ──▶ Composer ──▶ Answer
//!                                                               (LLM)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration |
//! | [`error`] | Error taxonomy and codes |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`loader`] | Document directory scanning |
//! | [`chunk`] | Overlapping text chunking |
//! | [`embedding`] | Embedding providers |
//! | [`index`] | In-memory vector index |
//! | [`retrieve`] | Query-time retrieval |
//! | [`llm`] | Language model clients |
//! | [`compose`] | Prompt assembly and answering |
//! | [`service`] | Index lifecycle and orchestration |
//! | [`server`] | HTTP API |
//! | [`telemetry`] | Optional LangSmith run reporting |

pub mod chunk;
pub mod compose;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod llm;
pub mod loader;
pub mod models;
pub mod retrieve;
pub mod server;
pub mod service;
pub mod telemetry;

pub use error::{Error, Result};
