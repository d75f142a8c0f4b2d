//! Pure-Rust local embeddings with tract (fallback for musl and Intel Mac).
//!
//! Downloads the ONNX graph and tokenizer from Hugging Face on first use,
//! caches them under `~/.cache/docqa/models`, and mean-pools the last hidden
//! state into L2-normalized sentence vectors.
#![cfg_attr(
    all(feature = "local-embeddings-fastembed", feature = "local-embeddings-tract"),
    allow(dead_code)
)]

use std::path::{Path, PathBuf};
use tract_onnx::prelude::*;

use crate::error::{Error, Result};

const ALL_MINILM_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";
const ALL_MINILM_DIMS: usize = 384;
const MAX_TOKENS: usize = 256;

fn fail(message: impl std::fmt::Display) -> Error {
    Error::embedding("local", message.to_string())
}

/// Files for a supported model: (onnx path in repo, tokenizer path in repo, dims).
fn model_files(model_name: &str) -> Result<(&'static str, &'static str, usize)> {
    match model_name {
        "all-minilm-l6-v2" => Ok(("onnx/model.onnx", "tokenizer.json", ALL_MINILM_DIMS)),
        other => Err(Error::Config(format!(
            "the tract backend only supports all-minilm-l6-v2 (requested '{}')",
            other
        ))),
    }
}

fn cache_root() -> Result<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let dir = PathBuf::from(home).join(".cache").join("docqa").join("models");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn fetch_once(repo: &str, file: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        return Ok(());
    }
    let url = format!("https://huggingface.co/{}/resolve/main/{}", repo, file);
    tracing::info!(%url, "downloading model file");
    let bytes = reqwest::blocking::get(&url)
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.bytes())
        .map_err(|e| fail(format!("download {}: {}", url, e)))?;
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &bytes)?;
    Ok(())
}

/// A loaded tokenizer plus optimized ONNX graph.
pub struct TractEncoder {
    tokenizer: tokenizers::Tokenizer,
    model: TypedModel,
    dims: usize,
}

impl TractEncoder {
    /// Fetch (if needed) and load `model_name`. Blocking.
    pub fn load(model_name: &str) -> Result<Self> {
        let (onnx_file, tokenizer_file, dims) = model_files(model_name)?;
        let model_dir = cache_root()?.join(model_name);
        let onnx_path = model_dir.join(onnx_file);
        let tokenizer_path = model_dir.join(tokenizer_file);
        fetch_once(ALL_MINILM_REPO, onnx_file, &onnx_path)?;
        fetch_once(ALL_MINILM_REPO, tokenizer_file, &tokenizer_path)?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| fail(format!("load tokenizer: {}", e)))?;
        let model = tract_onnx::onnx()
            .model_for_path(&onnx_path)
            .and_then(|m| m.into_optimized())
            .map_err(|e| fail(format!("load ONNX model: {}", e)))?;

        Ok(Self {
            tokenizer,
            model,
            dims,
        })
    }

    /// Embed `texts` in groups of `batch_size`. Blocking.
    pub fn encode(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>> {
        let plan = self
            .model
            .clone()
            .into_runnable()
            .map_err(|e| fail(format!("build tract plan: {}", e)))?;
        let mut out = Vec::with_capacity(texts.len());
        for group in texts.chunks(batch_size.max(1)) {
            let (ids, mask, lengths) = self.tokenize(group)?;
            let outputs = plan
                .run(tvec!(ids.into(), mask.into()))
                .map_err(|e| fail(format!("inference: {}", e)))?;
            let output = outputs
                .into_iter()
                .next()
                .ok_or_else(|| fail("model produced no output"))?;
            out.extend(self.pool(&output, &lengths)?);
        }
        Ok(out)
    }

    /// Token ids and attention mask for `group`, padded to the longest entry.
    fn tokenize(&self, group: &[String]) -> Result<(Tensor, Tensor, Vec<usize>)> {
        let encodings = group
            .iter()
            .map(|s| {
                self.tokenizer
                    .encode(s.as_str(), true)
                    .map_err(|e| fail(format!("tokenize: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = encodings.len();
        let width = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(1)
            .clamp(1, MAX_TOKENS);

        let mut ids = vec![0i64; rows * width];
        let mut mask = vec![0i64; rows * width];
        let mut lengths = Vec::with_capacity(rows);
        for (i, enc) in encodings.iter().enumerate() {
            let len = enc.get_ids().len().min(width);
            for (j, &id) in enc.get_ids().iter().take(len).enumerate() {
                ids[i * width + j] = id as i64;
                mask[i * width + j] = 1;
            }
            lengths.push(len);
        }

        let ids: Tensor = ndarray::Array2::from_shape_vec((rows, width), ids)
            .map_err(fail)?
            .into();
        let mask: Tensor = ndarray::Array2::from_shape_vec((rows, width), mask)
            .map_err(fail)?
            .into();
        Ok((ids, mask, lengths))
    }

    fn pool(&self, output: &Tensor, lengths: &[usize]) -> Result<Vec<Vec<f32>>> {
        let rows = lengths.len();
        let view = output.to_array_view::<f32>().map_err(fail)?;

        match view.shape().len() {
            // Already pooled: [batch, dims].
            2 => Ok((0..rows)
                .map(|i| normalize_l2(view.slice(ndarray::s![i, ..]).to_vec()))
                .collect()),
            // Token states: [batch, seq, dims], mean-pooled over real tokens.
            3 => Ok(lengths
                .iter()
                .enumerate()
                .map(|(i, &len)| {
                    let mut sum = vec![0f32; self.dims];
                    for j in 0..len {
                        for (k, v) in view.slice(ndarray::s![i, j, ..]).iter().enumerate() {
                            if k < self.dims {
                                sum[k] += v;
                            }
                        }
                    }
                    if len > 0 {
                        sum.iter_mut().for_each(|x| *x /= len as f32);
                    }
                    normalize_l2(sum)
                })
                .collect()),
            _ => Err(fail(format!("unexpected output shape {:?}", view.shape()))),
        }
    }
}

fn normalize_l2(mut v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-9 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}
