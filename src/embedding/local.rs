//! Local ONNX Runtime text encoder.
//!
//! Implements [`TextEncoder`] using all-MiniLM-L6-v2 via `ort`. Handles
//! tokenization, inference and attention-masked mean pooling. Normalization is
//! left to the caller so the single-item and batch policies stay in one place.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{TextEncoder, TEXT_EMBEDDING_DIM};
use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

/// Where the text model and tokenizer live for a given config.
pub fn text_model_paths(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
    let dir = crate::config::expand_tilde(&config.cache_dir).join(&config.text_model);
    (dir.join("model.onnx"), dir.join("tokenizer.json"))
}

/// MiniLM sentence encoder. The session is loaded once and shared.
pub struct LocalTextEncoder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex, which guarantees
// exclusive access during run().
unsafe impl Send for LocalTextEncoder {}
unsafe impl Sync for LocalTextEncoder {}

impl LocalTextEncoder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model_path, tokenizer_path) = text_model_paths(config);

        anyhow::ensure!(
            model_path.exists(),
            "ONNX text model not found at {}. Run `vitrine model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `vitrine model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX text model")?;

        tracing::info!(model = %model_path.display(), "text model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        tracing::info!(tokenizer = %tokenizer_path.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }
}

impl TextEncoder for LocalTextEncoder {
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(EmbedError::inference)?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids_flat = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask_flat = Vec::with_capacity(batch_size * seq_len);

        for encoding in &encodings {
            input_ids_flat.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask_flat.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor =
            Tensor::from_array((shape.clone(), input_ids_flat.into_boxed_slice()))
                .map_err(EmbedError::inference)?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask_flat.clone().into_boxed_slice()))
                .map_err(EmbedError::inference)?;
        // single segment, so token types are all zero
        let token_type_ids_tensor =
            Tensor::from_array((shape, vec![0i64; batch_size * seq_len].into_boxed_slice()))
                .map_err(EmbedError::inference)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedError::Inference(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            })
            .map_err(EmbedError::inference)?;

        // Output name varies by export; fall back to the first output.
        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (shape, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .map_err(EmbedError::inference)?;

        let dims: &[i64] = &shape;
        if dims.len() != 3 {
            return Err(EmbedError::UnsupportedOutputShape(format!(
                "token embeddings must be [batch, seq, dim], got {dims:?}"
            )));
        }
        if dims[2] != TEXT_EMBEDDING_DIM as i64 {
            return Err(EmbedError::DimensionMismatch {
                expected: TEXT_EMBEDDING_DIM,
                actual: dims[2] as usize,
            });
        }

        Ok(masked_mean_pool(
            data,
            &attention_mask_flat,
            batch_size,
            seq_len,
            dims[1] as usize,
            dims[2] as usize,
        ))
    }
}

/// Mean of token embeddings weighted by the attention mask, one row per input.
fn masked_mean_pool(
    data: &[f32],
    attention_mask: &[i64],
    batch_size: usize,
    mask_seq_len: usize,
    seq_len: usize,
    hidden_dim: usize,
) -> Vec<Vec<f32>> {
    let mut results = Vec::with_capacity(batch_size);
    for b in 0..batch_size {
        let mut sum = vec![0.0f32; hidden_dim];
        let mut count = 0.0f32;

        for s in 0..seq_len {
            let mask = attention_mask[b * mask_seq_len + s] as f32;
            if mask > 0.0 {
                let offset = (b * seq_len + s) * hidden_dim;
                for (d, acc) in sum.iter_mut().enumerate() {
                    *acc += data[offset + d] * mask;
                }
                count += mask;
            }
        }

        if count > 0.0 {
            for acc in &mut sum {
                *acc /= count;
            }
        }
        results.push(sum);
    }
    results
}
