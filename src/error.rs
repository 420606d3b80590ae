//! Error taxonomy for the embedding and indexing core.
//!
//! Bootstrap code (config, model loading, CLI commands) uses `anyhow`. Everything
//! that runs per request or per batch returns [`EmbedError`], so callers can tell a
//! rejected input apart from a model-contract violation or a storage failure.

use thiserror::Error;

/// Errors raised by the embedding pipeline, the batch aligner, and the store.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// Empty text, empty image bytes, or a disallowed content type.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Image bytes could not be decoded.
    #[error("failed to decode image: {0}")]
    InvalidImage(#[from] image::ImageError),

    /// The image encoder returned none of the known output shapes.
    #[error("unsupported image feature output: {0}")]
    UnsupportedOutputShape(String),

    /// The encoder produced vectors of the wrong width (model/config drift).
    #[error("expected {expected}-d embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The model runtime failed (tokenizer, session, tensor extraction).
    #[error("model inference failed: {0}")]
    Inference(String),

    /// A write or query against the product store failed.
    #[error("persistence failure: {0}")]
    Persistence(#[from] rusqlite::Error),
}

impl EmbedError {
    /// Whether the error describes a bad request rather than a server-side fault.
    pub fn is_caller_facing(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::InvalidImage(_))
    }

    pub(crate) fn inference(err: impl std::fmt::Display) -> Self {
        Self::Inference(err.to_string())
    }
}

pub type Result<T, E = EmbedError> = std::result::Result<T, E>;
