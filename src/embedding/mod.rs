//! Text and image embedding pipeline.
//!
//! The encoders ([`TextEncoder`], [`ImageEncoder`]) are opaque model runners that
//! return raw, un-normalized output. Everything that turns that output into the
//! vector contract lives beside them: [`features`] collapses encoder output shapes,
//! [`normalize`] applies L2 normalization, [`batch`] aligns sparse image batches,
//! and [`service::EmbeddingService`] ties it together for live queries and indexing.

pub mod batch;
pub mod clip;
pub mod features;
pub mod local;
pub mod locator;
pub mod normalize;
pub mod service;

use image::RgbImage;

use crate::error::{EmbedError, Result};
use features::FeatureOutput;

/// Text embedding width (all-MiniLM-L6-v2).
pub const TEXT_EMBEDDING_DIM: usize = 384;

/// Image embedding width (CLIP ViT-B/32 projection).
pub const IMAGE_EMBEDDING_DIM: usize = 512;

/// Runs a text model. Output vectors are raw (not normalized).
///
/// All methods are synchronous. Callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait TextEncoder: Send + Sync {
    /// Encode a batch of strings in one model call.
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Encode a single string.
    fn encode(&self, text: &str) -> Result<Vec<f32>> {
        self.encode_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Inference("text encoder returned no vector".into()))
    }
}

/// Runs an image model over a batch of RGB images in one call.
pub trait ImageEncoder: Send + Sync {
    fn encode_images(&self, images: &[RgbImage]) -> Result<FeatureOutput>;
}

/// Create the text encoder named in config.
///
/// Currently only `"local"` is supported (ONNX Runtime + all-MiniLM-L6-v2).
pub fn create_text_encoder(
    config: &crate::config::EmbeddingConfig,
) -> anyhow::Result<Box<dyn TextEncoder>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(local::LocalTextEncoder::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}

/// Create the image encoder named in config.
pub fn create_image_encoder(
    config: &crate::config::EmbeddingConfig,
) -> anyhow::Result<Box<dyn ImageEncoder>> {
    match config.provider.as_str() {
        "local" => Ok(Box::new(clip::ClipImageEncoder::new(config)?)),
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}

/// Load both encoders once and wrap them in a service.
pub fn create_service(
    config: &crate::config::EmbeddingConfig,
) -> anyhow::Result<service::EmbeddingService> {
    let text = create_text_encoder(config)?;
    let image = create_image_encoder(config)?;
    tracing::info!(
        text_model = %config.text_model,
        image_model = %config.image_model,
        "embedding service ready"
    );
    Ok(service::EmbeddingService::new(text, image))
}
