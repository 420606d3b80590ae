//! Embedding service shared by the HTTP layer and the catalog indexer.
//!
//! Built once at startup around the loaded encoders and passed by reference (or
//! behind an `Arc`) afterwards. Single-item methods use the zero-skip
//! normalization policy; batch methods use the epsilon policy.

use std::path::PathBuf;

use super::batch::embed_image_batch;
use super::features::extract_single;
use super::normalize::{l2_normalize, l2_normalize_batch};
use super::{ImageEncoder, TextEncoder, IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};
use crate::error::{EmbedError, Result};

/// Content type some clients send for any upload.
pub const GENERIC_BINARY_CONTENT_TYPE: &str = "application/octet-stream";

pub struct EmbeddingService {
    text: Box<dyn TextEncoder>,
    image: Box<dyn ImageEncoder>,
}

impl EmbeddingService {
    pub fn new(text: Box<dyn TextEncoder>, image: Box<dyn ImageEncoder>) -> Self {
        Self { text, image }
    }

    /// Embed one query string into a 384-d unit vector.
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if text.is_empty() {
            return Err(EmbedError::InvalidInput("text must not be empty".into()));
        }
        let raw = self.text.encode(text)?;
        check_dim(raw.len(), TEXT_EMBEDDING_DIM)?;
        Ok(l2_normalize(&raw))
    }

    /// Embed many strings in one encoder call. Empty strings are embedded as-is.
    pub fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let raw = self.text.encode_batch(texts)?;
        if raw.len() != texts.len() {
            return Err(EmbedError::Inference(format!(
                "text encoder returned {} vectors for {} inputs",
                raw.len(),
                texts.len()
            )));
        }
        for v in &raw {
            check_dim(v.len(), TEXT_EMBEDDING_DIM)?;
        }
        Ok(l2_normalize_batch(raw))
    }

    /// Decode raw image bytes and embed them into a 512-d unit vector.
    pub fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        if bytes.is_empty() {
            return Err(EmbedError::InvalidInput("uploaded image is empty".into()));
        }
        let image = image::load_from_memory(bytes)?.to_rgb8();
        let output = self.image.encode_images(std::slice::from_ref(&image))?;
        let raw = extract_single(output, IMAGE_EMBEDDING_DIM)?;
        Ok(l2_normalize(&raw))
    }

    /// [`Self::embed_image`] behind the upload content-type check.
    pub fn embed_image_upload(&self, bytes: &[u8], content_type: Option<&str>) -> Result<Vec<f32>> {
        check_image_content_type(content_type)?;
        self.embed_image(bytes)
    }

    /// Embed a sparse batch of image files. See [`embed_image_batch`].
    pub fn embed_image_paths(&self, paths: &[Option<PathBuf>]) -> Result<Vec<Option<Vec<f32>>>> {
        embed_image_batch(self.image.as_ref(), paths)
    }
}

/// Accept `image/*`, the generic binary type, or no declared type at all.
pub fn check_image_content_type(content_type: Option<&str>) -> Result<()> {
    let Some(content_type) = content_type else {
        return Ok(());
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if essence.is_empty() || essence.starts_with("image/") || essence == GENERIC_BINARY_CONTENT_TYPE {
        Ok(())
    } else {
        Err(EmbedError::InvalidInput(format!(
            "uploaded file must be an image, got {content_type}"
        )))
    }
}

pub(crate) fn check_dim(actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(EmbedError::DimensionMismatch { expected, actual })
    }
}
