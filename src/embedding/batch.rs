//! Sparse image batches.
//!
//! A catalog batch has one slot per row, and some rows have no usable image.
//! [`embed_image_batch`] decodes what it can, sends only the survivors to the
//! encoder in a single call, and scatters the results back so that slot `i` of
//! the output always belongs to row `i` of the input.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader, RgbImage};

use super::features::extract_features;
use super::normalize::l2_normalize_rows;
use super::{ImageEncoder, IMAGE_EMBEDDING_DIM};
use crate::error::Result;

/// Valid inputs of a batch plus the original positions they came from.
#[derive(Debug)]
pub struct BatchAlignment<T> {
    /// Length of the original input list.
    pub len: usize,
    /// Original index of each entry in `items`.
    pub indices: Vec<usize>,
    pub items: Vec<T>,
}

impl<T> BatchAlignment<T> {
    /// Keep the `Some` entries and remember where they sat.
    pub fn from_options(inputs: impl IntoIterator<Item = Option<T>>) -> Self {
        let mut alignment = Self {
            len: 0,
            indices: Vec::new(),
            items: Vec::new(),
        };
        for (i, input) in inputs.into_iter().enumerate() {
            alignment.len = i + 1;
            if let Some(item) = input {
                alignment.indices.push(i);
                alignment.items.push(item);
            }
        }
        alignment
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Place one result per surviving item back at its original position.
    pub fn scatter<U>(&self, results: Vec<U>) -> Vec<Option<U>> {
        debug_assert_eq!(results.len(), self.indices.len());
        let mut out: Vec<Option<U>> = std::iter::repeat_with(|| None).take(self.len).collect();
        for (&i, result) in self.indices.iter().zip(results) {
            out[i] = Some(result);
        }
        out
    }
}

/// Decode an image file to RGB. Missing or corrupt files yield `None`.
///
/// The format is sniffed from the file's bytes, so a PNG saved as `.jpg` still loads.
pub fn load_rgb(path: &Path) -> Option<RgbImage> {
    match decode_file(path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "skipping undecodable image");
            None
        }
    }
}

fn decode_file(path: &Path) -> image::ImageResult<DynamicImage> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

/// Embed a batch of optional image paths with one encoder call.
///
/// The output has the same length as `paths`; a slot is `None` when its path was
/// absent or the file could not be decoded. Rows are normalized with the batch
/// epsilon policy.
pub fn embed_image_batch(
    encoder: &dyn ImageEncoder,
    paths: &[Option<PathBuf>],
) -> Result<Vec<Option<Vec<f32>>>> {
    let alignment =
        BatchAlignment::from_options(paths.iter().map(|p| p.as_deref().and_then(load_rgb)));

    if alignment.is_empty() {
        return Ok(vec![None; paths.len()]);
    }

    let output = encoder.encode_images(&alignment.items)?;
    let rows = extract_features(output, alignment.items.len(), IMAGE_EMBEDDING_DIM)?;
    let vectors = l2_normalize_rows(rows);

    tracing::debug!(
        requested = paths.len(),
        encoded = vectors.len(),
        "image batch embedded"
    );

    Ok(alignment.scatter(vectors))
}
