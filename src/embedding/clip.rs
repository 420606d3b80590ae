//! CLIP vision encoder over ONNX Runtime.
//!
//! Preprocessing follows the CLIP processor: shortest edge resized to 224,
//! center crop to 224x224, per-channel mean/std normalization, NCHW layout.
//! The session output is mapped onto [`FeatureOutput`] by name, without any
//! pooling or normalization here.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::{ArrayD, IxDyn};
use ort::session::Session;
use ort::value::{DynValue, Tensor};

use super::features::{FeatureOutput, ModelOutput};
use super::ImageEncoder;
use crate::config::EmbeddingConfig;
use crate::error::{EmbedError, Result};

/// Square input resolution for ViT-B/32.
pub const INPUT_SIZE: u32 = 224;

const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// Where the vision model lives for a given config.
pub fn vision_model_path(config: &EmbeddingConfig) -> PathBuf {
    crate::config::expand_tilde(&config.cache_dir)
        .join(&config.image_model)
        .join("vision_model.onnx")
}

/// CLIP image tower. Loaded once at startup, shared read-only afterwards.
pub struct ClipImageEncoder {
    session: Mutex<Session>,
}

// Safety: Session is behind a Mutex, which guarantees exclusive access during run().
unsafe impl Send for ClipImageEncoder {}
unsafe impl Sync for ClipImageEncoder {}

impl ClipImageEncoder {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_path = vision_model_path(config);
        anyhow::ensure!(
            model_path.exists(),
            "ONNX vision model not found at {}. Run `vitrine model download` first.",
            model_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX vision model")?;

        tracing::info!(model = %model_path.display(), "vision model loaded");

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl ImageEncoder for ClipImageEncoder {
    fn encode_images(&self, images: &[RgbImage]) -> Result<FeatureOutput> {
        if images.is_empty() {
            return Err(EmbedError::InvalidInput("no images to encode".into()));
        }

        let pixels = preprocess(images);
        let size = INPUT_SIZE as i64;
        let shape = vec![images.len() as i64, 3, size, size];
        let input = Tensor::from_array((shape, pixels.into_boxed_slice()))
            .map_err(EmbedError::inference)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| EmbedError::Inference(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs!["pixel_values" => input])
            .map_err(EmbedError::inference)?;

        if let Some(embeds) = outputs.get("image_embeds") {
            return Ok(FeatureOutput::Tensor(to_array(embeds)?));
        }

        let pooler_output = outputs.get("pooler_output").map(to_array).transpose()?;
        let last_hidden_state = outputs.get("last_hidden_state").map(to_array).transpose()?;
        Ok(FeatureOutput::Wrapped(ModelOutput {
            pooler_output,
            last_hidden_state,
        }))
    }
}

fn to_array(value: &DynValue) -> Result<ArrayD<f32>> {
    let (shape, data) = value
        .try_extract_tensor::<f32>()
        .map_err(EmbedError::inference)?;
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
        .map_err(|e| EmbedError::UnsupportedOutputShape(e.to_string()))
}

/// Resize, crop and normalize a batch into a flat `[batch, 3, 224, 224]` buffer.
pub fn preprocess(images: &[RgbImage]) -> Vec<f32> {
    let size = INPUT_SIZE as usize;
    let plane = size * size;
    let mut out = vec![0.0f32; images.len() * 3 * plane];

    for (b, image) in images.iter().enumerate() {
        let cropped = resize_and_crop(image);
        let base = b * 3 * plane;
        for (x, y, pixel) in cropped.enumerate_pixels() {
            let offset = y as usize * size + x as usize;
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                out[base + c * plane + offset] = (value - CLIP_MEAN[c]) / CLIP_STD[c];
            }
        }
    }
    out
}

fn resize_and_crop(image: &RgbImage) -> RgbImage {
    let (w, h) = image.dimensions();
    let scale = INPUT_SIZE as f32 / w.min(h).max(1) as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(INPUT_SIZE);
    let new_h = ((h as f32 * scale).round() as u32).max(INPUT_SIZE);
    let resized = imageops::resize(image, new_w, new_h, FilterType::CatmullRom);

    let x = (new_w - INPUT_SIZE) / 2;
    let y = (new_h - INPUT_SIZE) / 2;
    imageops::crop_imm(&resized, x, y, INPUT_SIZE, INPUT_SIZE).to_image()
}
