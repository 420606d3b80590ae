#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{Rgb, RgbImage};
use ndarray::Array2;
use rusqlite::Connection;
use vitrine::catalog::types::ProductRecord;
use vitrine::db;
use vitrine::embedding::features::FeatureOutput;
use vitrine::embedding::service::EmbeddingService;
use vitrine::embedding::{ImageEncoder, TextEncoder, IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};
use vitrine::error::{EmbedError, Result};

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::load_sqlite_vec();
    let mut conn = Connection::open_in_memory().unwrap();
    db::schema::init_schema(&conn).unwrap();
    db::migrations::run_migrations(&mut conn).unwrap();
    conn
}

/// Deterministic unit vector with a spike at position `seed % dim`.
pub fn test_embedding(seed: usize, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    v[seed % dim] = 1.0;
    v
}

/// Text encoder whose raw output is a spike chosen from the text bytes.
/// The empty string encodes to the zero vector.
pub struct FakeText {
    pub calls: Arc<AtomicUsize>,
}

impl FakeText {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slot(text: &str) -> usize {
        text.bytes().map(usize::from).sum::<usize>() % TEXT_EMBEDDING_DIM
    }
}

impl TextEncoder for FakeText {
    fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0.0f32; TEXT_EMBEDDING_DIM];
                if !t.is_empty() {
                    v[Self::slot(t)] = 3.0;
                }
                v
            })
            .collect())
    }
}

/// Text encoder that always fails.
pub struct BrokenText;

impl TextEncoder for BrokenText {
    fn encode_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Err(EmbedError::Inference("session crashed".into()))
    }
}

/// Image encoder returning a plain `[B, 512]` tensor. Row `i` has a spike at
/// the red channel of image `i`'s top-left pixel.
pub struct FakeImage {
    pub calls: Arc<AtomicUsize>,
}

impl FakeImage {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl ImageEncoder for FakeImage {
    fn encode_images(&self, images: &[RgbImage]) -> Result<FeatureOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Array2::<f32>::zeros((images.len(), IMAGE_EMBEDDING_DIM));
        for (i, img) in images.iter().enumerate() {
            let red = img.get_pixel(0, 0).0[0] as usize;
            out[[i, red]] = 2.0;
            out[[i, IMAGE_EMBEDDING_DIM - 1]] = 1.0;
        }
        Ok(FeatureOutput::Tensor(out.into_dyn()))
    }
}

/// Service over the fake encoders; returns the call counters (text, image).
pub fn fake_service() -> (EmbeddingService, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let text = FakeText::new();
    let image = FakeImage::new();
    let text_calls = Arc::clone(&text.calls);
    let image_calls = Arc::clone(&image.calls);
    (
        EmbeddingService::new(Box::new(text), Box::new(image)),
        text_calls,
        image_calls,
    )
}

/// Write a solid-colour image; the format follows the file extension.
pub fn write_image(dir: &Path, name: &str, red: u8) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(8, 8, Rgb([red, 40, 90])).save(&path).unwrap();
    path
}

/// Write bytes that carry an image extension but do not decode.
pub fn write_corrupt(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"definitely not a jpeg").unwrap();
    path
}

/// Encode a solid-colour PNG in memory.
pub fn png_bytes(red: u8) -> Vec<u8> {
    let mut buf = std::io::Cursor::new(Vec::new());
    RgbImage::from_pixel(8, 8, Rgb([red, 40, 90]))
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Catalog record with composed embedding text.
pub fn record(id: i64, name: &str) -> ProductRecord {
    let mut r = ProductRecord::new(id, name);
    r.master_category = "Apparel".into();
    r.sub_category = "Topwear".into();
    r.article_type = "Shirts".into();
    r.base_colour = "Blue".into();
    r.text_for_embedding = Some(r.compose_embedding_text());
    r
}
