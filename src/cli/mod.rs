pub mod index;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use tokio::io::AsyncWriteExt;

use crate::config::EmbeddingConfig;
use crate::embedding::clip::vision_model_path;
use crate::embedding::local::text_model_paths;

const TEXT_MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";
const VISION_MODEL_URL: &str =
    "https://huggingface.co/Xenova/clip-vit-base-patch32/resolve/main/onnx/vision_model.onnx";

/// Download the text encoder, its tokenizer and the CLIP vision encoder.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let (text_model, tokenizer) = text_model_paths(config);
    let vision_model = vision_model_path(config);

    fetch_if_missing("text model.onnx (~90MB)", TEXT_MODEL_URL, &text_model).await?;
    fetch_if_missing("tokenizer.json", TOKENIZER_URL, &tokenizer).await?;
    fetch_if_missing("vision_model.onnx (~350MB)", VISION_MODEL_URL, &vision_model).await?;

    println!("Model download complete. Ready for use.");
    Ok(())
}

async fn fetch_if_missing(label: &str, url: &str, dest: &Path) -> Result<()> {
    if dest.exists() {
        println!("{label} already exists at {}", dest.display());
        return Ok(());
    }
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create cache dir: {}", parent.display()))?;
    }
    println!("Downloading {label}...");
    download_file(url, dest).await?;
    println!("Saved to {}", dest.display());
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk)
            .await
            .context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Bar used by `index`: one tick per product row.
pub(crate) fn row_progress(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.green/white} {pos}/{len} products ({per_sec}, {eta})")?
            .progress_chars("##-"),
    );
    Ok(pb)
}
