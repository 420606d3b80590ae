//! CSV catalog source.
//!
//! Reads the product CSV into [`ProductRecord`]s. Rows that fail to parse are
//! skipped with a warning; rows without `text_for_embedding` get one composed
//! from their name and attributes.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};

use super::types::ProductRecord;

/// Parsed catalog plus the number of rows that were dropped.
#[derive(Debug, Default)]
pub struct CatalogLoad {
    pub records: Vec<ProductRecord>,
    pub skipped: usize,
}

/// Load a catalog CSV from disk.
pub fn load_catalog(path: &Path) -> Result<CatalogLoad> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open catalog {}", path.display()))?;
    read_catalog(file).with_context(|| format!("failed to read catalog {}", path.display()))
}

/// Parse catalog rows from any reader with a header line.
pub fn read_catalog<R: Read>(reader: R) -> Result<CatalogLoad> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut load = CatalogLoad::default();
    for (line, row) in reader.deserialize::<ProductRecord>().enumerate() {
        match row {
            Ok(mut record) => {
                let blank = record
                    .text_for_embedding
                    .as_deref()
                    .map_or(true, |t| t.trim().is_empty());
                if blank {
                    record.text_for_embedding = Some(record.compose_embedding_text());
                }
                load.records.push(record);
            }
            Err(e) => {
                tracing::warn!(row = line + 1, error = %e, "skipping malformed catalog row");
                load.skipped += 1;
            }
        }
    }

    tracing::info!(rows = load.records.len(), skipped = load.skipped, "catalog loaded");
    Ok(load)
}
