//! Batch indexing pipeline.
//!
//! For each batch of catalog records: one text-encoder call over every row, one
//! image-encoder call over the rows whose image resolves and decodes, then one
//! transactional upsert. When all batches are in, [`CatalogIndexer::finish`]
//! rebuilds the ANN tables and stamps the run in `schema_meta`.

use std::path::PathBuf;

use rusqlite::Connection;
use serde::Serialize;

use super::store::{build_vector_indexes, upsert_batch, VectorIndexStats};
use super::types::{EmbeddedProduct, ProductRecord};
use crate::db::migrations::{set_meta, LAST_INDEXED_KEY};
use crate::embedding::locator::ImageLocator;
use crate::embedding::service::EmbeddingService;
use crate::error::Result;

/// What one batch wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub rows: usize,
    pub with_image: usize,
}

/// Totals for a full indexing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub batches: usize,
    pub rows: usize,
    pub with_image: usize,
    pub without_image: usize,
    pub text_index_rows: u64,
    pub image_index_rows: u64,
}

pub struct CatalogIndexer<'a> {
    service: &'a EmbeddingService,
    locator: &'a ImageLocator,
    batch_size: usize,
}

impl<'a> CatalogIndexer<'a> {
    pub fn new(service: &'a EmbeddingService, locator: &'a ImageLocator, batch_size: usize) -> Self {
        Self {
            service,
            locator,
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Compute both vectors for a batch without touching the store.
    pub fn embed_batch(&self, records: &[ProductRecord]) -> Result<Vec<EmbeddedProduct>> {
        let texts: Vec<&str> = records.iter().map(ProductRecord::embedding_text).collect();
        let text_vectors = self.service.embed_texts(&texts)?;

        let paths: Vec<Option<PathBuf>> = records
            .iter()
            .map(|r| {
                let found = self.locator.locate_record(r.id, r.image_file.as_deref());
                if found.is_none() {
                    tracing::debug!(id = r.id, "no image file for product");
                }
                found
            })
            .collect();
        let image_vectors = self.service.embed_image_paths(&paths)?;

        Ok(records
            .iter()
            .cloned()
            .zip(text_vectors)
            .zip(image_vectors)
            .map(|((record, text), image)| EmbeddedProduct {
                record,
                text_embedding: Some(text),
                image_embedding: image,
            })
            .collect())
    }

    /// Embed and persist one batch. Nothing from the batch is written on error.
    pub fn index_batch(&self, conn: &mut Connection, records: &[ProductRecord]) -> Result<BatchOutcome> {
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let products = self.embed_batch(records)?;
        let with_image = products.iter().filter(|p| p.image_embedding.is_some()).count();
        let rows = upsert_batch(conn, &products)?;

        tracing::info!(
            rows,
            with_image,
            first_id = records[0].id,
            "indexed batch"
        );
        Ok(BatchOutcome { rows, with_image })
    }

    /// Rebuild the ANN tables and record the completion time.
    pub fn finish(&self, conn: &mut Connection) -> Result<VectorIndexStats> {
        let stats = build_vector_indexes(conn)?;
        set_meta(conn, LAST_INDEXED_KEY, &chrono::Utc::now().to_rfc3339())?;
        Ok(stats)
    }

    /// Index every record in fixed-size batches, then finish.
    ///
    /// `on_batch` is called after each committed batch (progress reporting).
    /// The first failing batch stops the run; earlier batches stay committed.
    pub fn run(
        &self,
        conn: &mut Connection,
        records: &[ProductRecord],
        mut on_batch: impl FnMut(&BatchOutcome),
    ) -> Result<IndexReport> {
        let mut report = IndexReport::default();
        for chunk in records.chunks(self.batch_size) {
            let outcome = self.index_batch(conn, chunk)?;
            report.batches += 1;
            report.rows += outcome.rows;
            report.with_image += outcome.with_image;
            on_batch(&outcome);
        }
        report.without_image = report.rows - report.with_image;

        let stats = self.finish(conn)?;
        report.text_index_rows = stats.text_rows;
        report.image_index_rows = stats.image_rows;

        tracing::info!(
            batches = report.batches,
            rows = report.rows,
            with_image = report.with_image,
            "catalog indexing complete"
        );
        Ok(report)
    }
}
