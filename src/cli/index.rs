//! CLI `index` command: embed a catalog CSV into the product store.

use anyhow::{Context, Result};
use std::path::Path;

use crate::catalog::indexer::CatalogIndexer;
use crate::catalog::source::load_catalog;
use crate::config::VitrineConfig;
use crate::db;
use crate::embedding::locator::ImageLocator;

pub fn index(config: &VitrineConfig, csv: &Path, batch_size: Option<usize>) -> Result<()> {
    let catalog = load_catalog(csv)?;
    if catalog.records.is_empty() {
        println!("No products found in {}", csv.display());
        return Ok(());
    }

    let db_path = config.resolved_db_path();
    let mut conn = db::open_database(&db_path)?;
    db::check_model_drift(&conn, &config.embedding.text_model, &config.embedding.image_model)?;

    let service = crate::embedding::create_service(&config.embedding)?;
    let locator = ImageLocator::new(
        config.resolved_image_dir(),
        config.catalog.index_probe_order.as_slice(),
    );
    let indexer = CatalogIndexer::new(
        &service,
        &locator,
        batch_size.unwrap_or(config.catalog.batch_size),
    );

    println!(
        "Indexing {} products from {} (batch size {}, images from {})",
        catalog.records.len(),
        csv.display(),
        indexer.batch_size(),
        locator.root().display()
    );

    let pb = super::row_progress(catalog.records.len() as u64)?;
    let report = indexer
        .run(&mut conn, &catalog.records, |batch| pb.inc(batch.rows as u64))
        .context("indexing failed")?;
    pb.finish_and_clear();

    db::migrations::set_embedding_models(
        &conn,
        &config.embedding.text_model,
        &config.embedding.image_model,
    )?;

    println!("Indexed {} products in {} batches", report.rows, report.batches);
    println!("  With image vector:    {}", report.with_image);
    println!("  Without image vector: {}", report.without_image);
    println!("  Skipped CSV rows:     {}", catalog.skipped);
    println!(
        "  ANN index rows:       {} text, {} image",
        report.text_index_rows, report.image_index_rows
    );
    Ok(())
}
