use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::catalog::search::{search_by_image_embedding, search_by_text_embedding, ProductHit};
use crate::config::VitrineConfig;

/// Run a text (or image, with `--image`) search from the terminal.
pub async fn search(
    config: &VitrineConfig,
    query: &str,
    image: Option<&Path>,
    limit: Option<usize>,
) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = crate::db::open_database(&db_path)?;
    let limit = limit.unwrap_or(config.search.default_limit);

    let service = Arc::new(crate::embedding::create_service(&config.embedding)?);

    let hits = match image {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("failed to read image {}", path.display()))?;
            let svc = Arc::clone(&service);
            let embedding = tokio::task::spawn_blocking(move || svc.embed_image(&bytes)).await??;
            search_by_image_embedding(&conn, &embedding, limit)?
        }
        None => {
            let query_text = query.to_string();
            let svc = Arc::clone(&service);
            let embedding =
                tokio::task::spawn_blocking(move || svc.embed_text(&query_text)).await??;
            search_by_text_embedding(&conn, &embedding, limit)?
        }
    };

    print_hits(&hits);
    Ok(())
}

fn print_hits(hits: &[ProductHit]) {
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    println!("Found {} result(s)\n", hits.len());
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "  {}. [{}] {} ({} / {}, {}) similarity: {:.4}",
            i + 1,
            hit.id,
            hit.product_display_name,
            hit.master_category,
            hit.sub_category,
            hit.base_colour,
            hit.similarity
        );
    }
}
