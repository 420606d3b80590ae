//! KNN search over the vec0 indexes.

use rusqlite::{params, Connection};
use serde::Serialize;

use super::embedding_to_bytes;
use crate::embedding::normalize::l2_norm;
use crate::embedding::service::check_dim;
use crate::embedding::{IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};
use crate::error::Result;

const TEXT_INDEX: &str = "products_text_vec";
const IMAGE_INDEX: &str = "products_image_vec";

/// Largest `k` sqlite-vec accepts for a KNN query.
pub const MAX_SEARCH_LIMIT: usize = 4096;

/// One ranked product.
#[derive(Debug, Clone, Serialize)]
pub struct ProductHit {
    pub id: i64,
    pub product_display_name: String,
    pub master_category: String,
    pub sub_category: String,
    pub base_colour: String,
    /// `1 - cosine distance`; higher is closer.
    pub similarity: f64,
}

/// Products nearest to a 384-d query vector.
pub fn search_by_text_embedding(
    conn: &Connection,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<ProductHit>> {
    check_dim(embedding.len(), TEXT_EMBEDDING_DIM)?;
    nearest_products(conn, TEXT_INDEX, embedding, limit)
}

/// Products nearest to a 512-d query vector. Only rows with an image vector take part.
pub fn search_by_image_embedding(
    conn: &Connection,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<ProductHit>> {
    check_dim(embedding.len(), IMAGE_EMBEDDING_DIM)?;
    nearest_products(conn, IMAGE_INDEX, embedding, limit)
}

fn nearest_products(
    conn: &Connection,
    index: &str,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<ProductHit>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    if l2_norm(embedding) == 0.0 {
        tracing::debug!(index, "zero query vector has no cosine neighbours");
        return Ok(Vec::new());
    }
    let limit = limit.min(MAX_SEARCH_LIMIT);
    if !index_exists(conn, index)? {
        tracing::warn!(index, "vector index missing; run `vitrine index` first");
        return Ok(Vec::new());
    }

    let neighbours = vector_search(conn, index, embedding, limit)?;

    let mut stmt = conn.prepare(
        "SELECT product_display_name, master_category, sub_category, base_colour \
         FROM products WHERE id = ?1",
    )?;
    let mut hits = Vec::with_capacity(neighbours.len());
    for (id, distance) in neighbours {
        let mut rows = stmt.query([id])?;
        let Some(row) = rows.next()? else {
            tracing::debug!(id, "index row has no product; skipping");
            continue;
        };
        hits.push(ProductHit {
            id,
            product_display_name: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
            master_category: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            sub_category: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            base_colour: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            similarity: 1.0 - distance,
        });
    }
    Ok(hits)
}

/// Vector KNN search via sqlite-vec. Returns (product id, cosine distance).
///
/// Rows whose distance is undefined (NULL or NaN) are dropped.
fn vector_search(
    conn: &Connection,
    index: &str,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<(i64, f64)>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT rowid, distance FROM {index} \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![embedding_to_bytes(embedding), limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Option<f64>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows
        .into_iter()
        .filter_map(|(id, distance)| distance.filter(|d| !d.is_nan()).map(|d| (id, d)))
        .collect())
}

fn index_exists(conn: &Connection, index: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = ?1",
        [index],
        |r| r.get(0),
    )?;
    Ok(exists)
}
