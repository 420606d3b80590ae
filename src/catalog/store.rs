//! Write path for the product store.
//!
//! [`upsert_batch`] persists one batch of embedded products inside a single
//! transaction. Re-running it with the same input leaves the table unchanged.
//! [`build_vector_indexes`] rebuilds the vec0 ANN tables from `products` once a
//! run has finished.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::types::{EmbeddedProduct, ProductRecord};
use super::{embedding_from_bytes, embedding_to_bytes};
use crate::db::schema::{IMAGE_VEC_TABLE_SQL, TEXT_VEC_TABLE_SQL};
use crate::embedding::service::check_dim;
use crate::embedding::{IMAGE_EMBEDDING_DIM, TEXT_EMBEDDING_DIM};
use crate::error::Result;

/// Row counts of the ANN tables after a rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VectorIndexStats {
    pub text_rows: u64,
    pub image_rows: u64,
}

/// Insert or fully replace one product row.
pub fn upsert_product(conn: &Connection, product: &EmbeddedProduct) -> Result<()> {
    let record = &product.record;
    if let Some(v) = &product.text_embedding {
        check_dim(v.len(), TEXT_EMBEDDING_DIM)?;
    }
    if let Some(v) = &product.image_embedding {
        check_dim(v.len(), IMAGE_EMBEDDING_DIM)?;
    }

    conn.execute(
        "INSERT INTO products (id, product_display_name, master_category, sub_category, \
                               article_type, base_colour, text_embedding, image_embedding) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
         ON CONFLICT(id) DO UPDATE SET \
             product_display_name = excluded.product_display_name, \
             master_category = excluded.master_category, \
             sub_category = excluded.sub_category, \
             article_type = excluded.article_type, \
             base_colour = excluded.base_colour, \
             text_embedding = excluded.text_embedding, \
             image_embedding = excluded.image_embedding",
        params![
            record.id,
            record.display_name,
            record.master_category,
            record.sub_category,
            record.article_type,
            record.base_colour,
            product.text_embedding.as_deref().map(embedding_to_bytes),
            product.image_embedding.as_deref().map(embedding_to_bytes),
        ],
    )?;
    Ok(())
}

/// Upsert a batch atomically. Any row failure rolls back the whole batch.
pub fn upsert_batch(conn: &mut Connection, products: &[EmbeddedProduct]) -> Result<usize> {
    let tx = conn.transaction()?;
    for product in products {
        upsert_product(&tx, product)?;
    }
    tx.commit()?;
    Ok(products.len())
}

/// Create the ANN tables if missing and resync them with `products`.
///
/// Zero vectors stay out of the cosine indexes: their distance is undefined and
/// sqlite-vec reports it as NULL.
pub fn build_vector_indexes(conn: &mut Connection) -> Result<VectorIndexStats> {
    let tx = conn.transaction()?;
    tx.execute_batch(TEXT_VEC_TABLE_SQL)?;
    tx.execute_batch(IMAGE_VEC_TABLE_SQL)?;

    tx.execute("DELETE FROM products_text_vec", [])?;
    tx.execute(
        "INSERT INTO products_text_vec (rowid, embedding) \
         SELECT id, text_embedding FROM products \
         WHERE text_embedding IS NOT NULL AND text_embedding != zeroblob(?1)",
        [TEXT_EMBEDDING_DIM * std::mem::size_of::<f32>()],
    )?;

    tx.execute("DELETE FROM products_image_vec", [])?;
    tx.execute(
        "INSERT INTO products_image_vec (rowid, embedding) \
         SELECT id, image_embedding FROM products \
         WHERE image_embedding IS NOT NULL AND image_embedding != zeroblob(?1)",
        [IMAGE_EMBEDDING_DIM * std::mem::size_of::<f32>()],
    )?;

    let text_rows: i64 = tx.query_row("SELECT COUNT(*) FROM products_text_vec", [], |r| r.get(0))?;
    let image_rows: i64 =
        tx.query_row("SELECT COUNT(*) FROM products_image_vec", [], |r| r.get(0))?;
    tx.commit()?;

    let stats = VectorIndexStats {
        text_rows: text_rows as u64,
        image_rows: image_rows as u64,
    };
    tracing::info!(text_rows = stats.text_rows, image_rows = stats.image_rows, "vector indexes rebuilt");
    Ok(stats)
}

/// Fetch a single product with its stored vectors.
pub fn get_product(conn: &Connection, id: i64) -> Result<Option<EmbeddedProduct>> {
    let product = conn
        .query_row(
            "SELECT id, product_display_name, master_category, sub_category, article_type, \
                    base_colour, text_embedding, image_embedding \
             FROM products WHERE id = ?1",
            [id],
            row_to_product,
        )
        .optional()?;
    Ok(product)
}

/// Number of rows in `products`.
pub fn count_products(conn: &Connection) -> Result<u64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    Ok(count as u64)
}

fn row_to_product(row: &Row) -> rusqlite::Result<EmbeddedProduct> {
    let text: Option<Vec<u8>> = row.get(6)?;
    let image: Option<Vec<u8>> = row.get(7)?;
    Ok(EmbeddedProduct {
        record: ProductRecord {
            id: row.get(0)?,
            display_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
            master_category: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            sub_category: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            article_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
            base_colour: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            text_for_embedding: None,
            image_file: None,
        },
        text_embedding: text.as_deref().map(embedding_from_bytes),
        image_embedding: image.as_deref().map(embedding_from_bytes),
    })
}
