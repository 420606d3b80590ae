//! SQL DDL for the product store.
//!
//! `products` holds one row per catalog item with its raw embedding blobs, and
//! `schema_meta` records the schema version and model identifiers. The vec0
//! ANN tables are built separately by [`crate::catalog::store::build_vector_indexes`]
//! once an indexing run has finished. All DDL uses `IF NOT EXISTS`.

use rusqlite::Connection;

/// Core tables. Embedding blobs are little-endian f32 arrays (384 / 512 wide).
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id INTEGER PRIMARY KEY,
    product_display_name TEXT,
    master_category TEXT,
    sub_category TEXT,
    article_type TEXT,
    base_colour TEXT,
    text_embedding BLOB CHECK(text_embedding IS NULL OR length(text_embedding) = 1536),
    image_embedding BLOB CHECK(image_embedding IS NULL OR length(image_embedding) = 2048)
);

CREATE INDEX IF NOT EXISTS idx_products_master_category ON products(master_category);
CREATE INDEX IF NOT EXISTS idx_products_article_type ON products(article_type);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Cosine ANN index over text embeddings, keyed by product id (rowid).
pub const TEXT_VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS products_text_vec USING vec0(
    embedding FLOAT[384] distance_metric=cosine
);
"#;

/// Cosine ANN index over image embeddings, keyed by product id (rowid).
pub const IMAGE_VEC_TABLE_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS products_image_vec USING vec0(
    embedding FLOAT[512] distance_metric=cosine
);
"#;

/// Initialize the core tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
