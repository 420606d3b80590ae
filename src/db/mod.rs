pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the product database at the given path, with sqlite-vec
/// loaded, schema initialized and migrations applied.
pub fn open_database(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    conn.pragma_update(None, "journal_mode", "WAL")?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open an in-memory database with schema and migrations applied.
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let mut conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&mut conn).context("failed to run migrations")?;
    Ok(conn)
}

/// Warn when the stored vectors were produced by different models than configured.
pub fn check_model_drift(conn: &Connection, text_model: &str, image_model: &str) -> Result<bool> {
    let mut drifted = false;
    for (key, configured) in [
        (migrations::TEXT_MODEL_KEY, text_model),
        (migrations::IMAGE_MODEL_KEY, image_model),
    ] {
        if let Some(stored) = migrations::get_meta(conn, key)? {
            if stored != configured {
                tracing::warn!(
                    key,
                    stored = %stored,
                    configured = %configured,
                    "embedding model changed; run `vitrine index` to recompute all vectors"
                );
                drifted = true;
            }
        }
    }
    Ok(drifted)
}

/// Database health snapshot for `vitrine stats`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub text_model: Option<String>,
    pub image_model: Option<String>,
    pub last_indexed_at: Option<String>,
    pub product_count: u64,
    pub with_image_embedding: u64,
    pub text_index_rows: Option<u64>,
    pub image_index_rows: Option<u64>,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Collect counts, versions and an integrity check.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let schema_version = migrations::get_schema_version(conn)?;
    let sqlite_vec_version: String = conn.query_row("SELECT vec_version()", [], |r| r.get(0))?;
    let product_count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |r| r.get(0))?;
    let with_image: i64 = conn.query_row(
        "SELECT COUNT(*) FROM products WHERE image_embedding IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;

    Ok(HealthReport {
        schema_version,
        sqlite_vec_version,
        text_model: migrations::get_meta(conn, migrations::TEXT_MODEL_KEY)?,
        image_model: migrations::get_meta(conn, migrations::IMAGE_MODEL_KEY)?,
        last_indexed_at: migrations::get_meta(conn, migrations::LAST_INDEXED_KEY)?,
        product_count: product_count as u64,
        with_image_embedding: with_image as u64,
        text_index_rows: count_if_exists(conn, "products_text_vec")?,
        image_index_rows: count_if_exists(conn, "products_image_vec")?,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}

fn count_if_exists(conn: &Connection, table: &str) -> Result<Option<u64>> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE name = ?1",
        [table],
        |r| r.get(0),
    )?;
    if !exists {
        return Ok(None);
    }
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
    Ok(Some(count as u64))
}
