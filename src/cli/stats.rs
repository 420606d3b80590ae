//! CLI `stats` command: row counts, models, index state and an integrity check.

use anyhow::{Context, Result};

use crate::config::VitrineConfig;
use crate::db;

pub fn stats(config: &VitrineConfig) -> Result<()> {
    let db_path = config.resolved_db_path();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `vitrine index <catalog.csv>` to create it.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Vitrine Catalog Report");
    println!("======================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!("sqlite-vec:        {}", report.sqlite_vec_version);
    println!(
        "Last indexed:      {}",
        report.last_indexed_at.as_deref().unwrap_or("(never)")
    );
    println!();
    print_model("Text model", report.text_model.as_deref(), &config.embedding.text_model);
    print_model("Image model", report.image_model.as_deref(), &config.embedding.image_model);
    println!();
    println!("Row counts:");
    println!("  Products:        {}", report.product_count);
    println!("  With image:      {}", report.with_image_embedding);
    println!("  Text index:      {}", format_index(report.text_index_rows));
    println!("  Image index:     {}", format_index(report.image_index_rows));
    println!();
    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
    }

    Ok(())
}

fn print_model(label: &str, stored: Option<&str>, configured: &str) {
    println!("{label}:");
    println!("  Stored:          {}", stored.unwrap_or("(not set)"));
    println!("  Configured:      {configured}");
    match stored {
        Some(stored) if stored != configured => {
            println!("  WARNING: model mismatch! Run `vitrine index` to recompute vectors.");
        }
        Some(_) => println!("  Status:          OK (match)"),
        None => {}
    }
}

fn format_index(rows: Option<u64>) -> String {
    rows.map_or_else(|| "(not built)".to_string(), |n| n.to_string())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
