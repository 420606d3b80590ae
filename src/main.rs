mod catalog;
mod cli;
mod config;
mod db;
mod embedding;
mod error;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "vitrine", version, about = "Multimodal product embedding and similarity search")]
struct Cli {
    /// Config file (defaults to ~/.vitrine/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server
    Serve,
    /// Embed a catalog CSV into the product store
    Index {
        /// Path to the catalog CSV
        csv: PathBuf,
        /// Products per encoder call and per transaction
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Search the indexed catalog
    Search {
        /// Text query (ignored when --image is given)
        #[arg(default_value = "")]
        query: String,
        /// Search by this image instead of text
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show catalog statistics and database health
    Stats,
    /// Manage the embedding models
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the text and image models to ~/.vitrine/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load config (for log level)
    let config = match &cli.config {
        Some(path) => config::VitrineConfig::load_from(path)?,
        None => config::VitrineConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => {
            server::serve(config).await?;
        }
        Command::Index { csv, batch_size } => {
            cli::index::index(&config, &csv, batch_size)?;
        }
        Command::Search { query, image, limit } => {
            anyhow::ensure!(
                image.is_some() || !query.trim().is_empty(),
                "give a text query or --image <path>"
            );
            cli::search::search(&config, &query, image.as_deref(), limit).await?;
        }
        Command::Stats => {
            cli::stats::stats(&config)?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
    }

    Ok(())
}
