use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::catalog::search::MAX_SEARCH_LIMIT;
use crate::embedding::locator::{BATCH_PROBE_ORDER, SERVE_PROBE_ORDER};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct VitrineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub catalog: CatalogConfig,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub text_model: String,
    pub image_model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogConfig {
    pub image_dir: String,
    pub batch_size: usize,
    /// Extension probe order for `GET /image/{id}` and other live lookups.
    pub serve_probe_order: Vec<String>,
    /// Extension probe order while indexing.
    pub index_probe_order: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub slow_threshold_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_vitrine_dir()
            .join("catalog.db")
            .to_string_lossy()
            .into_owned();
        Self { db_path }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_vitrine_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            text_model: "all-MiniLM-L6-v2".into(),
            image_model: "clip-vit-base-patch32".into(),
            cache_dir,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        let image_dir = default_vitrine_dir()
            .join("images")
            .to_string_lossy()
            .into_owned();
        Self {
            image_dir,
            batch_size: 100,
            serve_probe_order: SERVE_PROBE_ORDER.iter().map(|e| e.to_string()).collect(),
            index_probe_order: BATCH_PROBE_ORDER.iter().map(|e| e.to_string()).collect(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            slow_threshold_ms: 500,
        }
    }
}

/// Returns `~/.vitrine/`
pub fn default_vitrine_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".vitrine")
}

/// Returns the default config file path: `~/.vitrine/config.toml`
pub fn default_config_path() -> PathBuf {
    default_vitrine_dir().join("config.toml")
}

impl VitrineConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            VitrineConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides (VITRINE_DB, VITRINE_IMAGE_DIR, VITRINE_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("VITRINE_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("VITRINE_IMAGE_DIR") {
            self.catalog.image_dir = val;
        }
        if let Ok(val) = std::env::var("VITRINE_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.catalog.batch_size > 0, "catalog.batch_size must be positive");
        anyhow::ensure!(
            self.search.default_limit <= MAX_SEARCH_LIMIT,
            "search.default_limit must be at most {MAX_SEARCH_LIMIT}"
        );
        anyhow::ensure!(
            !self.catalog.serve_probe_order.is_empty() && !self.catalog.index_probe_order.is_empty(),
            "image probe orders must list at least one extension"
        );
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }

    /// Resolve the product image directory, expanding `~` if needed.
    pub fn resolved_image_dir(&self) -> PathBuf {
        expand_tilde(&self.catalog.image_dir)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
