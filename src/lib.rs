//! Multimodal product embeddings for similarity search.
//!
//! Vitrine turns catalog product records (text metadata plus product photos) into
//! fixed-length, L2-normalized vectors and serves equivalent embeddings for live
//! queries, so a query and a catalog row can be compared by cosine similarity.
//!
//! | Modality | Model | Width |
//! |----------|-------|-------|
//! | **Text** | all-MiniLM-L6-v2 (mean pooled) | 384 |
//! | **Image** | CLIP ViT-B/32 vision tower | 512 |
//!
//! # Architecture
//!
//! - **Embeddings**: Local ONNX Runtime for both encoders; output shapes are collapsed
//!   to one vector contract and normalized before anything is stored or returned
//! - **Indexing**: Catalog rows are embedded in fixed-size batches (one encoder call per
//!   modality per batch) and upserted inside one transaction per batch
//! - **Storage**: SQLite, with [sqlite-vec](https://github.com/asg017/sqlite-vec) cosine
//!   indexes rebuilt after every indexing run
//! - **Transport**: HTTP via axum for live embeddings, product images and search
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files and environment variables
//! - [`db`] - SQLite initialization, schema, migrations, and health checks
//! - [`embedding`] - Encoders, output-shape adaptation, normalization, batch alignment
//! - [`catalog`] - Catalog records, CSV source, upsert store, batch indexer, KNN search
//! - [`server`] - HTTP endpoints

pub mod catalog;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod server;
