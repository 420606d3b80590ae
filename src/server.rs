//! HTTP server for live embeddings, product images and search.
//!
//! [`serve`] opens the database, loads both encoders once and serves the
//! [`router`]. Model inference and SQLite access run on the blocking pool.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::Result;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::catalog::search::{
    search_by_image_embedding, search_by_text_embedding, ProductHit, MAX_SEARCH_LIMIT,
};
use crate::config::{SearchConfig, VitrineConfig};
use crate::db;
use crate::embedding;
use crate::embedding::locator::ImageLocator;
use crate::embedding::service::EmbeddingService;
use crate::error::EmbedError;

/// Uploads larger than this are rejected before reaching a handler.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<EmbeddingService>,
    pub db: Arc<Mutex<Connection>>,
    pub locator: Arc<ImageLocator>,
    pub search: Arc<SearchConfig>,
}

impl AppState {
    pub fn new(
        service: EmbeddingService,
        conn: Connection,
        locator: ImageLocator,
        search: SearchConfig,
    ) -> Self {
        Self {
            service: Arc::new(service),
            db: Arc::new(Mutex::new(conn)),
            locator: Arc::new(locator),
            search: Arc::new(search),
        }
    }
}

/// Shared setup: open DB, warn on model drift, load encoders, build the locator.
fn setup_shared_state(config: &VitrineConfig) -> Result<AppState> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path)?;
    tracing::info!(db = %db_path.display(), "database ready");

    db::check_model_drift(&conn, &config.embedding.text_model, &config.embedding.image_model)?;

    let service = embedding::create_service(&config.embedding)?;
    let locator = ImageLocator::new(
        config.resolved_image_dir(),
        config.catalog.serve_probe_order.as_slice(),
    );
    tracing::info!(image_dir = %locator.root().display(), "image locator ready");

    Ok(AppState::new(service, conn, locator, config.search.clone()))
}

/// Build the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/embed/text", post(embed_text))
        .route("/embed/image", post(embed_image))
        .route("/image/{id}", get(get_image))
        .route("/search", get(search_text))
        .route("/search/image", post(search_image))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Start the HTTP server and run until ctrl-c.
pub async fn serve(config: VitrineConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!(addr = %bind_addr, "starting vitrine HTTP server");

    let state = setup_shared_state(&config)?;
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening at http://{bind_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down HTTP server");
        })
        .await?;

    Ok(())
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Handler error mapped to a status code and `{"error": ...}` body.
#[derive(Debug)]
pub enum ApiError {
    Embed(EmbedError),
    BadRequest(String),
    NotFound(String),
    Internal(String),
}

impl From<EmbedError> for ApiError {
    fn from(e: EmbedError) -> Self {
        ApiError::Embed(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::BadRequest(format!("malformed multipart body: {}", e.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Embed(e) if e.is_caller_facing() => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::Embed(e) => {
                tracing::error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

// ── Payloads ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    pub embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<ProductHit>,
    pub took_ms: u64,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn embed_text(
    State(state): State<AppState>,
    Json(req): Json<TextRequest>,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let start = Instant::now();
    let service = state.service.clone();
    let embedding = blocking(move || Ok(service.embed_text(&req.text)?)).await?;
    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "embedded text");
    Ok(Json(EmbeddingResponse { embedding }))
}

async fn embed_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let start = Instant::now();
    let (bytes, content_type) = read_image_field(&mut multipart).await?;
    let service = state.service.clone();
    let embedding =
        blocking(move || Ok(service.embed_image_upload(&bytes, content_type.as_deref())?)).await?;
    tracing::info!(elapsed_ms = start.elapsed().as_millis() as u64, "embedded image");
    Ok(Json(EmbeddingResponse { embedding }))
}

async fn get_image(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let Some(path) = state.locator.locate(id) else {
        return Err(ApiError::NotFound(format!("no image for product {id}")));
    };
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        ApiError::Internal(format!("failed to read {}: {e}", path.display()))
    })?;
    let content_type = content_type_for(&path);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

async fn search_text(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let query = params.q.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(ApiError::BadRequest("query parameter `q` is required".into()));
    }
    let limit = resolve_limit(params.limit, &state.search)?;

    let service = state.service.clone();
    let db = state.db.clone();
    let results = blocking(move || {
        let embedding = service.embed_text(&query)?;
        let conn = lock(&db)?;
        Ok(search_by_text_embedding(&conn, &embedding, limit)?)
    })
    .await?;

    Ok(Json(finish_search(&state, "text", start, results)))
}

async fn search_image(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
    mut multipart: Multipart,
) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let limit = resolve_limit(params.limit, &state.search)?;
    let (bytes, content_type) = read_image_field(&mut multipart).await?;

    let service = state.service.clone();
    let db = state.db.clone();
    let results = blocking(move || {
        let embedding = service.embed_image_upload(&bytes, content_type.as_deref())?;
        let conn = lock(&db)?;
        Ok(search_by_image_embedding(&conn, &embedding, limit)?)
    })
    .await?;

    Ok(Json(finish_search(&state, "image", start, results)))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Pull the `file` part out of a multipart body with its declared content type.
async fn read_image_field(
    multipart: &mut Multipart,
) -> Result<(Vec<u8>, Option<String>), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await?;
        return Ok((bytes.to_vec(), content_type));
    }
    Err(ApiError::BadRequest("missing multipart field `file`".into()))
}

/// Requested result count, or the configured default. sqlite-vec refuses `k` above 4096.
fn resolve_limit(requested: Option<usize>, search: &SearchConfig) -> Result<usize, ApiError> {
    let limit = requested.unwrap_or(search.default_limit);
    if limit > MAX_SEARCH_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "limit must be at most {MAX_SEARCH_LIMIT}, got {limit}"
        )));
    }
    Ok(limit)
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))?
}

fn lock(db: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, ApiError> {
    db.lock()
        .map_err(|e| ApiError::Internal(format!("database lock poisoned: {e}")))
}

fn finish_search(
    state: &AppState,
    kind: &'static str,
    start: Instant,
    results: Vec<ProductHit>,
) -> SearchResponse {
    let took_ms = start.elapsed().as_millis() as u64;
    if took_ms > state.search.slow_threshold_ms {
        tracing::warn!(kind, took_ms, results = results.len(), "slow search");
    } else {
        tracing::info!(kind, took_ms, results = results.len(), "search complete");
    }
    SearchResponse { results, took_ms }
}

fn content_type_for(path: &std::path::Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
