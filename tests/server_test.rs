//! Handler tests: request parsing, status codes and response bodies, with fake
//! encoders standing in for the ONNX models.

mod helpers;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use helpers::{fake_service, png_bytes, record, test_db, write_image};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // For oneshot()
use vitrine::catalog::indexer::CatalogIndexer;
use vitrine::config::SearchConfig;
use vitrine::embedding::locator::{ImageLocator, BATCH_PROBE_ORDER, SERVE_PROBE_ORDER};
use vitrine::server::{router, AppState};

const BOUNDARY: &str = "vitrine-test-boundary";

fn app(images: &TempDir) -> Router {
    let (service, _, _) = fake_service();
    let locator = ImageLocator::new(images.path(), SERVE_PROBE_ORDER);
    router(AppState::new(service, test_db(), locator, SearchConfig::default()))
}

fn indexed_app(images: &TempDir) -> Router {
    let (service, _, _) = fake_service();
    let mut conn = test_db();
    {
        let batch_locator = ImageLocator::new(images.path(), BATCH_PROBE_ORDER);
        let indexer = CatalogIndexer::new(&service, &batch_locator, 10);
        let records = vec![record(1, "Navy Shirt"), record(2, "Red Dress")];
        indexer.run(&mut conn, &records, |_| {}).unwrap();
    }
    let locator = ImageLocator::new(images.path(), SERVE_PROBE_ORDER);
    router(AppState::new(service, conn, locator, SearchConfig::default()))
}

fn multipart(content_type: &str, bytes: &[u8]) -> Body {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"upload\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(body)
}

fn multipart_request(uri: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(multipart(content_type, bytes))
        .unwrap()
}

// Helper to parse JSON response body
async fn json_body(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn embed_text_returns_unit_vector() {
    let images = TempDir::new().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/embed/text")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": "navy shirt"}).to_string()))
        .unwrap();

    let response = app(&images).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    let embedding = body["embedding"].as_array().unwrap();
    assert_eq!(embedding.len(), 384);
    let norm: f64 = embedding
        .iter()
        .map(|x| x.as_f64().unwrap().powi(2))
        .sum::<f64>()
        .sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn embed_text_rejects_empty_string() {
    let images = TempDir::new().unwrap();
    let request = Request::builder()
        .method("POST")
        .uri("/embed/text")
        .header("content-type", "application/json")
        .body(Body::from(json!({"text": ""}).to_string()))
        .unwrap();

    let response = app(&images).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn embed_image_accepts_png_upload() {
    let images = TempDir::new().unwrap();
    let response = app(&images)
        .oneshot(multipart_request("/embed/image", "image/png", &png_bytes(50)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    assert_eq!(body["embedding"].as_array().unwrap().len(), 512);
}

#[tokio::test]
async fn embed_image_rejects_pdf_before_decoding() {
    let images = TempDir::new().unwrap();
    let response = app(&images)
        .oneshot(multipart_request("/embed/image", "application/pdf", &png_bytes(50)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn embed_image_rejects_undecodable_bytes() {
    let images = TempDir::new().unwrap();
    let response = app(&images)
        .oneshot(multipart_request(
            "/embed/image",
            "application/octet-stream",
            b"not an image",
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn image_endpoint_prefers_jpg_and_sets_content_type() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "42.png", 1);
    let jpg = write_image(images.path(), "42.jpg", 2);

    let request = Request::builder().uri("/image/42").body(Body::empty()).unwrap();
    let response = app(&images).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), std::fs::read(jpg).unwrap().as_slice());
}

#[tokio::test]
async fn image_endpoint_prefers_jpeg_over_png() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "7.png", 1);
    let jpeg = write_image(images.path(), "7.jpeg", 2);

    let request = Request::builder().uri("/image/7").body(Body::empty()).unwrap();
    let response = app(&images).oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), std::fs::read(jpeg).unwrap().as_slice());
}

#[tokio::test]
async fn image_endpoint_returns_404_when_missing() {
    let images = TempDir::new().unwrap();
    let request = Request::builder().uri("/image/9999").body(Body::empty()).unwrap();
    let response = app(&images).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn text_search_returns_ranked_hits() {
    let images = TempDir::new().unwrap();
    let query = record(2, "Red Dress").embedding_text().replace(' ', "+");
    let request = Request::builder()
        .uri(format!("/search?q={query}&limit=2"))
        .body(Body::empty())
        .unwrap();

    let response = indexed_app(&images).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], 2);
}

#[tokio::test]
async fn text_search_rejects_oversized_limit() {
    let images = TempDir::new().unwrap();
    let request = Request::builder()
        .uri("/search?q=shirt&limit=100000")
        .body(Body::empty())
        .unwrap();
    let response = indexed_app(&images).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn image_search_rejects_oversized_limit() {
    let images = TempDir::new().unwrap();
    let response = indexed_app(&images)
        .oneshot(multipart_request("/search/image?limit=5000", "image/png", &png_bytes(3)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn image_search_rejects_pdf_upload() {
    let images = TempDir::new().unwrap();
    let response = indexed_app(&images)
        .oneshot(multipart_request("/search/image", "application/pdf", &png_bytes(3)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response.into_body()).await;
    assert!(body["error"].as_str().unwrap().contains("must be an image"));
}

#[tokio::test]
async fn text_search_requires_query() {
    let images = TempDir::new().unwrap();
    let request = Request::builder().uri("/search").body(Body::empty()).unwrap();
    let response = app(&images).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn image_search_returns_only_rows_with_images() {
    let images = TempDir::new().unwrap();
    write_image(images.path(), "1.png", 77);

    let response = indexed_app(&images)
        .oneshot(multipart_request("/search/image?limit=5", "image/png", &png_bytes(77)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response.into_body()).await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"], 1);
}
