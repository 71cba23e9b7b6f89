#![cfg(feature = "pmoserver")]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use pmocache::pmoserver_ext::{create_cache_api_router, create_stream_router};
use pmocache::{AudioCacheState, CacheKey, CacheStore, Quality};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

const TRACK: &str = "0123456789abcdef";

async fn setup() -> (TempDir, Arc<CacheStore>, AudioCacheState) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(CacheStore::open(temp_dir.path(), 10 * 1024 * 1024).unwrap());
    let content: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    store
        .put(&CacheKey::new(TRACK, Quality::Kbps192), &content)
        .await
        .unwrap();

    let state = AudioCacheState {
        store: store.clone(),
        default_quality: Quality::Kbps192,
    };
    (temp_dir, store, state)
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, header::HeaderMap, Vec<u8>) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

fn get(uri: &str, range: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(range) = range {
        builder = builder.header(header::RANGE, range);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_full_stream() {
    let (_dir, store, state) = setup().await;
    let uri = format!("/stream/{}", TRACK);

    let (status, headers, body) = send(create_stream_router(state), get(&uri, None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(headers[header::CONTENT_LENGTH], "10000");
    assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
    assert_eq!(body.len(), 10_000);

    // La lecture compte comme un accès
    let entry = store.get(&CacheKey::new(TRACK, Quality::Kbps192)).await.unwrap();
    assert_eq!(entry.hits, 1);
}

#[tokio::test]
async fn test_range_request() {
    let (_dir, _store, state) = setup().await;
    let uri = format!("/stream/{}", TRACK);

    let (status, headers, body) =
        send(create_stream_router(state), get(&uri, Some("bytes=1000-1999"))).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 1000-1999/10000");
    assert_eq!(headers[header::CONTENT_LENGTH], "1000");
    assert_eq!(body.len(), 1000);
    assert_eq!(body[0], (1000 % 251) as u8);
}

#[tokio::test]
async fn test_suffix_range() {
    let (_dir, _store, state) = setup().await;
    let uri = format!("/stream/{}", TRACK);

    let (status, headers, body) =
        send(create_stream_router(state), get(&uri, Some("bytes=-100"))).await;

    assert_eq!(status, StatusCode::PARTIAL_CONTENT);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes 9900-9999/10000");
    assert_eq!(body.len(), 100);
}

#[tokio::test]
async fn test_unsatisfiable_range() {
    let (_dir, _store, state) = setup().await;
    let uri = format!("/stream/{}", TRACK);

    let (status, headers, _body) =
        send(create_stream_router(state), get(&uri, Some("bytes=20000-"))).await;

    assert_eq!(status, StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(headers[header::CONTENT_RANGE], "bytes */10000");
}

#[tokio::test]
async fn test_malformed_range_serves_full_file() {
    let (_dir, _store, state) = setup().await;
    let uri = format!("/stream/{}", TRACK);

    let (status, _headers, body) =
        send(create_stream_router(state), get(&uri, Some("bytes=oops"))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.len(), 10_000);
}

#[tokio::test]
async fn test_not_ready_returns_503() {
    let (_dir, store, state) = setup().await;

    // Autre qualité : jamais téléchargée
    let uri = format!("/stream/{}?quality=320", TRACK);
    let (status, headers, body) = send(create_stream_router(state.clone()), get(&uri, None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(headers.contains_key(header::RETRY_AFTER));
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["state"], "missing");

    // Téléchargement en cours
    store
        .begin_download(&CacheKey::new("fedcba9876543210", Quality::Kbps192), 1000)
        .await
        .unwrap();
    let (status, _headers, body) = send(
        create_stream_router(state),
        get("/stream/fedcba9876543210", None),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["state"], "downloading");
}

#[tokio::test]
async fn test_invalid_quality() {
    let (_dir, _store, state) = setup().await;
    let uri = format!("/stream/{}?quality=256", TRACK);

    let (status, _headers, body) = send(create_stream_router(state), get(&uri, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["kind"], "invalid_input");
}

#[tokio::test]
async fn test_cache_info_and_clear() {
    let (_dir, _store, state) = setup().await;
    let router = create_cache_api_router(state);

    let (status, _headers, body) = send(router.clone(), get("/info", None)).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["cache_info"]["file_count"], 1);
    assert_eq!(json["cache_info"]["total_size"], 10_000);

    let request = Request::builder()
        .method("POST")
        .uri("/clear")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"days_old": 0}"#))
        .unwrap();
    let (status, _headers, body) = send(router, request).await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["removed"], 1);
    assert_eq!(json["freed_bytes"], 10_000);
}
