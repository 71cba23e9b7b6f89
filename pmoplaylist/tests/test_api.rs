#![cfg(feature = "pmoserver")]

mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::*;
use http_body_util::BodyExt;
use pmoplaylist::{create_audio_router, create_playlist_router};
use serde_json::{json, Value};
use tower::ServiceExt;

fn router(h: &Harness) -> Router {
    create_playlist_router(h.engine.clone())
}

fn audio_router(h: &Harness) -> Router {
    create_audio_router(h.engine.clone())
}

async fn call(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_add_and_list() {
    let h = Harness::fast().await;

    let (status, body) = call(router(&h), Method::POST, "/add", Some(json!({ "url": URL_A }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["track"]["title"], "Song A");
    assert_eq!(body["track"]["quality"], "192");
    assert_eq!(body["track"]["cache_state"], "missing");

    call(router(&h), Method::POST, "/add", Some(json!({ "url": URL_B }))).await;

    let (status, body) = call(router(&h), Method::GET, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tracks"].as_array().unwrap().len(), 2);
    assert_eq!(body["stats"]["total_tracks"], 2);
    assert_eq!(body["stats"]["total_duration"], 350.0);
    assert_eq!(body["stats"]["current_index"], 0);
    assert_eq!(body["stats"]["has_current"], true);
    assert_eq!(body["current_track"]["title"], "Song A");
}

#[tokio::test]
async fn test_add_errors() {
    let h = Harness::fast().await;

    let (status, body) = call(router(&h), Method::POST, "/add", Some(json!({ "url": "ftp://x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "invalid_url");

    let (status, body) = call(
        router(&h),
        Method::POST,
        "/add",
        Some(json!({ "url": "https://www.youtube.com/watch?v=gone" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
}

#[tokio::test]
async fn test_navigation_routes() {
    let h = Harness::fast().await;

    let (status, body) = call(router(&h), Method::POST, "/next", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["track"], Value::Null);

    let a = h.engine.add(URL_A).await.unwrap();
    let b = h.engine.add(URL_B).await.unwrap();

    let (status, body) = call(
        router(&h),
        Method::POST,
        "/current",
        Some(json!({ "track_id": b.id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["track"]["id"], b.id.as_str());
    assert_eq!(body["track"]["cache_state"], "ready");

    let (_, body) = call(router(&h), Method::POST, "/next", None).await;
    assert_eq!(body["track"]["id"], a.id.as_str());

    let (_, body) = call(router(&h), Method::GET, "/current", None).await;
    assert_eq!(body["track"]["id"], a.id.as_str());

    let (status, body) = call(router(&h), Method::POST, "/shuffle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["track"]["id"], a.id.as_str());

    let (status, body) = call(
        router(&h),
        Method::POST,
        "/current",
        Some(json!({ "track_id": "ffffffffffffffff" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "track_not_found");
}

#[tokio::test]
async fn test_acquisition_failure_is_bad_gateway() {
    let h = Harness::new(FakeFetcher::failing()).await;
    let a = h.engine.add(URL_A).await.unwrap();

    let (status, body) = call(
        router(&h),
        Method::POST,
        "/current",
        Some(json!({ "track_id": a.id })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    assert_eq!(body["kind"], "network_failure");
}

#[tokio::test]
async fn test_remove_move_and_clear() {
    let h = Harness::fast().await;
    let a = h.engine.add(URL_A).await.unwrap();
    let b = h.engine.add(URL_B).await.unwrap();

    let (status, body) = call(
        router(&h),
        Method::POST,
        "/move",
        Some(json!({ "track_id": b.id, "position": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, _) = call(
        router(&h),
        Method::POST,
        "/move",
        Some(json!({ "track_id": b.id, "position": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(router(&h), Method::DELETE, &format!("/remove/{}", a.id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (status, _) = call(router(&h), Method::DELETE, &format!("/remove/{}", a.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = call(router(&h), Method::DELETE, "/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.engine.is_empty().await);
}

#[tokio::test]
async fn test_export_m3u() {
    let h = Harness::fast().await;
    h.engine.add(URL_A).await.unwrap();

    let response = router(&h)
        .oneshot(
            Request::builder()
                .uri("/export.m3u")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "audio/x-mpegurl"
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with("#EXTM3U\n#EXTINF:200,Artist - Song A\n"));
}

#[tokio::test]
async fn test_media_info_does_not_add() {
    let h = Harness::fast().await;

    let (status, body) = call(audio_router(&h), Method::POST, "/info", Some(json!({ "url": URL_C }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["info"]["title"], "Song C");
    assert_eq!(body["info"]["duration"], 90.0);
    assert!(h.engine.is_empty().await);

    let (status, body) = call(audio_router(&h), Method::POST, "/info", Some(json!({ "url": "ftp://x" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_url");
}

#[tokio::test]
async fn test_download_as_attachment() {
    let h = Harness::fast().await;
    let a = h.engine.add(URL_A).await.unwrap();

    let response = audio_router(&h)
        .oneshot(
            Request::builder()
                .uri(format!("/download/{}", a.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_DISPOSITION).unwrap(),
        "attachment; filename=\"Song A.mp3\"; filename*=UTF-8''Song%20A.mp3"
    );
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "audio/mpeg");
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.len(), 1000);

    // Le téléchargement ne change pas la piste courante ni ses compteurs
    assert_eq!(h.engine.current().await.unwrap().play_count, 0);

    let (status, body) = call(audio_router(&h), Method::GET, &format!("/download/{}?quality=999", a.id), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_input");

    let (status, body) = call(audio_router(&h), Method::GET, "/download/ffffffffffffffff", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "track_not_found");
}
