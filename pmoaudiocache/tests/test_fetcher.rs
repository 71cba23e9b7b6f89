use std::collections::HashMap;
use std::time::Duration;

use axum::{http::HeaderMap, http::StatusCode, routing::get, Router};
use pmoaudiocache::{AcquisitionError, Fetcher, HttpFetcher};
use pmoresolver::StreamSource;

/// Démarre un serveur local et renvoie son adresse
async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn source(url: String, headers: &[(&str, &str)]) -> StreamSource {
    StreamSource {
        url,
        http_headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
        ext: Some("webm".into()),
    }
}

#[tokio::test]
async fn test_fetch_writes_body_and_sends_headers() {
    let router = Router::new().route(
        "/audio",
        get(|headers: HeaderMap| async move {
            match headers.get("x-token").and_then(|v| v.to_str().ok()) {
                Some("secret") => (StatusCode::OK, vec![42u8; 5000]),
                _ => (StatusCode::FORBIDDEN, Vec::new()),
            }
        }),
    );
    let base = serve(router).await;
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("track.fetch.part");

    let fetcher = HttpFetcher::new(Duration::from_secs(10)).unwrap();
    let received = fetcher
        .fetch(&source(format!("{}/audio", base), &[("X-Token", "secret")]), &dest)
        .await
        .unwrap();

    assert_eq!(received, 5000);
    assert_eq!(std::fs::read(&dest).unwrap(), vec![42u8; 5000]);
}

#[tokio::test]
async fn test_http_error_is_a_network_failure() {
    let router = Router::new().route("/gone", get(|| async { StatusCode::NOT_FOUND }));
    let base = serve(router).await;
    let dir = tempfile::tempdir().unwrap();

    let fetcher = HttpFetcher::new(Duration::from_secs(10)).unwrap();
    let err = fetcher
        .fetch(
            &source(format!("{}/gone", base), &[]),
            &dir.path().join("x.part"),
        )
        .await
        .unwrap_err();

    match err {
        AcquisitionError::NetworkFailure(msg) => assert!(msg.contains("404")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_host() {
    let dir = tempfile::tempdir().unwrap();
    let fetcher = HttpFetcher::new(Duration::from_secs(2)).unwrap();

    let err = fetcher
        .fetch(
            &source("http://127.0.0.1:1/audio".to_string(), &[]),
            &dir.path().join("x.part"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AcquisitionError::NetworkFailure(_)));
}
