//! Tests du résolveur avec un faux exécutable `yt-dlp`
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use pmoresolver::{Platform, ResolutionError, Resolver, YtDlpResolver};
use tempfile::TempDir;

/// Écrit un script shell exécutable jouant le rôle de `yt-dlp`
fn fake_ytdlp(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("yt-dlp");
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[tokio::test]
async fn test_resolve_success() {
    let dir = TempDir::new().unwrap();
    let script = fake_ytdlp(
        &dir,
        r#"cat <<'JSON'
{"title": "Song A", "uploader": "Someone", "duration": 200,
 "formats": [{"url": "https://cdn.example/a", "ext": "m4a", "acodec": "mp4a", "vcodec": "none", "abr": 128}]}
JSON"#,
    );

    let resolver = YtDlpResolver::new(script);
    let media = resolver
        .resolve("https://www.youtube.com/watch?v=aaa")
        .await
        .unwrap();

    assert_eq!(media.title, "Song A");
    assert_eq!(media.uploader, "Someone");
    assert_eq!(media.duration, 200.0);
    assert_eq!(media.platform, Platform::Youtube);
    assert_eq!(media.stream.url, "https://cdn.example/a");
}

#[tokio::test]
async fn test_resolve_receives_the_url() {
    let dir = TempDir::new().unwrap();
    // Le dernier argument est l'URL : on la renvoie comme titre
    let script = fake_ytdlp(
        &dir,
        r#"for last; do :; done
printf '{"title": "%s", "url": "https://cdn.example/x"}' "$last""#,
    );

    let resolver = YtDlpResolver::new(script);
    let media = resolver.resolve("https://vimeo.com/42").await.unwrap();

    assert_eq!(media.title, "https://vimeo.com/42");
    assert_eq!(media.platform, Platform::Vimeo);
}

#[tokio::test]
async fn test_resolve_not_found() {
    let dir = TempDir::new().unwrap();
    let script = fake_ytdlp(
        &dir,
        "echo 'ERROR: [youtube] zzz: Video unavailable' >&2\nexit 1",
    );

    let err = YtDlpResolver::new(script)
        .resolve("https://youtu.be/zzz")
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::NotFound(_)));
}

#[tokio::test]
async fn test_resolve_unsupported_url() {
    let dir = TempDir::new().unwrap();
    let script = fake_ytdlp(
        &dir,
        "echo 'ERROR: Unsupported URL: https://soundcloud.com/' >&2\nexit 1",
    );

    let err = YtDlpResolver::new(script)
        .resolve("https://soundcloud.com/")
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::UnsupportedSource(_)));
}

#[tokio::test]
async fn test_resolve_timeout() {
    let dir = TempDir::new().unwrap();
    let script = fake_ytdlp(&dir, "sleep 5");

    let err = YtDlpResolver::new(script)
        .with_timeout(Duration::from_millis(200))
        .resolve("https://youtu.be/slow")
        .await
        .unwrap_err();

    match err {
        ResolutionError::ExtractionFailed(diag) => assert!(diag.contains("timed out")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_url_never_runs_the_extractor() {
    let dir = TempDir::new().unwrap();
    let marker = dir.path().join("ran");
    let script = fake_ytdlp(&dir, &format!("touch {}", marker.display()));

    let err = YtDlpResolver::new(script)
        .resolve("definitely not a url")
        .await
        .unwrap_err();

    assert!(matches!(err, ResolutionError::InvalidUrl { .. }));
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_allowed_platforms_are_configurable() {
    let dir = TempDir::new().unwrap();
    let script = fake_ytdlp(&dir, r#"echo '{"title": "t", "url": "https://cdn.example/t"}'"#);

    let resolver = YtDlpResolver::new(script).with_allowed_platforms(vec![Platform::Other]);

    assert!(resolver.resolve("https://example.org/song").await.is_ok());
    assert!(matches!(
        resolver.resolve("https://youtu.be/abc").await,
        Err(ResolutionError::UnsupportedSource(_))
    ));
}
