//! Résolveur basé sur l'outil en ligne de commande `yt-dlp`
//!
//! `yt-dlp --dump-single-json` décrit le média sans rien télécharger ; on en
//! extrait les métadonnées et l'URL du meilleur flux audio seul.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{ResolutionError, Result};
use crate::media::{ResolvedMedia, StreamSource};
use crate::platform::{validate_url, Platform};
use crate::Resolver;

pub const DEFAULT_YTDLP_PROGRAM: &str = "yt-dlp";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_ALLOWED_PLATFORMS: &[Platform] = &[
    Platform::Youtube,
    Platform::Vimeo,
    Platform::Facebook,
    Platform::Soundcloud,
];

/// Motifs de stderr signalant un contenu absent ou inaccessible
const NOT_FOUND_MARKERS: &[&str] = &[
    "video unavailable",
    "private video",
    "http error 404",
    "this video is not available",
    "has been removed",
    "does not exist",
    "account associated with this video has been terminated",
];

#[derive(Debug, Deserialize)]
struct DumpFormat {
    url: Option<String>,
    ext: Option<String>,
    acodec: Option<String>,
    vcodec: Option<String>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl DumpFormat {
    fn is_audio_only(&self) -> bool {
        let has_audio = self.acodec.as_deref().is_some_and(|c| c != "none");
        let no_video = self.vcodec.as_deref().is_none_or(|c| c == "none");
        has_audio && no_video && self.url.is_some()
    }
}

#[derive(Debug, Deserialize)]
struct Dump {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    artist: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    is_live: Option<bool>,
    url: Option<String>,
    ext: Option<String>,
    filesize: Option<u64>,
    filesize_approx: Option<u64>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
    #[serde(default)]
    formats: Vec<DumpFormat>,
}

/// Résolveur `yt-dlp`
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: PathBuf,
    timeout: Duration,
    allowed: Vec<Platform>,
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new(DEFAULT_YTDLP_PROGRAM)
    }
}

impl YtDlpResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
            allowed: DEFAULT_ALLOWED_PLATFORMS.to_vec(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_allowed_platforms(mut self, allowed: Vec<Platform>) -> Self {
        self.allowed = allowed;
        self
    }

    pub fn allowed_platforms(&self) -> &[Platform] {
        &self.allowed
    }

    async fn run(&self, url: &str) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.program);
        command
            .args([
                "--dump-single-json",
                "--no-playlist",
                "--no-warnings",
                "-f",
                "bestaudio/best",
                url,
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ResolutionError::ExtractionFailed(format!(
                    "cannot run {}: {}",
                    self.program.display(),
                    e
                )))
            }
            Err(_) => {
                return Err(ResolutionError::ExtractionFailed(format!(
                    "{} timed out after {}s",
                    self.program.display(),
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(url = %url, status = %output.status, "yt-dlp failed: {}", stderr.trim());
            return Err(classify_failure(&stderr));
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Resolver for YtDlpResolver {
    async fn resolve(&self, url: &str) -> Result<ResolvedMedia> {
        let parsed = validate_url(url)?;
        let platform = Platform::detect(&parsed);

        if !self.allowed.contains(&platform) {
            return Err(ResolutionError::UnsupportedSource(format!(
                "platform '{}' is not allowed",
                platform
            )));
        }

        debug!(url = %parsed, platform = %platform, "Resolving media");
        let stdout = self.run(parsed.as_str()).await?;
        let media = parse_dump(&stdout, platform)?;

        info!(
            url = %parsed,
            title = %media.title,
            duration = media.duration,
            "Media resolved"
        );
        Ok(media)
    }
}

/// Convertit la sortie JSON de `yt-dlp --dump-single-json` en [`ResolvedMedia`]
pub fn parse_dump(json: &[u8], platform: Platform) -> Result<ResolvedMedia> {
    let dump: Dump = serde_json::from_slice(json)
        .map_err(|e| ResolutionError::ExtractionFailed(format!("invalid yt-dlp output: {}", e)))?;

    if matches!(dump.kind.as_deref(), Some("playlist") | Some("multi_video")) {
        return Err(ResolutionError::UnsupportedSource(
            "playlists are not supported, submit a single track".to_string(),
        ));
    }
    if dump.is_live == Some(true) {
        return Err(ResolutionError::UnsupportedSource(
            "live streams are not supported".to_string(),
        ));
    }

    let best_audio = dump
        .formats
        .iter()
        .filter(|f| f.is_audio_only())
        .max_by(|a, b| a.abr.unwrap_or(0.0).total_cmp(&b.abr.unwrap_or(0.0)));

    let (stream, filesize) = match (best_audio, &dump.url) {
        (Some(format), _) => (
            StreamSource {
                url: format.url.clone().unwrap_or_default(),
                http_headers: format.http_headers.clone(),
                ext: format.ext.clone(),
            },
            format.filesize.or(format.filesize_approx),
        ),
        (None, Some(url)) => (
            StreamSource {
                url: url.clone(),
                http_headers: dump.http_headers.clone(),
                ext: dump.ext.clone(),
            },
            dump.filesize.or(dump.filesize_approx),
        ),
        (None, None) => {
            return Err(ResolutionError::ExtractionFailed(
                "no playable stream in yt-dlp output".to_string(),
            ))
        }
    };

    Ok(ResolvedMedia {
        title: dump
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| "Untitled".to_string()),
        uploader: dump
            .artist
            .or(dump.uploader)
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        duration: dump.duration.unwrap_or(0.0).max(0.0),
        platform,
        thumbnail: dump.thumbnail,
        filesize,
        stream,
    })
}

/// Classe un échec de `yt-dlp` d'après son diagnostic
pub fn classify_failure(stderr: &str) -> ResolutionError {
    let diagnostic = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("yt-dlp exited without diagnostic")
        .trim()
        .to_string();
    let lower = stderr.to_lowercase();

    if lower.contains("unsupported url") {
        ResolutionError::UnsupportedSource(diagnostic)
    } else if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        ResolutionError::NotFound(diagnostic)
    } else {
        ResolutionError::ExtractionFailed(stderr.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "title": "Song A",
        "uploader": "Channel",
        "duration": 200.5,
        "thumbnail": "https://i.ytimg.com/a.jpg",
        "url": "https://cdn.example/fallback",
        "formats": [
            {"url": "https://cdn.example/low", "ext": "m4a", "acodec": "mp4a", "vcodec": "none", "abr": 48.0},
            {"url": "https://cdn.example/high", "ext": "webm", "acodec": "opus", "vcodec": "none", "abr": 160.0, "filesize": 4000000,
             "http_headers": {"User-Agent": "test"}},
            {"url": "https://cdn.example/video", "ext": "mp4", "acodec": "mp4a", "vcodec": "avc1", "abr": 192.0}
        ]
    }"#;

    #[test]
    fn test_parse_dump_picks_best_audio_only() {
        let media = parse_dump(DUMP.as_bytes(), Platform::Youtube).unwrap();

        assert_eq!(media.title, "Song A");
        assert_eq!(media.uploader, "Channel");
        assert_eq!(media.duration, 200.5);
        assert_eq!(media.stream.url, "https://cdn.example/high");
        assert_eq!(media.stream.ext.as_deref(), Some("webm"));
        assert_eq!(media.stream.http_headers.get("User-Agent").unwrap(), "test");
        assert_eq!(media.filesize, Some(4_000_000));
    }

    #[test]
    fn test_parse_dump_prefers_artist_and_falls_back_to_top_level_url() {
        let json = r#"{"title": "", "artist": "Band", "uploader": "Label", "url": "https://cdn.example/x", "ext": "mp3"}"#;
        let media = parse_dump(json.as_bytes(), Platform::Soundcloud).unwrap();

        assert_eq!(media.title, "Untitled");
        assert_eq!(media.uploader, "Band");
        assert_eq!(media.duration, 0.0);
        assert_eq!(media.stream.url, "https://cdn.example/x");
    }

    #[test]
    fn test_parse_dump_rejects_playlists_and_empty_output() {
        assert!(matches!(
            parse_dump(br#"{"_type": "playlist", "entries": []}"#, Platform::Youtube),
            Err(ResolutionError::UnsupportedSource(_))
        ));
        assert!(matches!(
            parse_dump(br#"{"title": "no stream"}"#, Platform::Youtube),
            Err(ResolutionError::ExtractionFailed(_))
        ));
        assert!(matches!(
            parse_dump(b"not json", Platform::Youtube),
            Err(ResolutionError::ExtractionFailed(_))
        ));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("ERROR: Unsupported URL: https://example.org/"),
            ResolutionError::UnsupportedSource(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Video unavailable"),
            ResolutionError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("ERROR: [youtube] abc: Private video. Sign in"),
            ResolutionError::NotFound(_)
        ));
        match classify_failure("ERROR: unable to download webpage: timed out\n") {
            ResolutionError::ExtractionFailed(diag) => assert!(diag.contains("timed out")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disallowed_platform_is_rejected_before_running() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp");
        let err = resolver
            .resolve("https://open.spotify.com/track/1")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::UnsupportedSource(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_extraction_failure() {
        let resolver = YtDlpResolver::new("/nonexistent/yt-dlp");
        let err = resolver
            .resolve("https://www.youtube.com/watch?v=abc")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolutionError::ExtractionFailed(_)));
    }
}
