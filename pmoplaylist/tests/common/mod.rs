//! Doublures partagées par les tests d'intégration

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pmoaudiocache::{AcquisitionError, AcquisitionPipeline, Fetcher, Transcoder};
use pmocache::{CacheStore, Quality};
use pmoplaylist::{PlaylistEngine, PLAYLIST_FILE_NAME};
use pmoresolver::{Platform, ResolutionError, ResolvedMedia, Resolver, StreamSource};
use tempfile::TempDir;

pub const URL_A: &str = "https://www.youtube.com/watch?v=AAAAAAAAAAA";
pub const URL_B: &str = "https://www.youtube.com/watch?v=BBBBBBBBBBB";
pub const URL_C: &str = "https://vimeo.com/123456";

/// Résolveur à catalogue fixe : URL -> (titre, durée)
pub struct FakeResolver {
    catalog: HashMap<String, (String, f64)>,
    pub calls: AtomicUsize,
}

impl FakeResolver {
    pub fn new() -> Self {
        let catalog = [
            (URL_A, "Song A", 200.0),
            (URL_B, "Song B", 150.0),
            (URL_C, "Song C", 90.0),
        ]
        .into_iter()
        .map(|(url, title, duration)| (url.to_string(), (title.to_string(), duration)))
        .collect();
        Self {
            catalog,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Resolver for FakeResolver {
    async fn resolve(&self, url: &str) -> pmoresolver::Result<ResolvedMedia> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (title, duration) = self
            .catalog
            .get(url)
            .cloned()
            .ok_or_else(|| ResolutionError::NotFound(format!("Video unavailable: {}", url)))?;
        Ok(ResolvedMedia {
            title,
            uploader: "Artist".into(),
            duration,
            platform: Platform::Youtube,
            thumbnail: None,
            filesize: None,
            stream: StreamSource {
                url: url.to_string(),
                http_headers: HashMap::new(),
                ext: Some("webm".into()),
            },
        })
    }
}

/// Téléchargeur lent qui compte ses appels
pub struct FakeFetcher {
    calls: AtomicUsize,
    delay: Duration,
    fail: bool,
}

impl FakeFetcher {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::from_millis(10))
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, _source: &StreamSource, dest: &Path) -> pmoaudiocache::Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.fail {
            return Err(AcquisitionError::NetworkFailure("HTTP error: 403 Forbidden".into()));
        }
        tokio::fs::write(dest, vec![1u8; 1000])
            .await
            .map_err(|e| AcquisitionError::Storage(e.to_string()))?;
        Ok(1000)
    }
}

pub struct CopyTranscoder;

#[async_trait]
impl Transcoder for CopyTranscoder {
    async fn transcode(&self, input: &Path, output: &Path, _quality: Quality) -> pmoaudiocache::Result<()> {
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| AcquisitionError::Storage(e.to_string()))?;
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store: Arc<CacheStore>,
    pub resolver: Arc<FakeResolver>,
    pub fetcher: Arc<FakeFetcher>,
    pub pipeline: Arc<AcquisitionPipeline>,
    pub engine: Arc<PlaylistEngine>,
}

impl Harness {
    pub async fn new(fetcher: FakeFetcher) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(CacheStore::open(dir.path().join("cache"), 100 * 1024 * 1024).unwrap());
        let resolver = Arc::new(FakeResolver::new());
        let fetcher = Arc::new(fetcher);
        let pipeline = Arc::new(AcquisitionPipeline::new(
            store.clone(),
            resolver.clone(),
            fetcher.clone(),
            Arc::new(CopyTranscoder),
        ));
        let engine = PlaylistEngine::open(
            playlist_path(&dir),
            resolver.clone(),
            pipeline.clone(),
            Quality::Kbps192,
        )
        .await
        .unwrap()
        .with_shuffle_seed(42);

        Self {
            dir,
            store,
            resolver,
            fetcher,
            pipeline,
            engine: Arc::new(engine),
        }
    }

    pub async fn fast() -> Self {
        Self::new(FakeFetcher::new(Duration::from_millis(10))).await
    }

    pub async fn reopen(&self) -> PlaylistEngine {
        PlaylistEngine::open(
            playlist_path(&self.dir),
            self.resolver.clone(),
            self.pipeline.clone(),
            Quality::Kbps192,
        )
        .await
        .unwrap()
    }
}

pub fn playlist_path(dir: &TempDir) -> PathBuf {
    dir.path().join("data").join(PLAYLIST_FILE_NAME)
}

