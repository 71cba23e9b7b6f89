use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use pmoaudiocache::AcquisitionConfigExt;
use pmocache::{AudioCacheExt, CacheConfigExt};
use pmoconfig::get_config;
use pmoplaylist::{PlaylistApiExt, PlaylistConfigExt, PlaylistEngine};
use pmoresolver::ResolverConfigExt;
use pmoserver::{LoggingOptions, Server};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_config();

    // ========== PHASE 1 : Serveur et logs ==========

    let mut server = Server::new_configured();
    server
        .init_logging(LoggingOptions::from_config(&config))
        .await;

    // ========== PHASE 2 : Cache, acquisition et playlist ==========

    info!("💾 Opening audio cache...");
    let pipeline = Arc::new(
        config
            .create_acquisition_pipeline()
            .context("Failed to initialize the acquisition pipeline")?,
    );
    let default_quality = config.get_default_quality()?;

    let transcoder = Arc::new(config.create_transcoder()?);
    if !transcoder.is_available().await {
        warn!(
            "⚠️ ffmpeg not found at '{}': tracks cannot be transcoded",
            transcoder.program()
        );
    }

    info!("🎵 Loading playlist...");
    let engine = Arc::new(
        PlaylistEngine::open(
            config.playlist_file_path()?,
            Arc::new(config.create_resolver()?),
            pipeline.clone(),
            default_quality,
        )
        .await
        .context("Failed to load the playlist")?,
    );

    server
        .init_audio_cache(pipeline.store().clone(), default_quality)
        .await;
    server.init_playlist_api(engine.clone()).await;

    let cache_dir = pipeline.store().dir().to_path_buf();
    server
        .add_route("/api/health", move || {
            health(engine.clone(), cache_dir.clone(), transcoder.clone())
        })
        .await;

    // ========== PHASE 3 : Démarrage du serveur ==========

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    info!("✅ PMOTube is ready!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    Ok(())
}

/// État des composants pour `/api/health`
async fn health(
    engine: Arc<PlaylistEngine>,
    cache_dir: PathBuf,
    transcoder: Arc<pmoaudiocache::FfmpegTranscoder>,
) -> serde_json::Value {
    serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "components": {
            "playlist": {
                "tracks": engine.len().await,
            },
            "cache": {
                "directory": cache_dir.display().to_string(),
                "exists": cache_dir.is_dir(),
            },
            "ffmpeg": {
                "available": transcoder.is_available().await,
            },
        },
    })
}
