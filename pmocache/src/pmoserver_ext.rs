//! Extension pmoserver : streaming des fichiers du cache et API de gestion
//!
//! ## Routes
//!
//! - `GET /api/audio/stream/{track_id}?quality=192` sert un fichier prêt,
//!   avec prise en charge de l'en-tête `Range`
//! - `GET /api/cache/info` renvoie les statistiques du cache
//! - `POST /api/cache/clear` supprime les entrées inutilisées
//!
//! Une piste qui n'est pas encore prête répond `503` avec `Retry-After` :
//! le streaming ne déclenche jamais de téléchargement.

use std::io::{ErrorKind, SeekFrom};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pmoserver::Server;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};
use utoipa::{OpenApi, ToSchema};

use crate::entry::{CacheKey, CacheState};
use crate::quality::Quality;
use crate::range::ByteRange;
use crate::store::{CacheStats, CacheStore};

/// Délai suggéré au client avant de redemander une piste en préparation
const RETRY_AFTER_SECS: &str = "5";

/// État partagé par les handlers
#[derive(Clone)]
pub struct AudioCacheState {
    pub store: Arc<CacheStore>,
    pub default_quality: Quality,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub quality: Option<String>,
}

/// Enveloppe d'erreur JSON commune à toutes les routes
pub fn error_response(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.into(),
            "kind": kind,
        })),
    )
        .into_response()
}

async fn stream_audio(
    State(state): State<AudioCacheState>,
    Path(track_id): Path<String>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    let quality = match query.quality.as_deref() {
        None => state.default_quality,
        Some(raw) => match raw.parse::<Quality>() {
            Ok(q) => q,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
        },
    };
    let key = CacheKey::new(track_id, quality);
    cached_file_response(&state.store, &key, headers.get(header::RANGE)).await
}

/// Réponse `503` d'une piste qui n'est pas (ou plus) disponible
fn not_ready_response(key: &CacheKey, state: CacheState, detail: Option<String>) -> Response {
    debug!(key = %key, state = %state, "Audio requested for a track not ready");
    let mut body = json!({
        "success": false,
        "error": "Audio not ready",
        "kind": "not_ready",
        "state": state,
    });
    if let Some(detail) = detail {
        body["detail"] = json!(detail);
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        [(header::RETRY_AFTER, RETRY_AFTER_SECS)],
        Json(body),
    )
        .into_response()
}

/// Sert le fichier d'une entrée prête, en respectant l'en-tête `Range`
///
/// Une entrée absente, en cours ou en échec répond `503`. Ne déclenche
/// jamais de téléchargement.
pub async fn cached_file_response(
    store: &CacheStore,
    key: &CacheKey,
    range: Option<&HeaderValue>,
) -> Response {
    let entry = match store.get(key).await {
        Ok(entry) => entry,
        Err(e) => {
            error!(key = %key, "Cannot read cache entry: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string());
        }
    };

    let path = match (entry.state, entry.file_path) {
        (CacheState::Ready, Some(path)) => path,
        (state, _) => return not_ready_response(key, state, entry.error),
    };

    if let Err(e) = store.touch(key).await {
        warn!(key = %key, "Cannot record access: {}", e);
    }

    file_response(key, &path, range).await
}

async fn file_response(key: &CacheKey, path: &std::path::Path, range: Option<&HeaderValue>) -> Response {
    match serve_file(path, key.quality, range).await {
        Ok(response) => response,
        // Fichier évincé entre la lecture de l'index et l'ouverture
        Err(e) if e.kind() == ErrorKind::NotFound => {
            not_ready_response(key, CacheState::Missing, None)
        }
        Err(e) => {
            error!(key = %key, "Cannot stream {}: {}", path.display(), e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string())
        }
    }
}

async fn serve_file(
    path: &std::path::Path,
    quality: Quality,
    range: Option<&HeaderValue>,
) -> std::io::Result<Response> {
    let mut file = tokio::fs::File::open(path).await?;
    let size = file.metadata().await?.len();
    let content_type = quality.content_type();

    let range = range
        .and_then(|h| h.to_str().ok())
        .map(|h| ByteRange::parse(h, size))
        .unwrap_or(ByteRange::Malformed);

    let response = match range {
        ByteRange::Satisfiable { start, end } => {
            let len = end - start + 1;
            file.seek(SeekFrom::Start(start)).await?;
            let stream = ReaderStream::new(file.take(len));

            Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type)
                .header(header::CONTENT_LENGTH, len)
                .header(header::ACCEPT_RANGES, "bytes")
                .header(
                    header::CONTENT_RANGE,
                    format!("bytes {}-{}/{}", start, end, size),
                )
                .body(Body::from_stream(stream))
        }
        ByteRange::Unsatisfiable => Response::builder()
            .status(StatusCode::RANGE_NOT_SATISFIABLE)
            .header(header::CONTENT_RANGE, format!("bytes */{}", size))
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::empty()),
        ByteRange::Malformed => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, size)
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::from_stream(ReaderStream::new(file))),
    };

    response.map_err(std::io::Error::other)
}

/// Réponse de `GET /api/cache/info`
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheInfoResponse {
    pub success: bool,
    pub cache_info: CacheStats,
}

/// Corps de `POST /api/cache/clear`
#[derive(Debug, Deserialize, ToSchema)]
pub struct ClearRequest {
    /// Âge minimal, en jours, du dernier accès ; `0` vide tout le cache
    /// sauf la piste courante et les téléchargements en cours
    #[serde(default = "default_days_old")]
    #[schema(example = 7)]
    pub days_old: u32,
}

fn default_days_old() -> u32 {
    7
}

/// Réponse de `POST /api/cache/clear`
#[derive(Debug, Serialize, ToSchema)]
pub struct ClearResponse {
    pub success: bool,
    pub removed: usize,
    pub freed_bytes: u64,
}

/// Statistiques d'occupation du cache
#[utoipa::path(
    get,
    path = "/info",
    responses(
        (status = 200, description = "Statistiques du cache", body = CacheInfoResponse),
        (status = 500, description = "Erreur de stockage")
    ),
    tag = "cache"
)]
async fn cache_info(State(state): State<AudioCacheState>) -> Response {
    match state.store.stats().await {
        Ok(stats) => Json(CacheInfoResponse {
            success: true,
            cache_info: stats,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

/// Supprime les entrées non consultées depuis `days_old` jours
#[utoipa::path(
    post,
    path = "/clear",
    request_body = ClearRequest,
    responses(
        (status = 200, description = "Bilan du nettoyage", body = ClearResponse),
        (status = 500, description = "Erreur de stockage")
    ),
    tag = "cache"
)]
async fn cache_clear(
    State(state): State<AudioCacheState>,
    Json(req): Json<ClearRequest>,
) -> Response {
    let older_than = match req.days_old {
        0 => None,
        days => Some(chrono::Duration::days(days as i64)),
    };

    match state.store.clear(older_than).await {
        Ok(report) => Json(ClearResponse {
            success: true,
            removed: report.removed,
            freed_bytes: report.freed_bytes,
        })
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "storage", e.to_string()),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(cache_info, cache_clear),
    components(schemas(
        CacheInfoResponse,
        ClearRequest,
        ClearResponse,
        CacheStats,
        crate::store::QualityStats,
    )),
    tags((name = "cache", description = "Gestion du cache audio")),
    info(
        title = "PMOTube Cache API",
        version = "0.1.0",
        description = "Statistiques et nettoyage du cache audio",
    )
)]
pub struct CacheApiDoc;

/// Router de streaming, à monter sous `/api/audio`
pub fn create_stream_router(state: AudioCacheState) -> Router {
    Router::new()
        .route("/stream/{track_id}", get(stream_audio))
        .with_state(state)
}

/// Router de l'API de gestion, à monter sous `/api/cache`
pub fn create_cache_api_router(state: AudioCacheState) -> Router {
    Router::new()
        .route("/info", get(cache_info))
        .route("/clear", post(cache_clear))
        .with_state(state)
}

/// Trait d'extension de `pmoserver::Server` pour le cache audio
pub trait AudioCacheExt {
    /// Enregistre les routes de streaming et l'API du cache
    async fn init_audio_cache(&mut self, store: Arc<CacheStore>, default_quality: Quality);
}

impl AudioCacheExt for Server {
    async fn init_audio_cache(&mut self, store: Arc<CacheStore>, default_quality: Quality) {
        let state = AudioCacheState {
            store,
            default_quality,
        };

        self.add_router("/api/audio", create_stream_router(state.clone()))
            .await;
        self.add_openapi(
            create_cache_api_router(state),
            CacheApiDoc::openapi(),
            "cache",
        )
        .await;
    }
}
