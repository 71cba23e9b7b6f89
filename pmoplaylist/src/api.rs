//! API REST de la playlist
//!
//! Routes montées sous `/api/playlist` par [`PlaylistApiExt`], ainsi que
//! deux routes audio qui ont besoin des pistes de la playlist, sous
//! `/api/audio` :
//!
//! - `POST /api/audio/info` résout une URL sans l'ajouter
//! - `GET /api/audio/download/{track_id}` télécharge le fichier en pièce
//!   jointe, après l'avoir acquis si besoin
//!
//! Les erreurs sont renvoyées sous la forme `{success: false, error, kind}`.

use std::sync::Arc;

use async_stream::stream;
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use pmoaudiocache::AcquisitionError;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use pmocache::{cached_file_response, error_response, CacheKey, Quality};
use pmoresolver::ResolutionError;
use pmoserver::Server;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use utoipa::{OpenApi, ToSchema};

use crate::engine::{PlaylistEngine, PlaylistSnapshot, PlaylistStats};
use crate::error::Error;
use crate::track::Track;

/// Réponse de `GET /api/playlist`
#[derive(Debug, Serialize, ToSchema)]
pub struct PlaylistResponse {
    pub success: bool,
    pub tracks: Vec<Track>,
    pub stats: PlaylistStats,
    pub current_track: Option<Track>,
}

impl From<PlaylistSnapshot> for PlaylistResponse {
    fn from(snapshot: PlaylistSnapshot) -> Self {
        Self {
            success: true,
            tracks: snapshot.tracks,
            stats: snapshot.stats,
            current_track: snapshot.current_track,
        }
    }
}

/// Réponse portant éventuellement une piste
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackResponse {
    pub success: bool,
    pub track: Option<Track>,
}

impl TrackResponse {
    fn new(track: Option<Track>) -> Self {
        Self {
            success: true,
            track,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Enveloppe d'erreur
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = false)]
    pub success: bool,
    pub error: String,
    #[schema(example = "track_not_found")]
    pub kind: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddTrackRequest {
    #[schema(example = "https://www.youtube.com/watch?v=dQw4w9WgXcQ")]
    pub url: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetCurrentRequest {
    pub track_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveTrackRequest {
    pub track_id: String,
    #[schema(example = 0)]
    pub position: usize,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MediaInfoRequest {
    #[schema(example = "https://www.youtube.com/watch?v=dQw4w9WgXcQ")]
    pub url: String,
}

/// Réponse de `POST /api/audio/info`
#[derive(Debug, Serialize, ToSchema)]
pub struct MediaInfoResponse {
    pub success: bool,
    pub info: Track,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub quality: Option<String>,
}

/// Code HTTP associé à une erreur du moteur
pub fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::TrackNotFound(_) => StatusCode::NOT_FOUND,
        Error::InvalidPosition { .. } => StatusCode::BAD_REQUEST,
        Error::Superseded(_) => StatusCode::CONFLICT,
        Error::Resolution(ResolutionError::NotFound(_)) => StatusCode::NOT_FOUND,
        Error::Resolution(_) => StatusCode::BAD_REQUEST,
        Error::Acquisition(AcquisitionError::CacheFull { .. }) => StatusCode::INSUFFICIENT_STORAGE,
        Error::Acquisition(_) => StatusCode::BAD_GATEWAY,
        Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn map_error(error: Error) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        warn!("Playlist request failed: {}", error);
    } else {
        debug!("Playlist request rejected: {}", error);
    }
    error_response(status, error.kind(), error.to_string())
}

fn success() -> Response {
    Json(SuccessResponse { success: true }).into_response()
}

#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Pistes, statistiques et piste courante", body = PlaylistResponse)
    ),
    tag = "playlist"
)]
async fn get_playlist(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    Json(PlaylistResponse::from(engine.snapshot().await)).into_response()
}

#[utoipa::path(
    post,
    path = "/add",
    request_body = AddTrackRequest,
    responses(
        (status = 200, description = "Piste ajoutée (ou déjà présente)", body = TrackResponse),
        (status = 400, description = "URL invalide ou source non prise en charge", body = ErrorResponse),
        (status = 404, description = "Média introuvable", body = ErrorResponse)
    ),
    tag = "playlist"
)]
async fn add_track(
    State(engine): State<Arc<PlaylistEngine>>,
    Json(req): Json<AddTrackRequest>,
) -> Response {
    match engine.add(&req.url).await {
        Ok(track) => Json(TrackResponse::new(Some(track))).into_response(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    delete,
    path = "/remove/{track_id}",
    params(("track_id" = String, Path, description = "Identifiant de la piste")),
    responses(
        (status = 200, description = "Piste retirée", body = SuccessResponse),
        (status = 404, description = "Piste inconnue", body = ErrorResponse)
    ),
    tag = "playlist"
)]
async fn remove_track(
    State(engine): State<Arc<PlaylistEngine>>,
    Path(track_id): Path<String>,
) -> Response {
    match engine.remove(&track_id).await {
        Ok(()) => success(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    post,
    path = "/next",
    responses(
        (status = 200, description = "Nouvelle piste courante, absente si la playlist est vide", body = TrackResponse),
        (status = 502, description = "Acquisition impossible", body = ErrorResponse),
        (status = 507, description = "Cache plein", body = ErrorResponse)
    ),
    tag = "playlist"
)]
async fn next_track(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    match engine.next().await {
        Ok(track) => Json(TrackResponse::new(track)).into_response(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    post,
    path = "/previous",
    responses(
        (status = 200, description = "Nouvelle piste courante, absente si la playlist est vide", body = TrackResponse),
        (status = 502, description = "Acquisition impossible", body = ErrorResponse),
        (status = 507, description = "Cache plein", body = ErrorResponse)
    ),
    tag = "playlist"
)]
async fn previous_track(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    match engine.previous().await {
        Ok(track) => Json(TrackResponse::new(track)).into_response(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    post,
    path = "/shuffle",
    responses(
        (status = 200, description = "Playlist mélangée ; piste courante inchangée", body = TrackResponse)
    ),
    tag = "playlist"
)]
async fn shuffle(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    match engine.shuffle().await {
        Ok(track) => Json(TrackResponse::new(track)).into_response(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    get,
    path = "/current",
    responses(
        (status = 200, description = "Piste courante", body = TrackResponse)
    ),
    tag = "playlist"
)]
async fn get_current(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    Json(TrackResponse::new(engine.current().await)).into_response()
}

#[utoipa::path(
    post,
    path = "/current",
    request_body = SetCurrentRequest,
    responses(
        (status = 200, description = "Piste sélectionnée, audio en cache", body = TrackResponse),
        (status = 404, description = "Piste inconnue", body = ErrorResponse),
        (status = 409, description = "Navigation plus récente déjà validée", body = ErrorResponse),
        (status = 502, description = "Acquisition impossible", body = ErrorResponse),
        (status = 507, description = "Cache plein", body = ErrorResponse)
    ),
    tag = "playlist"
)]
async fn set_current(
    State(engine): State<Arc<PlaylistEngine>>,
    Json(req): Json<SetCurrentRequest>,
) -> Response {
    match engine.set_current(&req.track_id).await {
        Ok(track) => Json(TrackResponse::new(Some(track))).into_response(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    post,
    path = "/move",
    request_body = MoveTrackRequest,
    responses(
        (status = 200, description = "Piste déplacée", body = SuccessResponse),
        (status = 400, description = "Position invalide", body = ErrorResponse),
        (status = 404, description = "Piste inconnue", body = ErrorResponse)
    ),
    tag = "playlist"
)]
async fn move_track(
    State(engine): State<Arc<PlaylistEngine>>,
    Json(req): Json<MoveTrackRequest>,
) -> Response {
    match engine.move_track(&req.track_id, req.position).await {
        Ok(()) => success(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    delete,
    path = "/clear",
    responses(
        (status = 200, description = "Playlist vidée, cache conservé", body = SuccessResponse)
    ),
    tag = "playlist"
)]
async fn clear(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    match engine.clear().await {
        Ok(()) => success(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    get,
    path = "/export.m3u",
    responses(
        (status = 200, description = "Playlist au format M3U étendu", content_type = "audio/x-mpegurl", body = String)
    ),
    tag = "playlist"
)]
async fn export_m3u(State(engine): State<Arc<PlaylistEngine>>) -> Response {
    (
        [
            (header::CONTENT_TYPE, "audio/x-mpegurl"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"playlist.m3u\""),
        ],
        engine.export_m3u().await,
    )
        .into_response()
}

/// Flux SSE des évènements (`updated`, `current_changed`, `cleared`)
#[utoipa::path(
    get,
    path = "/events",
    responses(
        (status = 200, description = "Flux SSE des évènements de la playlist", content_type = "text/event-stream")
    ),
    tag = "playlist"
)]
async fn playlist_events(State(engine): State<Arc<PlaylistEngine>>) -> impl IntoResponse {
    let mut rx = engine.subscribe();

    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok::<_, axum::Error>(Event::default().event(event.name()).data(json));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("SSE client lagging, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(
    post,
    path = "/info",
    request_body = MediaInfoRequest,
    responses(
        (status = 200, description = "Métadonnées du média, sans ajout à la playlist", body = MediaInfoResponse),
        (status = 400, description = "URL invalide ou source non prise en charge", body = ErrorResponse),
        (status = 404, description = "Média introuvable", body = ErrorResponse)
    ),
    tag = "audio"
)]
async fn media_info(
    State(engine): State<Arc<PlaylistEngine>>,
    Json(req): Json<MediaInfoRequest>,
) -> Response {
    match engine.inspect(&req.url).await {
        Ok(track) => Json(MediaInfoResponse {
            success: true,
            info: track,
        })
        .into_response(),
        Err(e) => map_error(e),
    }
}

#[utoipa::path(
    get,
    path = "/download/{track_id}",
    params(
        ("track_id" = String, Path, description = "Identifiant de la piste"),
        ("quality" = Option<String>, Query, description = "128, 192, 320 ou flac ; qualité de la piste par défaut")
    ),
    responses(
        (status = 200, description = "Fichier audio en pièce jointe"),
        (status = 400, description = "Qualité invalide", body = ErrorResponse),
        (status = 404, description = "Piste inconnue", body = ErrorResponse),
        (status = 502, description = "Acquisition impossible", body = ErrorResponse)
    ),
    tag = "audio"
)]
async fn download_audio(
    State(engine): State<Arc<PlaylistEngine>>,
    Path(track_id): Path<String>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Response {
    let quality = match query.quality.as_deref().map(str::parse::<Quality>).transpose() {
        Ok(quality) => quality,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, "invalid_input", e.to_string()),
    };

    let track = match engine.acquire(&track_id, quality).await {
        Ok(track) => track,
        Err(e) => return map_error(e),
    };
    let quality = quality.unwrap_or(track.quality);

    let key = CacheKey::new(track.id.clone(), quality);
    let mut response =
        cached_file_response(engine.pipeline().store(), &key, headers.get(header::RANGE)).await;

    if response.status().is_success() {
        let disposition = attachment_disposition(&track.title, quality.extension());
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            response
                .headers_mut()
                .insert(header::CONTENT_DISPOSITION, value);
        }
    }
    response
}

/// Caractères encodés dans `filename*`
const FILENAME_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

/// Nom de fichier ASCII de repli, plus le titre complet encodé en UTF-8
fn attachment_disposition(title: &str, ext: &str) -> String {
    let fallback: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || " -_.()".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    let fallback = match fallback.trim() {
        "" => "audio",
        name => name,
    };

    let full_name = format!("{}.{}", title, ext);
    format!(
        "attachment; filename=\"{}.{}\"; filename*=UTF-8''{}",
        fallback,
        ext,
        utf8_percent_encode(&full_name, FILENAME_ENCODE_SET)
    )
}

#[derive(OpenApi)]
#[openapi(
    paths(media_info, download_audio),
    components(schemas(MediaInfoRequest, MediaInfoResponse, ErrorResponse, Track)),
    tags((name = "audio", description = "Informations et téléchargement des pistes")),
    info(
        title = "PMOTube Audio API",
        version = "0.1.0",
        description = "Résolution d'URL et téléchargement des fichiers audio",
    )
)]
pub struct AudioApiDoc;

#[derive(OpenApi)]
#[openapi(
    paths(
        get_playlist,
        add_track,
        remove_track,
        next_track,
        previous_track,
        shuffle,
        get_current,
        set_current,
        move_track,
        clear,
        export_m3u,
        playlist_events,
    ),
    components(schemas(
        PlaylistResponse,
        TrackResponse,
        SuccessResponse,
        ErrorResponse,
        AddTrackRequest,
        SetCurrentRequest,
        MoveTrackRequest,
        PlaylistStats,
        Track,
    )),
    tags((name = "playlist", description = "File de lecture et piste courante")),
    info(
        title = "PMOTube Playlist API",
        version = "0.1.0",
        description = "Ajout, navigation et mélange de la playlist",
    )
)]
pub struct PlaylistApiDoc;

/// Router de l'API, à monter sous `/api/playlist`
pub fn create_playlist_router(engine: Arc<PlaylistEngine>) -> Router {
    Router::new()
        .route("/", get(get_playlist))
        .route("/add", post(add_track))
        .route("/remove/{track_id}", delete(remove_track))
        .route("/next", post(next_track))
        .route("/previous", post(previous_track))
        .route("/shuffle", post(shuffle))
        .route("/current", get(get_current).post(set_current))
        .route("/move", post(move_track))
        .route("/clear", delete(clear))
        .route("/export.m3u", get(export_m3u))
        .route("/events", get(playlist_events))
        .with_state(engine)
}

/// Router des routes audio liées aux pistes, à monter sous `/api/audio`
pub fn create_audio_router(engine: Arc<PlaylistEngine>) -> Router {
    Router::new()
        .route("/info", post(media_info))
        .route("/download/{track_id}", get(download_audio))
        .with_state(engine)
}

/// Trait d'extension de `pmoserver::Server` pour la playlist
pub trait PlaylistApiExt {
    async fn init_playlist_api(&mut self, engine: Arc<PlaylistEngine>);
}

impl PlaylistApiExt for Server {
    async fn init_playlist_api(&mut self, engine: Arc<PlaylistEngine>) {
        self.add_openapi(
            create_playlist_router(engine.clone()),
            PlaylistApiDoc::openapi(),
            "playlist",
        )
        .await;
        self.add_openapi(create_audio_router(engine), AudioApiDoc::openapi(), "audio")
            .await;
    }
}
