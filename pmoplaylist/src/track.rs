//! Piste de la playlist et dérivation de son identifiant

use chrono::{DateTime, Utc};
use pmoaudiocache::TrackSource;
use pmocache::{CacheState, Quality};
use pmoresolver::{Platform, ResolvedMedia};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Identifiant stable d'une URL normalisée
///
/// Les 8 premiers octets du SHA-256 de l'URL, soit 16 caractères hexadécimaux.
///
/// ```
/// use pmoplaylist::track_id_for;
///
/// let id = track_id_for("https://www.youtube.com/watch?v=dQw4w9WgXcQ");
/// assert_eq!(id.len(), 16);
/// ```
pub fn track_id_for(normalized_url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_url.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Métadonnées d'une piste
///
/// Après la création, seuls évoluent `cache_state`, qui reflète l'état du
/// cache pour la qualité de la piste au moment de la lecture, et les
/// compteurs `played`/`play_count`, mis à jour à chaque sélection réussie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct Track {
    #[cfg_attr(feature = "pmoserver", schema(example = "3f2a9c1d0b7e4a55"))]
    pub id: String,
    pub title: String,
    pub uploader: String,
    /// Durée en secondes
    pub duration: f64,
    pub source_url: String,
    #[cfg_attr(feature = "pmoserver", schema(value_type = String, example = "youtube"))]
    pub platform: Platform,
    pub thumbnail: Option<String>,
    pub quality: Quality,
    pub added_at: DateTime<Utc>,
    #[serde(default = "missing_state")]
    pub cache_state: CacheState,
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub play_count: u32,
}

fn missing_state() -> CacheState {
    CacheState::Missing
}

impl Track {
    pub fn from_resolved(normalized_url: &str, media: ResolvedMedia, quality: Quality) -> Self {
        Self {
            id: track_id_for(normalized_url),
            title: media.title,
            uploader: media.uploader,
            duration: media.duration,
            source_url: normalized_url.to_string(),
            platform: media.platform,
            thumbnail: media.thumbnail,
            quality,
            added_at: Utc::now(),
            cache_state: CacheState::Missing,
            played: false,
            play_count: 0,
        }
    }

    /// Enregistre une sélection de la piste
    pub fn mark_played(&mut self) {
        self.played = true;
        self.play_count += 1;
    }

    /// Description de la piste pour le pipeline d'acquisition
    pub fn source(&self) -> TrackSource {
        TrackSource {
            track_id: self.id.clone(),
            source_url: self.source_url.clone(),
            duration: self.duration,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_id_is_stable_and_short() {
        let a = track_id_for("https://www.youtube.com/watch?v=abc");
        let b = track_id_for("https://www.youtube.com/watch?v=abc");
        let c = track_id_for("https://www.youtube.com/watch?v=abd");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn test_missing_cache_state_defaults() {
        let json = r#"{
            "id": "0011223344556677",
            "title": "T",
            "uploader": "U",
            "duration": 12.5,
            "source_url": "https://vimeo.com/1",
            "platform": "vimeo",
            "thumbnail": null,
            "quality": "320",
            "added_at": "2024-01-01T00:00:00Z"
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.cache_state, CacheState::Missing);
        assert_eq!(track.quality, Quality::Kbps320);
        assert_eq!(track.platform, Platform::Vimeo);
        assert!(!track.played);
        assert_eq!(track.play_count, 0);
    }
}
