use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quality::Quality;

/// Clé d'une entrée : une piste dans une qualité donnée
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct CacheKey {
    pub track_id: String,
    pub quality: Quality,
}

impl CacheKey {
    pub fn new(track_id: impl Into<String>, quality: Quality) -> Self {
        Self {
            track_id: track_id.into(),
            quality,
        }
    }

    /// Nom du fichier définitif : `{track_id}.{quality}.{ext}`
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}.{}",
            self.track_id,
            self.quality.as_str(),
            self.quality.extension()
        )
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.track_id, self.quality)
    }
}

/// Cycle de vie d'une entrée
///
/// `Downloading` n'existe qu'en mémoire : un redémarrage l'oublie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum CacheState {
    Missing,
    Downloading,
    Ready,
    Failed,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Missing => "missing",
            CacheState::Downloading => "downloading",
            CacheState::Ready => "ready",
            CacheState::Failed => "failed",
        }
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// État courant d'une clé du cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct CacheEntry {
    pub key: CacheKey,
    pub state: CacheState,
    /// Chemin du fichier, renseigné uniquement pour une entrée `Ready`
    #[cfg_attr(feature = "pmoserver", schema(value_type = Option<String>))]
    pub file_path: Option<PathBuf>,
    pub byte_size: u64,
    pub last_access: Option<DateTime<Utc>>,
    pub hits: u64,
    /// Diagnostic du dernier échec
    pub error: Option<String>,
}

impl CacheEntry {
    pub fn missing(key: CacheKey) -> Self {
        Self {
            key,
            state: CacheState::Missing,
            file_path: None,
            byte_size: 0,
            last_access: None,
            hits: 0,
            error: None,
        }
    }

    pub fn downloading(key: CacheKey) -> Self {
        Self {
            state: CacheState::Downloading,
            ..Self::missing(key)
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == CacheState::Ready
    }
}
