//! Types d'erreurs pour pmoplaylist

use pmoaudiocache::AcquisitionError;
use pmoresolver::ResolutionError;

/// Erreurs du moteur de playlist
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Track not found: {0}")]
    TrackNotFound(String),

    #[error("Invalid position {position} (playlist has {len} tracks)")]
    InvalidPosition { position: usize, len: usize },

    /// Une navigation plus récente a déjà déplacé le curseur
    #[error("Navigation to {0} superseded by a more recent one")]
    Superseded(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// Échec d'écriture ou de lecture du fichier de playlist
    #[error("Playlist storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Catégorie exposée dans les réponses HTTP
    pub fn kind(&self) -> &'static str {
        match self {
            Error::TrackNotFound(_) => "track_not_found",
            Error::InvalidPosition { .. } => "invalid_input",
            Error::Superseded(_) => "superseded",
            Error::Resolution(e) => e.kind(),
            Error::Acquisition(e) => e.kind(),
            Error::Storage(_) => "storage",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

impl From<pmocache::Error> for Error {
    fn from(e: pmocache::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

/// Type Result spécialisé pour pmoplaylist
pub type Result<T> = std::result::Result<T, Error>;
