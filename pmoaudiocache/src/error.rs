use pmoresolver::ResolutionError;
use thiserror::Error;

/// Échec de l'acquisition d'une piste
///
/// `Clone` : toutes les tâches en attente sur un même téléchargement
/// reçoivent la même erreur.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AcquisitionError {
    /// Résolution, téléchargement, statut HTTP en erreur ou délai dépassé
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    /// ffmpeg absent ou terminé en erreur
    #[error("Transcode failure: {0}")]
    TranscodeFailure(String),

    #[error("Cache full: {needed} bytes needed, {available} bytes available")]
    CacheFull { needed: u64, available: u64 },

    /// Erreur disque lors de l'installation du fichier
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AcquisitionError {
    pub fn kind(&self) -> &'static str {
        match self {
            AcquisitionError::NetworkFailure(_) => "network_failure",
            AcquisitionError::TranscodeFailure(_) => "transcode_failure",
            AcquisitionError::CacheFull { .. } => "cache_full",
            AcquisitionError::Storage(_) => "storage",
        }
    }
}

impl From<pmocache::Error> for AcquisitionError {
    fn from(e: pmocache::Error) -> Self {
        match e {
            pmocache::Error::CacheFull { needed, available } => {
                AcquisitionError::CacheFull { needed, available }
            }
            other => AcquisitionError::Storage(other.to_string()),
        }
    }
}

impl From<ResolutionError> for AcquisitionError {
    fn from(e: ResolutionError) -> Self {
        AcquisitionError::NetworkFailure(format!("cannot refresh stream source: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, AcquisitionError>;
