//! Erreurs de résolution

use thiserror::Error;

/// Échec de la résolution d'une URL en média lisible
///
/// Ces erreurs ne sont jamais retentées automatiquement.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// URL mal formée, non absolue ou d'un schéma autre que http(s)
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Plateforme non reconnue ou non autorisée
    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    /// Contenu distant absent, privé ou supprimé
    #[error("Media not found: {0}")]
    NotFound(String),

    /// Toute autre défaillance de l'extracteur, avec son diagnostic brut
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),
}

impl ResolutionError {
    /// Identifiant stable de la variante, exposé dans les réponses HTTP
    pub fn kind(&self) -> &'static str {
        match self {
            ResolutionError::InvalidUrl { .. } => "invalid_url",
            ResolutionError::UnsupportedSource(_) => "unsupported_source",
            ResolutionError::NotFound(_) => "not_found",
            ResolutionError::ExtractionFailed(_) => "extraction_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ResolutionError>;
