use thiserror::Error;

/// Erreurs du cache audio
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// L'éviction n'a pas pu libérer assez de place
    #[error("Cache full: {needed} bytes needed, {available} bytes available")]
    CacheFull { needed: u64, available: u64 },

    #[error("Invalid quality: {0}")]
    InvalidQuality(String),
}

pub type Result<T> = std::result::Result<T, Error>;
