use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::platform::Platform;

/// Flux audio directement téléchargeable
///
/// L'URL est généralement signée et de courte durée de vie : elle doit être
/// obtenue juste avant le téléchargement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamSource {
    pub url: String,
    /// En-têtes HTTP exigés par la plateforme (User-Agent, Referer...)
    #[serde(default)]
    pub http_headers: HashMap<String, String>,
    /// Extension du conteneur source (`webm`, `m4a`...), si connue
    pub ext: Option<String>,
}

/// Résultat d'une résolution réussie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMedia {
    pub title: String,
    pub uploader: String,
    /// Durée en secondes
    pub duration: f64,
    pub platform: Platform,
    pub thumbnail: Option<String>,
    /// Taille annoncée du flux, en octets
    pub filesize: Option<u64>,
    pub stream: StreamSource,
}
