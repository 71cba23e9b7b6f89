//! Validation des URLs et détection de la plateforme d'origine

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ResolutionError, Result};

/// Plateforme d'hébergement d'un média
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Vimeo,
    Facebook,
    Soundcloud,
    Spotify,
    Twitch,
    Other,
}

const HOSTS: &[(&str, Platform)] = &[
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("vimeo.com", Platform::Vimeo),
    ("facebook.com", Platform::Facebook),
    ("fb.watch", Platform::Facebook),
    ("soundcloud.com", Platform::Soundcloud),
    ("spotify.com", Platform::Spotify),
    ("twitch.tv", Platform::Twitch),
];

impl Platform {
    /// Détecte la plateforme depuis le nom d'hôte (sous-domaines inclus)
    pub fn detect(url: &Url) -> Platform {
        let Some(host) = url.host_str() else {
            return Platform::Other;
        };
        let host = host.to_ascii_lowercase();

        HOSTS
            .iter()
            .find(|(domain, _)| host == *domain || host.ends_with(&format!(".{}", domain)))
            .map(|(_, platform)| *platform)
            .unwrap_or(Platform::Other)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Vimeo => "vimeo",
            Platform::Facebook => "facebook",
            Platform::Soundcloud => "soundcloud",
            Platform::Spotify => "spotify",
            Platform::Twitch => "twitch",
            Platform::Other => "other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "vimeo" => Ok(Platform::Vimeo),
            "facebook" => Ok(Platform::Facebook),
            "soundcloud" => Ok(Platform::Soundcloud),
            "spotify" => Ok(Platform::Spotify),
            "twitch" => Ok(Platform::Twitch),
            "other" => Ok(Platform::Other),
            other => Err(ResolutionError::UnsupportedSource(format!(
                "unknown platform '{}'",
                other
            ))),
        }
    }
}

/// Vérifie qu'une URL est absolue, en http(s), avec un hôte
pub fn validate_url(raw: &str) -> Result<Url> {
    let invalid = |reason: &str| ResolutionError::InvalidUrl {
        url: raw.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty URL"));
    }

    let url = Url::parse(trimmed).map_err(|e| invalid(&e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(invalid("missing host"));
    }

    Ok(url)
}
