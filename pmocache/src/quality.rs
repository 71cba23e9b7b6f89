use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Qualité de transcodage d'une piste
///
/// Les trois débits produisent du MP3, `flac` un fichier sans perte.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub enum Quality {
    #[serde(rename = "128")]
    Kbps128,
    #[default]
    #[serde(rename = "192")]
    Kbps192,
    #[serde(rename = "320")]
    Kbps320,
    #[serde(rename = "flac")]
    Flac,
}

/// Débit retenu pour estimer la taille d'un fichier FLAC
const FLAC_ESTIMATED_KBPS: u32 = 1000;

impl Quality {
    pub const ALL: [Quality; 4] = [
        Quality::Kbps128,
        Quality::Kbps192,
        Quality::Kbps320,
        Quality::Flac,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Kbps128 => "128",
            Quality::Kbps192 => "192",
            Quality::Kbps320 => "320",
            Quality::Flac => "flac",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Quality::Flac => "flac",
            _ => "mp3",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Quality::Flac => "audio/flac",
            _ => "audio/mpeg",
        }
    }

    /// Débit cible en kbps, `None` pour le FLAC
    pub fn bitrate_kbps(&self) -> Option<u32> {
        match self {
            Quality::Kbps128 => Some(128),
            Quality::Kbps192 => Some(192),
            Quality::Kbps320 => Some(320),
            Quality::Flac => None,
        }
    }

    /// Taille attendue en octets d'une piste de `duration` secondes
    pub fn estimated_size(&self, duration: f64) -> u64 {
        let kbps = self.bitrate_kbps().unwrap_or(FLAC_ESTIMATED_KBPS) as f64;
        (duration.max(0.0) * kbps * 1000.0 / 8.0).ceil() as u64
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches("kbps") {
            "128" => Ok(Quality::Kbps128),
            "192" => Ok(Quality::Kbps192),
            "320" => Ok(Quality::Kbps320),
            "flac" => Ok(Quality::Flac),
            other => Err(Error::InvalidQuality(other.to_string())),
        }
    }
}
