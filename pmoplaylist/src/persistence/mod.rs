//! Persistance de la playlist dans un fichier JSON
//!
//! L'état complet (pistes, ordre, curseur) est réécrit à chaque mutation :
//! écriture dans un fichier temporaire, `fsync`, puis renommage. Un fichier
//! illisible est mis de côté (`playlist.json.bak.<timestamp>`) et la playlist
//! repart vide.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error};

use crate::error::{Error, Result};
use crate::track::Track;

/// Version du format de fichier
pub const PLAYLIST_FILE_VERSION: u32 = 1;

/// Nom du fichier dans le répertoire de données
pub const PLAYLIST_FILE_NAME: &str = "playlist.json";

/// Contenu du fichier de playlist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistFile {
    #[serde(default = "file_version")]
    pub version: u32,
    #[serde(default)]
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub current_index: Option<usize>,
}

fn file_version() -> u32 {
    PLAYLIST_FILE_VERSION
}

impl Default for PlaylistFile {
    fn default() -> Self {
        Self {
            version: PLAYLIST_FILE_VERSION,
            tracks: Vec::new(),
            order: Vec::new(),
            current_index: None,
        }
    }
}

/// Lecture et écriture atomique du fichier de playlist
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    path: PathBuf,
}

impl PersistenceManager {
    /// Crée le gestionnaire ; le répertoire parent est créé au besoin
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Storage(format!("Failed to create directory {}: {}", parent.display(), e))
            })?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Charge le fichier
    ///
    /// Un fichier absent donne une playlist vide. Un fichier corrompu est
    /// renommé en `.bak.<timestamp unix>` puis ignoré.
    pub async fn load(&self) -> Result<PlaylistFile> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No playlist file at {}, starting empty", self.path.display());
                return Ok(PlaylistFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<PlaylistFile>(&content) {
            Ok(file) => Ok(file),
            Err(e) => {
                let backup = self.backup_path();
                tokio::fs::rename(&self.path, &backup).await?;
                error!(
                    "Corrupted playlist file {} ({}), moved to {}",
                    self.path.display(),
                    e,
                    backup.display()
                );
                Ok(PlaylistFile::default())
            }
        }
    }

    /// Réécrit le fichier en entier
    pub async fn save(&self, file: &PlaylistFile) -> Result<()> {
        let json = serde_json::to_vec_pretty(file)?;
        let tmp = self.sibling(".tmp");

        let mut out = tokio::fs::File::create(&tmp).await?;
        let written = async {
            out.write_all(&json).await?;
            out.sync_all().await
        }
        .await;
        drop(out);

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        self.sibling(&format!(".bak.{}", chrono::Utc::now().timestamp()))
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PersistenceManager::new(dir.path().join(PLAYLIST_FILE_NAME)).unwrap();
        assert_eq!(manager.load().await.unwrap(), PlaylistFile::default());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PersistenceManager::new(dir.path().join("nested").join(PLAYLIST_FILE_NAME)).unwrap();

        let file = PlaylistFile {
            order: vec!["a".into(), "b".into()],
            current_index: Some(1),
            ..Default::default()
        };
        manager.save(&file).await.unwrap();

        assert_eq!(manager.load().await.unwrap(), file);
        assert!(!manager.sibling(".tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupted_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PLAYLIST_FILE_NAME);
        std::fs::write(&path, b"{ not json").unwrap();

        let manager = PersistenceManager::new(&path).unwrap();
        assert_eq!(manager.load().await.unwrap(), PlaylistFile::default());
        assert!(!path.exists());

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.starts_with("playlist.json.bak."))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
