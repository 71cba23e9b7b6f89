//! Extension de pmoconfig pour la playlist

use std::path::PathBuf;

use anyhow::Result;
use pmoconfig::Config;

use crate::persistence::PLAYLIST_FILE_NAME;

/// Trait d'extension pour pmoconfig::Config
pub trait PlaylistConfigExt {
    /// Répertoire de données de la playlist (`playlist.directory`), créé
    /// au besoin
    fn get_playlist_dir(&self) -> Result<String>;

    /// Chemin du fichier `playlist.json`
    fn playlist_file_path(&self) -> Result<PathBuf>;
}

impl PlaylistConfigExt for Config {
    fn get_playlist_dir(&self) -> Result<String> {
        self.get_managed_dir(&["playlist", "directory"], "data")
    }

    fn playlist_file_path(&self) -> Result<PathBuf> {
        Ok(PathBuf::from(self.get_playlist_dir()?).join(PLAYLIST_FILE_NAME))
    }
}
