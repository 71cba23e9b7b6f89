//! Extension pour intégrer le cache audio dans pmoconfig
//!
//! Ce module fournit le trait `CacheConfigExt` qui ajoute à
//! `pmoconfig::Config` la lecture des paramètres `host.audio_cache.*` et
//! une fabrique de [`CacheStore`] configuré.

use std::sync::Arc;

use anyhow::Result;
use pmoconfig::Config;
use serde_yaml::{Number, Value};
use tracing::warn;

use crate::quality::Quality;
use crate::store::CacheStore;

const DEFAULT_DIRECTORY: &str = "cache_audio";
const DEFAULT_BUDGET_MB: usize = 1000;

/// Trait d'extension pour pmoconfig::Config
///
/// # Exemple
///
/// ```rust,ignore
/// use pmoconfig::get_config;
/// use pmocache::CacheConfigExt;
///
/// let config = get_config();
/// let store = config.create_cache_store()?;
/// ```
pub trait CacheConfigExt {
    /// Répertoire du cache (`host.audio_cache.directory`), absolu ou
    /// relatif au répertoire de configuration
    fn get_audio_cache_dir(&self) -> Result<String>;

    fn set_audio_cache_dir(&self, directory: String) -> Result<()>;

    /// Budget disque en mégaoctets (`host.audio_cache.budget_mb`)
    fn get_audio_cache_budget_mb(&self) -> Result<usize>;

    fn set_audio_cache_budget_mb(&self, budget_mb: usize) -> Result<()>;

    /// Qualité servie quand la requête n'en précise pas
    /// (`host.audio_cache.default_quality`)
    ///
    /// Une valeur invalide est signalée puis remplacée par 192 kbps.
    fn get_default_quality(&self) -> Result<Quality>;

    /// Ouvre le cache avec le répertoire et le budget configurés
    fn create_cache_store(&self) -> Result<Arc<CacheStore>>;
}

impl CacheConfigExt for Config {
    fn get_audio_cache_dir(&self) -> Result<String> {
        self.get_managed_dir(&["host", "audio_cache", "directory"], DEFAULT_DIRECTORY)
    }

    fn set_audio_cache_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["host", "audio_cache", "directory"], directory)
    }

    fn get_audio_cache_budget_mb(&self) -> Result<usize> {
        self.get_usize(&["host", "audio_cache", "budget_mb"], DEFAULT_BUDGET_MB)
    }

    fn set_audio_cache_budget_mb(&self, budget_mb: usize) -> Result<()> {
        self.set_value(
            &["host", "audio_cache", "budget_mb"],
            Value::Number(Number::from(budget_mb as u64)),
        )
    }

    fn get_default_quality(&self) -> Result<Quality> {
        let raw = self.get_string(
            &["host", "audio_cache", "default_quality"],
            Quality::default().as_str(),
        )?;
        Ok(raw.parse().unwrap_or_else(|_| {
            warn!(
                "Invalid host.audio_cache.default_quality '{}', using {}",
                raw,
                Quality::default()
            );
            Quality::default()
        }))
    }

    fn create_cache_store(&self) -> Result<Arc<CacheStore>> {
        let dir = self.get_audio_cache_dir()?;
        let budget = self.get_audio_cache_budget_mb()? as u64 * 1024 * 1024;
        Ok(Arc::new(CacheStore::open(dir, budget)?))
    }
}
