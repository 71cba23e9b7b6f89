//! Stockage des fichiers audio et politique d'éviction
//!
//! Les fichiers définitifs sont nommés `{track_id}.{quality}.{ext}`. Les
//! fichiers intermédiaires portent le suffixe `.part` et ne sont jamais
//! indexés : une entrée `Ready` référence toujours un fichier complet.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::db::{StoredEntry, DB};
use crate::entry::{CacheEntry, CacheKey, CacheState};
use crate::error::{Error, Result};

const DB_FILE: &str = "cache.db";
const PART_SUFFIX: &str = ".part";

/// Issue d'une demande de passage en `Downloading`
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// L'appelant détient désormais le téléchargement de la clé
    Started,
    /// Un téléchargement est déjà en cours pour cette clé
    AlreadyDownloading,
    /// L'entrée est déjà disponible
    AlreadyReady(CacheEntry),
}

/// Bilan d'un nettoyage
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct ClearReport {
    pub removed: usize,
    pub freed_bytes: u64,
}

/// Occupation par qualité
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct QualityStats {
    pub file_count: usize,
    pub total_size: u64,
}

/// Statistiques globales du cache
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct CacheStats {
    pub total_size: u64,
    pub total_size_mb: f64,
    pub file_count: usize,
    pub budget: u64,
    /// Octets réservés par les téléchargements en cours
    pub reserved: u64,
    pub downloading: usize,
    pub failed: usize,
    pub by_quality: BTreeMap<String, QualityStats>,
    pub pinned_track: Option<String>,
}

#[derive(Debug, Default)]
struct StoreState {
    /// Téléchargements en cours et leur taille réservée
    downloading: HashMap<CacheKey, u64>,
    /// Piste courante, exclue de l'éviction
    pinned: Option<String>,
}

/// Cache disque des pistes audio, borné par un budget en octets
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    budget: u64,
    db: DB,
    state: Mutex<StoreState>,
}

impl CacheStore {
    /// Ouvre le cache dans `dir` avec un budget de `budget` octets
    ///
    /// Le répertoire est créé si besoin puis consolidé : les lignes sans
    /// fichier, les fichiers orphelins et les fichiers `.part` d'un
    /// téléchargement interrompu sont supprimés.
    pub fn open(dir: impl AsRef<Path>, budget: u64) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let db = DB::init(&dir.join(DB_FILE))?;

        let store = Self {
            dir,
            budget,
            db,
            state: Mutex::new(StoreState::default()),
        };
        store.consolidate()?;

        info!(
            directory = %store.dir.display(),
            budget_bytes = budget,
            "Audio cache opened"
        );
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Chemin du fichier définitif d'une clé
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    /// Chemin d'un fichier intermédiaire, dans le même répertoire que le
    /// fichier définitif pour que le renommage final soit atomique
    pub fn temp_path(&self, key: &CacheKey, stage: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}{}", key.file_name(), stage, PART_SUFFIX))
    }

    fn consolidate(&self) -> Result<()> {
        let mut kept = std::collections::HashSet::new();
        let mut dropped_rows = 0;

        for stored in self.db.all()? {
            match (&stored.state, &stored.file_name) {
                (CacheState::Ready, Some(name)) if self.dir.join(name).is_file() => {
                    kept.insert(name.clone());
                }
                (CacheState::Ready, _) => {
                    self.db.delete(&stored.key)?;
                    dropped_rows += 1;
                }
                _ => {}
            }
        }

        let mut removed_files = 0;
        for dir_entry in std::fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_file() {
                continue;
            }
            let name = dir_entry.file_name().to_string_lossy().to_string();
            if name.starts_with(DB_FILE) || kept.contains(&name) {
                continue;
            }
            match std::fs::remove_file(dir_entry.path()) {
                Ok(()) => removed_files += 1,
                Err(e) => warn!("Cannot remove stray cache file {}: {}", name, e),
            }
        }

        if dropped_rows > 0 || removed_files > 0 {
            info!(
                "Cache consolidated: {} stale entries, {} stray files removed",
                dropped_rows, removed_files
            );
        }
        Ok(())
    }

    fn to_entry(&self, stored: StoredEntry) -> CacheEntry {
        let file_path = match (&stored.state, &stored.file_name) {
            (CacheState::Ready, Some(name)) => Some(self.dir.join(name)),
            _ => None,
        };
        CacheEntry {
            key: stored.key,
            state: stored.state,
            file_path,
            byte_size: stored.byte_size,
            last_access: stored.last_access,
            hits: stored.hits,
            error: stored.error,
        }
    }

    /// État courant d'une clé
    ///
    /// Une entrée `Ready` dont le fichier a disparu est oubliée et
    /// rapportée comme `Missing`.
    pub async fn get(&self, key: &CacheKey) -> Result<CacheEntry> {
        let state = self.state.lock().await;
        self.get_locked(&state, key)
    }

    fn get_locked(&self, state: &StoreState, key: &CacheKey) -> Result<CacheEntry> {
        if state.downloading.contains_key(key) {
            return Ok(CacheEntry::downloading(key.clone()));
        }

        match self.db.get(key)? {
            None => Ok(CacheEntry::missing(key.clone())),
            Some(stored) => {
                let entry = self.to_entry(stored);
                if entry.is_ready() && !entry.file_path.as_deref().is_some_and(Path::is_file) {
                    warn!(key = %key, "Cached file vanished, forgetting entry");
                    self.db.delete(key)?;
                    return Ok(CacheEntry::missing(key.clone()));
                }
                Ok(entry)
            }
        }
    }

    /// Passe une clé en `Downloading` en réservant `estimated_size` octets
    ///
    /// La vérification et la réservation sont atomiques. Si le budget ne
    /// suffit pas, les entrées les moins récemment utilisées sont évincées ;
    /// si cela ne suffit toujours pas, renvoie [`Error::CacheFull`].
    pub async fn begin_download(&self, key: &CacheKey, estimated_size: u64) -> Result<Reservation> {
        let mut state = self.state.lock().await;

        let current = self.get_locked(&state, key)?;
        match current.state {
            CacheState::Downloading => return Ok(Reservation::AlreadyDownloading),
            CacheState::Ready => return Ok(Reservation::AlreadyReady(current)),
            CacheState::Missing | CacheState::Failed => {}
        }

        self.evict_locked(&state, estimated_size, None).await?;

        let available = self.available_locked(&state)?;
        if available < estimated_size {
            warn!(
                key = %key,
                needed = estimated_size,
                available,
                "Cache full, cannot start download"
            );
            return Err(Error::CacheFull {
                needed: estimated_size,
                available,
            });
        }

        state.downloading.insert(key.clone(), estimated_size);
        debug!(key = %key, reserved = estimated_size, "Download started");
        Ok(Reservation::Started)
    }

    /// Octets utilisés : entrées prêtes et réservations en cours
    fn used_locked(&self, state: &StoreState) -> Result<u64> {
        let reserved: u64 = state.downloading.values().sum();
        Ok(self.db.ready_bytes()? + reserved)
    }

    fn available_locked(&self, state: &StoreState) -> Result<u64> {
        Ok(self.budget.saturating_sub(self.used_locked(state)?))
    }

    /// Libère de la place jusqu'à disposer de `target_free` octets
    ///
    /// Éviction LRU parmi les entrées prêtes, en épargnant la piste
    /// épinglée et les téléchargements en cours. Renvoie le nombre
    /// d'octets libérés, qui peut être insuffisant.
    pub async fn evict(&self, target_free: u64) -> Result<u64> {
        let state = self.state.lock().await;
        self.evict_locked(&state, target_free, None).await
    }

    async fn evict_locked(
        &self,
        state: &StoreState,
        target_free: u64,
        spare: Option<&CacheKey>,
    ) -> Result<u64> {
        let mut used = self.used_locked(state)?;
        let deficit = |used: u64| (used + target_free).saturating_sub(self.budget);

        if deficit(used) == 0 {
            return Ok(0);
        }

        let mut freed = 0;
        let mut removed = 0;
        for victim in self.db.ready_lru()? {
            if deficit(used) == 0 {
                break;
            }
            if state.pinned.as_deref() == Some(victim.key.track_id.as_str())
                || state.downloading.contains_key(&victim.key)
                || spare == Some(&victim.key)
            {
                continue;
            }

            let size = victim.byte_size;
            self.remove_stored(&victim).await?;
            debug!(key = %victim.key, size, "Evicted");
            used = used.saturating_sub(size);
            freed += size;
            removed += 1;
        }

        if removed > 0 {
            info!(
                "LRU eviction: removed {} entries, freed {} bytes",
                removed, freed
            );
        }
        Ok(freed)
    }

    async fn remove_stored(&self, stored: &StoredEntry) -> Result<()> {
        if let Some(name) = &stored.file_name {
            remove_file_if_exists(&self.dir.join(name)).await?;
        }
        self.db.delete(&stored.key)?;
        Ok(())
    }

    /// Installe `temp_file` comme fichier définitif de `key` et marque
    /// l'entrée `Ready`
    ///
    /// Le renommage est atomique. Le budget est ensuite réappliqué, la
    /// taille réelle pouvant dépasser l'estimation.
    pub async fn commit_file(&self, key: &CacheKey, temp_file: &Path) -> Result<CacheEntry> {
        let final_path = self.path_for(key);
        tokio::fs::rename(temp_file, &final_path).await?;
        let size = tokio::fs::metadata(&final_path).await?.len();
        self.db.upsert_ready(key, &key.file_name(), size)?;

        let mut state = self.state.lock().await;
        state.downloading.remove(key);
        info!(key = %key, size, "Audio cached");

        self.evict_locked(&state, 0, Some(key)).await?;
        self.get_locked(&state, key)
    }

    /// Écrit `bytes` comme contenu de `key`, par fichier temporaire puis
    /// renommage
    pub async fn put(&self, key: &CacheKey, bytes: &[u8]) -> Result<CacheEntry> {
        let temp = self.temp_path(key, "put");
        if let Err(e) = tokio::fs::write(&temp, bytes).await {
            let _ = remove_file_if_exists(&temp).await;
            return Err(e.into());
        }
        match self.commit_file(key, &temp).await {
            Ok(entry) => Ok(entry),
            Err(e) => {
                let _ = remove_file_if_exists(&temp).await;
                Err(e)
            }
        }
    }

    /// Marque l'entrée en échec et libère sa réservation
    pub async fn mark_failed(&self, key: &CacheKey, error: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.downloading.remove(key);
        remove_file_if_exists(&self.path_for(key)).await?;
        self.db.upsert_failed(key, error)?;
        warn!(key = %key, "Acquisition failed: {}", error);
        Ok(())
    }

    /// Enregistre un accès (lecture en streaming)
    pub async fn touch(&self, key: &CacheKey) -> Result<()> {
        self.db.touch(key)?;
        Ok(())
    }

    /// Épingle la piste courante (toutes qualités) contre l'éviction
    pub async fn set_current(&self, track_id: Option<&str>) {
        let mut state = self.state.lock().await;
        state.pinned = track_id.map(str::to_string);
    }

    pub async fn pinned(&self) -> Option<String> {
        self.state.lock().await.pinned.clone()
    }

    /// Supprime les entrées prêtes non utilisées depuis `older_than`, ou
    /// toutes les entrées si `None`
    ///
    /// La piste épinglée et les téléchargements en cours sont conservés.
    pub async fn clear(&self, older_than: Option<Duration>) -> Result<ClearReport> {
        let state = self.state.lock().await;

        let candidates = match older_than {
            Some(age) => self.db.ready_older_than(Utc::now() - age)?,
            None => self.db.all()?,
        };

        let mut report = ClearReport::default();
        for stored in candidates {
            if state.pinned.as_deref() == Some(stored.key.track_id.as_str())
                || state.downloading.contains_key(&stored.key)
            {
                continue;
            }
            self.remove_stored(&stored).await?;
            report.removed += 1;
            if stored.state == CacheState::Ready {
                report.freed_bytes += stored.byte_size;
            }
        }

        info!(
            "Cache cleared: {} entries removed, {} bytes freed",
            report.removed, report.freed_bytes
        );
        Ok(report)
    }

    /// Supprime toutes les qualités d'une piste, sauf celles en cours de
    /// téléchargement
    pub async fn remove_track(&self, track_id: &str) -> Result<ClearReport> {
        let state = self.state.lock().await;

        let mut report = ClearReport::default();
        for stored in self.db.for_track(track_id)? {
            if state.downloading.contains_key(&stored.key) {
                continue;
            }
            self.remove_stored(&stored).await?;
            report.removed += 1;
            if stored.state == CacheState::Ready {
                report.freed_bytes += stored.byte_size;
            }
        }

        debug!(track_id, removed = report.removed, "Track removed from cache");
        Ok(report)
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let state = self.state.lock().await;

        let mut stats = CacheStats {
            total_size: 0,
            total_size_mb: 0.0,
            file_count: 0,
            budget: self.budget,
            reserved: state.downloading.values().sum(),
            downloading: state.downloading.len(),
            failed: 0,
            by_quality: BTreeMap::new(),
            pinned_track: state.pinned.clone(),
        };

        for stored in self.db.all()? {
            match stored.state {
                CacheState::Ready => {
                    stats.total_size += stored.byte_size;
                    stats.file_count += 1;
                    let q = stats
                        .by_quality
                        .entry(stored.key.quality.as_str().to_string())
                        .or_default();
                    q.file_count += 1;
                    q.total_size += stored.byte_size;
                }
                CacheState::Failed => stats.failed += 1,
                _ => {}
            }
        }
        stats.total_size_mb = (stats.total_size as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0;

        Ok(stats)
    }
}

async fn remove_file_if_exists(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
