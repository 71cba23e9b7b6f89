//! Acquisition des pistes : résolution, téléchargement, transcodage, commit
//!
//! Une seule acquisition par clé `(piste, qualité)` est active à la fois.
//! Les demandes concurrentes rejoignent l'acquisition en cours via un canal
//! `watch` enregistré dans un registre partagé, et observent toutes le même
//! résultat. L'acquisition s'exécute dans une tâche détachée : elle va à son
//! terme même si tous les demandeurs ont abandonné.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use pmocache::{CacheEntry, CacheKey, CacheStore, Quality, Reservation};
use pmoresolver::Resolver;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{AcquisitionError, Result};
use crate::fetcher::Fetcher;
use crate::transcoder::Transcoder;

/// Ce que le pipeline doit savoir d'une piste pour l'acquérir
#[derive(Debug, Clone, PartialEq)]
pub struct TrackSource {
    pub track_id: String,
    /// URL soumise par l'utilisateur, résolue à nouveau à chaque acquisition
    pub source_url: String,
    /// Durée en secondes, pour estimer la place nécessaire
    pub duration: f64,
}

/// Fichier prêt à être servi
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamHandle {
    pub key: CacheKey,
    pub path: PathBuf,
    pub byte_size: u64,
}

impl TryFrom<CacheEntry> for StreamHandle {
    type Error = AcquisitionError;

    fn try_from(entry: CacheEntry) -> Result<Self> {
        match (entry.is_ready(), entry.file_path) {
            (true, Some(path)) => Ok(StreamHandle {
                key: entry.key,
                path,
                byte_size: entry.byte_size,
            }),
            _ => Err(AcquisitionError::Storage(format!(
                "{} is not ready ({})",
                entry.key, entry.state
            ))),
        }
    }
}

type Outcome = Option<Result<StreamHandle>>;
type Registry = Arc<Mutex<HashMap<CacheKey, watch::Receiver<Outcome>>>>;

/// Pipeline d'acquisition à vol unique
pub struct AcquisitionPipeline {
    store: Arc<CacheStore>,
    resolver: Arc<dyn Resolver>,
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    inflight: Registry,
}

impl AcquisitionPipeline {
    pub fn new(
        store: Arc<CacheStore>,
        resolver: Arc<dyn Resolver>,
        fetcher: Arc<dyn Fetcher>,
        transcoder: Arc<dyn Transcoder>,
    ) -> Self {
        Self {
            store,
            resolver,
            fetcher,
            transcoder,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Nombre d'acquisitions en cours
    pub async fn in_flight(&self) -> usize {
        self.inflight.lock().await.len()
    }

    /// Garantit que la piste est disponible dans la qualité demandée
    ///
    /// Idempotent : une piste prête est renvoyée sans accès réseau, une
    /// acquisition en cours est attendue, sinon une nouvelle acquisition
    /// démarre. Une entrée en échec est retentée.
    pub async fn ensure_cached(&self, track: &TrackSource, quality: Quality) -> Result<StreamHandle> {
        let key = CacheKey::new(track.track_id.clone(), quality);

        let entry = self.store.get(&key).await?;
        if entry.is_ready() {
            debug!(key = %key, "Cache hit");
            return StreamHandle::try_from(entry);
        }

        let mut rx = {
            let mut inflight = self.inflight.lock().await;

            if let Some(rx) = inflight.get(&key) {
                debug!(key = %key, "Joining in-flight acquisition");
                rx.clone()
            } else {
                let estimated = quality.estimated_size(track.duration);
                match self.store.begin_download(&key, estimated).await {
                    Ok(Reservation::Started) => {}
                    Ok(Reservation::AlreadyReady(entry)) => {
                        debug!(key = %key, "Cache hit");
                        return StreamHandle::try_from(entry);
                    }
                    Ok(Reservation::AlreadyDownloading) => {
                        return Err(AcquisitionError::Storage(format!(
                            "{} is being downloaded outside of the pipeline",
                            key
                        )));
                    }
                    Err(e) => {
                        let err = AcquisitionError::from(e);
                        if let Err(e) = self.store.mark_failed(&key, &err.to_string()).await {
                            warn!(key = %key, "Cannot record failure: {}", e);
                        }
                        return Err(err);
                    }
                }

                let (tx, rx) = watch::channel(None);
                inflight.insert(key.clone(), rx.clone());
                self.spawn_acquisition(key.clone(), track.source_url.clone(), tx);
                rx
            }
        };

        let outcome = rx.wait_for(Option::is_some).await.map_err(|_| {
            AcquisitionError::Storage(format!("acquisition of {} was abandoned", key))
        })?;
        (*outcome)
            .clone()
            .unwrap_or_else(|| Err(AcquisitionError::Storage("no outcome".to_string())))
    }

    fn spawn_acquisition(&self, key: CacheKey, source_url: String, tx: watch::Sender<Outcome>) {
        let job = Acquisition {
            store: self.store.clone(),
            resolver: self.resolver.clone(),
            fetcher: self.fetcher.clone(),
            transcoder: self.transcoder.clone(),
            key: key.clone(),
            source_url,
        };
        let store = self.store.clone();
        let inflight = self.inflight.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            info!(key = %key, "Acquisition started");

            // Une tâche interne isole les paniques : le registre et la
            // réservation sont toujours libérés
            let result = match tokio::spawn(job.run()).await {
                Ok(result) => result,
                Err(e) => Err(AcquisitionError::Storage(format!(
                    "acquisition task failed: {}",
                    e
                ))),
            };

            match &result {
                Ok(handle) => info!(
                    key = %key,
                    bytes = handle.byte_size,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Acquisition completed"
                ),
                Err(err) => {
                    error!(key = %key, "Acquisition failed: {}", err);
                    if let Err(e) = store.mark_failed(&key, &err.to_string()).await {
                        warn!(key = %key, "Cannot record failure: {}", e);
                    }
                }
            }

            let mut inflight = inflight.lock().await;
            inflight.remove(&key);
            let _ = tx.send(Some(result));
        });
    }
}

/// Une acquisition, exécutée dans sa propre tâche
struct Acquisition {
    store: Arc<CacheStore>,
    resolver: Arc<dyn Resolver>,
    fetcher: Arc<dyn Fetcher>,
    transcoder: Arc<dyn Transcoder>,
    key: CacheKey,
    source_url: String,
}

impl Acquisition {
    async fn run(self) -> Result<StreamHandle> {
        // Les URLs de flux expirent : résolution systématique
        let media = self.resolver.resolve(&self.source_url).await?;

        let fetched = self.store.temp_path(&self.key, "fetch");
        let transcoded = self.store.temp_path(&self.key, "transcode");

        let result = async {
            self.fetcher.fetch(&media.stream, &fetched).await?;
            self.transcoder
                .transcode(&fetched, &transcoded, self.key.quality)
                .await?;
            let entry = self.store.commit_file(&self.key, &transcoded).await?;
            StreamHandle::try_from(entry)
        }
        .await;

        discard(&fetched).await;
        if result.is_err() {
            discard(&transcoded).await;
        }
        result
    }
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Cannot remove temporary file {}: {}", path.display(), e);
        }
    }
}
