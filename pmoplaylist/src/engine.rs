//! Moteur de playlist : ordre de lecture, piste courante et acquisition
//!
//! Un seul verrou, le verrou d'état, protège l'ordre, le curseur et les
//! métadonnées. Il n'est tenu que pour la mutation en mémoire et l'écriture
//! du fichier, jamais pendant une acquisition.
//!
//! Les navigations (`set_current`, `next`, `previous`) prennent un ticket
//! croissant sous ce verrou, attendent l'audio hors verrou, puis ne déplacent
//! le curseur que si aucune navigation plus récente n'a été validée entre-temps.
//!
//! Chaque mutation est appliquée à une copie, persistée, puis seulement
//! substituée à l'état courant. La piste courante est épinglée dans le cache
//! pour échapper à l'éviction.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use pmoaudiocache::AcquisitionPipeline;
use pmocache::{CacheKey, CacheState, Quality};
use pmoresolver::{validate_url, Resolver};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::events::{PlaylistEvent, PlaylistEventKind};
use crate::persistence::{PersistenceManager, PlaylistFile, PLAYLIST_FILE_VERSION};
use crate::playlist::PlaylistQueue;
use crate::track::{track_id_for, Track};

/// Capacité du canal d'évènements
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Statistiques agrégées, jamais stockées
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct PlaylistStats {
    pub total_tracks: usize,
    /// Durée totale en secondes
    pub total_duration: f64,
    pub current_index: Option<usize>,
    pub has_current: bool,
}

/// Vue complète de la playlist, états de cache à jour
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "pmoserver", derive(utoipa::ToSchema))]
pub struct PlaylistSnapshot {
    pub tracks: Vec<Track>,
    pub stats: PlaylistStats,
    pub current_track: Option<Track>,
}

/// Tickets des navigations ; non persistés
#[derive(Debug, Clone, Default)]
struct NavigationTickets {
    issued: u64,
    committed: u64,
    /// Dernière navigation émise et sa cible, tant qu'elle est en cours
    pending: Option<(u64, String)>,
}

impl NavigationTickets {
    fn issue(&mut self, target: &str) -> u64 {
        self.issued += 1;
        self.pending = Some((self.issued, target.to_string()));
        self.issued
    }

    fn settle(&mut self, ticket: u64) {
        if matches!(&self.pending, Some((t, _)) if *t == ticket) {
            self.pending = None;
        }
    }

    fn is_superseded(&self, ticket: u64) -> bool {
        self.committed > ticket
    }
}

#[derive(Debug, Clone, Default)]
struct PlaylistState {
    tracks: HashMap<String, Track>,
    queue: PlaylistQueue,
    navigation: NavigationTickets,
}

impl PlaylistState {
    /// Reconstruit l'état depuis le fichier ; renvoie aussi le nombre
    /// d'incohérences corrigées
    fn from_file(file: PlaylistFile) -> (Self, usize) {
        let mut tracks: HashMap<String, Track> = file
            .tracks
            .into_iter()
            .map(|t| (t.id.clone(), t))
            .collect();
        let records = tracks.len();

        let mut repaired = 0;
        let mut order: Vec<String> = Vec::with_capacity(file.order.len());
        for id in file.order {
            if tracks.contains_key(&id) && !order.contains(&id) {
                order.push(id);
            } else {
                repaired += 1;
            }
        }
        tracks.retain(|id, _| order.contains(id));
        repaired += records - tracks.len();

        let queue = PlaylistQueue::from_parts(order, file.current_index);
        if queue.current_index() != file.current_index {
            repaired += 1;
        }

        (
            Self {
                tracks,
                queue,
                navigation: NavigationTickets::default(),
            },
            repaired,
        )
    }

    fn to_file(&self) -> PlaylistFile {
        PlaylistFile {
            version: PLAYLIST_FILE_VERSION,
            tracks: self.ordered_tracks(),
            order: self.queue.ids().to_vec(),
            current_index: self.queue.current_index(),
        }
    }

    fn ordered_tracks(&self) -> Vec<Track> {
        self.queue
            .ids()
            .iter()
            .filter_map(|id| self.tracks.get(id).cloned())
            .collect()
    }

    fn current(&self) -> Option<&Track> {
        self.queue.current_id().and_then(|id| self.tracks.get(id))
    }

    fn current_id(&self) -> Option<String> {
        self.queue.current_id().map(str::to_string)
    }

    /// Point de départ de `next`/`previous` : la cible de la navigation en
    /// cours si elle est toujours dans la file, sinon le curseur
    fn navigation_origin(&self) -> Option<usize> {
        self.navigation
            .pending
            .as_ref()
            .and_then(|(_, id)| self.queue.position(id))
            .or(self.queue.current_index())
    }

    fn stats(&self) -> PlaylistStats {
        PlaylistStats {
            total_tracks: self.queue.len(),
            total_duration: self.tracks.values().map(|t| t.duration).sum(),
            current_index: self.queue.current_index(),
            has_current: self.queue.current_index().is_some(),
        }
    }
}

/// Moteur de la playlist
pub struct PlaylistEngine {
    state: Mutex<PlaylistState>,
    resolver: Arc<dyn Resolver>,
    pipeline: Arc<AcquisitionPipeline>,
    persistence: PersistenceManager,
    default_quality: Quality,
    events: broadcast::Sender<PlaylistEvent>,
    rng: std::sync::Mutex<StdRng>,
}

impl PlaylistEngine {
    /// Ouvre la playlist persistée dans `path` (créée vide si absente)
    pub async fn open(
        path: impl AsRef<Path>,
        resolver: Arc<dyn Resolver>,
        pipeline: Arc<AcquisitionPipeline>,
        default_quality: Quality,
    ) -> Result<Self> {
        let persistence = PersistenceManager::new(path.as_ref())?;
        let (state, repaired) = PlaylistState::from_file(persistence.load().await?);

        if repaired > 0 {
            warn!(
                "Repaired {} inconsistencies in {}",
                repaired,
                persistence.path().display()
            );
            persistence.save(&state.to_file()).await?;
        }

        pipeline.store().set_current(state.queue.current_id()).await;

        info!(
            "Playlist loaded from {} ({} tracks)",
            persistence.path().display(),
            state.queue.len()
        );

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            state: Mutex::new(state),
            resolver,
            pipeline,
            persistence,
            default_quality,
            events,
            rng: std::sync::Mutex::new(StdRng::from_os_rng()),
        })
    }

    /// Rend les mélanges reproductibles
    pub fn with_shuffle_seed(self, seed: u64) -> Self {
        *self.rng.lock().unwrap() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn default_quality(&self) -> Quality {
        self.default_quality
    }

    pub fn pipeline(&self) -> &Arc<AcquisitionPipeline> {
        &self.pipeline
    }

    /// Abonnement aux évènements de la playlist
    pub fn subscribe(&self) -> broadcast::Receiver<PlaylistEvent> {
        self.events.subscribe()
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Résout une URL et ajoute la piste en fin de playlist
    ///
    /// Une URL déjà présente renvoie la piste existante. La première piste
    /// d'une playlist vide devient la piste courante. Aucun téléchargement
    /// n'est lancé.
    pub async fn add(&self, url: &str) -> Result<Track> {
        let normalized = validate_url(url)?.to_string();
        let id = track_id_for(&normalized);

        let existing = self.state.lock().await.tracks.get(&id).cloned();
        if let Some(existing) = existing {
            debug!(track_id = %id, "URL already in playlist");
            return Ok(self.with_cache_state(existing).await);
        }

        let media = self.resolver.resolve(&normalized).await?;
        let track = Track::from_resolved(&normalized, media, self.default_quality);

        let mut state = self.state.lock().await;
        if let Some(existing) = state.tracks.get(&id).cloned() {
            drop(state);
            return Ok(self.with_cache_state(existing).await);
        }

        let previous_current = state.current_id();
        let mut next = (*state).clone();
        next.queue.push(track.id.clone());
        next.tracks.insert(track.id.clone(), track.clone());
        self.commit(&mut state, next).await?;

        info!(track_id = %track.id, "Added '{}' by {}", track.title, track.uploader);
        self.publish(PlaylistEventKind::Updated);
        self.sync_current(&state, previous_current).await;
        drop(state);

        Ok(self.with_cache_state(track).await)
    }

    /// Résout une URL sans l'ajouter à la playlist
    pub async fn inspect(&self, url: &str) -> Result<Track> {
        let normalized = validate_url(url)?.to_string();
        let media = self.resolver.resolve(&normalized).await?;
        let track = Track::from_resolved(&normalized, media, self.default_quality);
        Ok(self.with_cache_state(track).await)
    }

    /// Garantit la présence en cache d'une piste sans toucher au curseur
    ///
    /// `quality` vaut par défaut la qualité de la piste.
    pub async fn acquire(&self, track_id: &str, quality: Option<Quality>) -> Result<Track> {
        let track = self.track(track_id).await?;
        let quality = quality.unwrap_or(track.quality);
        self.pipeline.ensure_cached(&track.source(), quality).await?;
        Ok(self.with_cache_state(track).await)
    }

    /// Retire une piste ; son cache est conservé
    pub async fn remove(&self, track_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.tracks.contains_key(track_id) {
            return Err(Error::TrackNotFound(track_id.to_string()));
        }

        let previous_current = state.current_id();
        let mut next = (*state).clone();
        next.queue.remove(track_id);
        next.tracks.remove(track_id);
        self.commit(&mut state, next).await?;

        info!(track_id = %track_id, "Removed track from playlist");
        self.publish(PlaylistEventKind::Updated);
        self.sync_current(&state, previous_current).await;
        Ok(())
    }

    /// Sélectionne une piste, une fois son audio disponible en cache
    pub async fn set_current(&self, track_id: &str) -> Result<Track> {
        let id = track_id.to_string();
        self.navigate(move |state| {
            if state.queue.contains(&id) {
                Ok(Some(id))
            } else {
                Err(Error::TrackNotFound(id))
            }
        })
        .await?
        .ok_or_else(|| Error::TrackNotFound(track_id.to_string()))
    }

    /// Passe à la piste suivante, en bouclant ; `None` si la playlist est vide
    ///
    /// Deux appels rapprochés avancent de deux pistes : le second part de la
    /// cible du premier s'il est encore en cours.
    pub async fn next(&self) -> Result<Option<Track>> {
        self.navigate(|state| {
            Ok(state
                .queue
                .next_index_from(state.navigation_origin())
                .map(|i| state.queue.ids()[i].clone()))
        })
        .await
    }

    /// Revient à la piste précédente, en bouclant ; `None` si la playlist est vide
    pub async fn previous(&self) -> Result<Option<Track>> {
        self.navigate(|state| {
            Ok(state
                .queue
                .previous_index_from(state.navigation_origin())
                .map(|i| state.queue.ids()[i].clone()))
        })
        .await
    }

    /// Mélange la playlist ; la piste courante reste la même
    pub async fn shuffle(&self) -> Result<Option<Track>> {
        let mut state = self.state.lock().await;
        let mut next = (*state).clone();
        {
            let mut rng = self.rng.lock().unwrap();
            next.queue.shuffle_with(&mut *rng);
        }
        self.commit(&mut state, next).await?;

        debug!("Playlist shuffled");
        self.publish(PlaylistEventKind::Updated);

        let current = state.current().cloned();
        drop(state);
        match current {
            Some(track) => Ok(Some(self.with_cache_state(track).await)),
            None => Ok(None),
        }
    }

    /// Déplace une piste à `position` ; le curseur suit la piste courante
    pub async fn move_track(&self, track_id: &str, position: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut next = (*state).clone();
        next.queue.move_to(track_id, position)?;
        self.commit(&mut state, next).await?;

        debug!(track_id = %track_id, "Moved track to position {}", position);
        self.publish(PlaylistEventKind::Updated);
        Ok(())
    }

    /// Vide la playlist ; le cache est conservé
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let removed = state.queue.len();
        let previous_current = state.current_id();

        let mut next = (*state).clone();
        next.queue.clear();
        next.tracks.clear();
        self.commit(&mut state, next).await?;

        info!("Playlist cleared ({} tracks removed)", removed);
        self.publish(PlaylistEventKind::Cleared);
        self.sync_current(&state, previous_current).await;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Lecture
    // ------------------------------------------------------------------

    pub async fn current(&self) -> Option<Track> {
        let current = self.state.lock().await.current().cloned();
        match current {
            Some(track) => Some(self.with_cache_state(track).await),
            None => None,
        }
    }

    pub async fn track(&self, track_id: &str) -> Result<Track> {
        let track = self
            .state
            .lock()
            .await
            .tracks
            .get(track_id)
            .cloned()
            .ok_or_else(|| Error::TrackNotFound(track_id.to_string()))?;
        Ok(self.with_cache_state(track).await)
    }

    /// Pistes dans l'ordre de lecture
    pub async fn tracks(&self) -> Vec<Track> {
        self.state.lock().await.ordered_tracks()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> PlaylistStats {
        self.state.lock().await.stats()
    }

    pub async fn snapshot(&self) -> PlaylistSnapshot {
        let (tracks, stats, current_id) = {
            let state = self.state.lock().await;
            (state.ordered_tracks(), state.stats(), state.current_id())
        };

        let mut refreshed = Vec::with_capacity(tracks.len());
        for track in tracks {
            refreshed.push(self.with_cache_state(track).await);
        }
        let current_track = current_id.and_then(|id| refreshed.iter().find(|t| t.id == id).cloned());

        PlaylistSnapshot {
            tracks: refreshed,
            stats,
            current_track,
        }
    }

    /// Export au format M3U étendu
    pub async fn export_m3u(&self) -> String {
        let tracks = self.tracks().await;
        let mut out = String::from("#EXTM3U\n");
        for track in tracks {
            out.push_str(&format!(
                "#EXTINF:{},{} - {}\n{}\n",
                track.duration.round() as i64,
                track.uploader,
                track.title,
                track.source_url
            ));
        }
        out
    }

    // ------------------------------------------------------------------
    // Interne
    // ------------------------------------------------------------------

    /// Garantit la présence en cache de la cible avant de déplacer le curseur
    ///
    /// `pick` choisit la cible sous le verrou d'état et un ticket est émis.
    /// L'acquisition se fait hors verrou ; la position de la cible est
    /// ensuite recalculée et le curseur n'est déplacé que si aucune
    /// navigation plus récente n'a été validée.
    async fn navigate<F>(&self, pick: F) -> Result<Option<Track>>
    where
        F: FnOnce(&PlaylistState) -> Result<Option<String>>,
    {
        let (ticket, target) = {
            let mut state = self.state.lock().await;
            let target = match pick(&*state)? {
                Some(id) => state
                    .tracks
                    .get(&id)
                    .cloned()
                    .ok_or(Error::TrackNotFound(id))?,
                None => return Ok(None),
            };
            (state.navigation.issue(&target.id), target)
        };

        let acquired = self
            .pipeline
            .ensure_cached(&target.source(), target.quality)
            .await;

        let mut state = self.state.lock().await;
        state.navigation.settle(ticket);
        if let Err(e) = acquired {
            warn!(track_id = %target.id, "Cannot select track: {}", e);
            return Err(e.into());
        }

        let position = state
            .queue
            .position(&target.id)
            .ok_or_else(|| Error::TrackNotFound(target.id.clone()))?;

        if state.navigation.is_superseded(ticket) {
            if state.queue.current_id() == Some(target.id.as_str()) {
                let mut track = state.tracks.get(&target.id).cloned().unwrap_or(target);
                track.cache_state = CacheState::Ready;
                return Ok(Some(track));
            }
            debug!(track_id = %target.id, ticket, "Navigation superseded");
            return Err(Error::Superseded(target.id));
        }

        let previous_current = state.current_id();
        let mut next = (*state).clone();
        next.queue.select(position);
        next.navigation.committed = ticket;
        if let Some(track) = next.tracks.get_mut(&target.id) {
            track.mark_played();
        }
        self.commit(&mut state, next).await?;
        self.sync_current(&state, previous_current).await;

        let mut track = state.tracks.get(&target.id).cloned().unwrap_or(target);
        track.cache_state = CacheState::Ready;
        info!(track_id = %track.id, "Now playing '{}'", track.title);
        Ok(Some(track))
    }

    /// Persiste `next` puis le substitue à l'état courant
    async fn commit(&self, state: &mut MutexGuard<'_, PlaylistState>, next: PlaylistState) -> Result<()> {
        if let Err(e) = self.persistence.save(&next.to_file()).await {
            error!("Failed to persist playlist: {}", e);
            return Err(e);
        }
        **state = next;
        Ok(())
    }

    /// Épingle la piste courante et signale un changement
    async fn sync_current(&self, state: &PlaylistState, previous: Option<String>) {
        let current = state.current_id();
        self.pipeline.store().set_current(current.as_deref()).await;
        if current != previous {
            self.publish(PlaylistEventKind::CurrentChanged { track_id: current });
        }
    }

    fn publish(&self, kind: PlaylistEventKind) {
        // Aucun abonné n'est une situation normale
        let _ = self.events.send(PlaylistEvent::new(kind));
    }

    async fn with_cache_state(&self, mut track: Track) -> Track {
        let key = CacheKey::new(track.id.clone(), track.quality);
        match self.pipeline.store().get(&key).await {
            Ok(entry) => track.cache_state = entry.state,
            Err(e) => warn!(track_id = %track.id, "Cannot read cache state: {}", e),
        }
        track
    }
}
