//! # pmoplaylist - File de lecture persistante de PMOTube
//!
//! Cette crate gère la playlist : une suite ordonnée de pistes et un curseur
//! désignant la piste courante.
//!
//! - **Track** : métadonnées d'une piste, identifiée par le hachage de son
//!   URL normalisée
//! - **PlaylistQueue** : ordre de lecture et curseur
//! - **PlaylistEngine** : ajout, retrait, navigation, mélange, persistance
//!   JSON et évènements
//!
//! La navigation (`set_current`, `next`, `previous`) ne déplace le curseur
//! qu'une fois l'audio de la piste présent dans le cache, via
//! [`pmoaudiocache::AcquisitionPipeline`].
//!
//! # Exemple d'utilisation
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pmoaudiocache::AcquisitionPipeline;
//! use pmocache::Quality;
//! use pmoplaylist::PlaylistEngine;
//! use pmoresolver::YtDlpResolver;
//!
//! # async fn example(pipeline: Arc<AcquisitionPipeline>) -> pmoplaylist::Result<()> {
//! let engine = PlaylistEngine::open(
//!     "data/playlist.json",
//!     Arc::new(YtDlpResolver::default()),
//!     pipeline,
//!     Quality::Kbps192,
//! )
//! .await?;
//!
//! let track = engine.add("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//! engine.set_current(&track.id).await?;
//!
//! if let Some(next) = engine.next().await? {
//!     println!("Now playing {}", next.title);
//! }
//! # Ok(())
//! # }
//! ```

mod engine;
mod error;
mod events;
mod persistence;
mod playlist;
mod track;

#[cfg(feature = "pmoconfig")]
mod config_ext;

#[cfg(feature = "pmoserver")]
pub mod api;

// Réexports publics
pub use engine::{PlaylistEngine, PlaylistSnapshot, PlaylistStats};
pub use error::{Error, Result};
pub use events::{PlaylistEvent, PlaylistEventKind};
pub use persistence::{PersistenceManager, PlaylistFile, PLAYLIST_FILE_NAME};
pub use playlist::PlaylistQueue;
pub use track::{track_id_for, Track};

#[cfg(feature = "pmoconfig")]
pub use config_ext::PlaylistConfigExt;

#[cfg(feature = "pmoserver")]
pub use api::{create_audio_router, create_playlist_router, AudioApiDoc, PlaylistApiDoc, PlaylistApiExt};
