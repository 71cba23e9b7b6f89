//! # pmocache - Cache disque des pistes audio de PMOTube
//!
//! Cette crate conserve les pistes transcodées sur disque, indexées par une
//! base SQLite, sous un budget en octets.
//!
//! ## Vue d'ensemble
//!
//! - Une entrée est identifiée par une [`CacheKey`] : identifiant de piste et
//!   [`Quality`]
//! - Son cycle de vie est `missing → downloading → ready | failed`
//! - Le passage en `downloading` est atomique ([`CacheStore::begin_download`]) :
//!   au plus un téléchargement par clé
//! - L'espace occupé (fichiers prêts et réservations en cours) ne dépasse pas
//!   le budget ; l'éviction LRU épargne la piste courante et les
//!   téléchargements en cours
//! - Un fichier n'est visible qu'une fois complet (écriture dans un `.part`
//!   puis renommage)
//!
//! ## Architecture
//!
//! ```text
//! pmocache
//!     ├── db.rs             - Index SQLite (états durables, LRU)
//!     ├── store.rs          - Fichiers, réservations, éviction
//!     ├── config_ext.rs     - Paramètres host.audio_cache.* (feature pmoconfig)
//!     └── pmoserver_ext.rs  - Streaming HTTP et API /api/cache (feature pmoserver)
//! ```
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use pmocache::{CacheKey, CacheStore, Quality};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = CacheStore::open("./cache_audio", 500 * 1024 * 1024)?;
//!     let key = CacheKey::new("3f2a9c1d0b7e4a55", Quality::Kbps192);
//!
//!     let entry = store.put(&key, b"ID3...").await?;
//!     println!("{} -> {:?}", entry.key, entry.file_path);
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod entry;
pub mod error;
pub mod quality;
pub mod store;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

#[cfg(feature = "pmoserver")]
pub mod pmoserver_ext;
#[cfg(feature = "pmoserver")]
pub mod range;

pub use entry::{CacheEntry, CacheKey, CacheState};
pub use error::{Error, Result};
pub use quality::Quality;
pub use store::{CacheStats, CacheStore, ClearReport, QualityStats, Reservation};

#[cfg(feature = "pmoconfig")]
pub use config_ext::CacheConfigExt;

#[cfg(feature = "pmoserver")]
pub use pmoserver_ext::{cached_file_response, error_response, AudioCacheExt, AudioCacheState};
