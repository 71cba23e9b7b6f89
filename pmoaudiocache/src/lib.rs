//! # pmoaudiocache - Acquisition des pistes audio de PMOTube
//!
//! Cette crate remplit le cache de `pmocache` : pour une piste et une
//! qualité, elle résout à nouveau l'URL source, télécharge le flux,
//! le transcode avec ffmpeg puis installe le fichier dans le cache.
//!
//! ## Vue d'ensemble
//!
//! - [`AcquisitionPipeline::ensure_cached`] est idempotent et sûr en cas
//!   d'appels concurrents : une seule acquisition par clé, dont le résultat
//!   est partagé par tous les demandeurs
//! - Les trois étapes externes sont des traits ([`pmoresolver::Resolver`],
//!   [`Fetcher`], [`Transcoder`]) que les tests remplacent par des doublures
//! - Un échec marque l'entrée `failed` ; la demande suivante la retente
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pmoaudiocache::{AcquisitionPipeline, FfmpegTranscoder, HttpFetcher, TrackSource};
//! use pmocache::{CacheStore, Quality};
//! use pmoresolver::YtDlpResolver;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(CacheStore::open("./cache_audio", 1024 * 1024 * 1024)?);
//! let pipeline = AcquisitionPipeline::new(
//!     store,
//!     Arc::new(YtDlpResolver::default()),
//!     Arc::new(HttpFetcher::new(std::time::Duration::from_secs(300))?),
//!     Arc::new(FfmpegTranscoder::default()),
//! );
//!
//! let track = TrackSource {
//!     track_id: "3f2a9c1d0b7e4a55".into(),
//!     source_url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".into(),
//!     duration: 212.0,
//! };
//! let handle = pipeline.ensure_cached(&track, Quality::Kbps192).await?;
//! println!("{}", handle.path.display());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod transcoder;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use error::{AcquisitionError, Result};
pub use fetcher::{Fetcher, HttpFetcher};
pub use pipeline::{AcquisitionPipeline, StreamHandle, TrackSource};
pub use transcoder::{FfmpegTranscoder, Transcoder};

#[cfg(feature = "pmoconfig")]
pub use config_ext::AcquisitionConfigExt;
