//! # pmoresolver - Résolution d'URLs de médias en flux audio
//!
//! Cette crate transforme une URL soumise par l'utilisateur (YouTube, Vimeo,
//! SoundCloud...) en [`ResolvedMedia`] : métadonnées et URL d'un flux audio
//! téléchargeable.
//!
//! Le mécanisme d'extraction est masqué derrière le trait [`Resolver`].
//! L'implémentation fournie, [`YtDlpResolver`], pilote l'outil `yt-dlp`.
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use pmoresolver::{Resolver, YtDlpResolver};
//!
//! # async fn example() -> Result<(), pmoresolver::ResolutionError> {
//! let resolver = YtDlpResolver::default();
//! let media = resolver.resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//! println!("{} - {} ({}s)", media.uploader, media.title, media.duration);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod media;
pub mod platform;
pub mod ytdlp;

#[cfg(feature = "pmoconfig")]
pub mod config_ext;

pub use error::{ResolutionError, Result};
pub use media::{ResolvedMedia, StreamSource};
pub use platform::{validate_url, Platform};
pub use ytdlp::YtDlpResolver;

#[cfg(feature = "pmoconfig")]
pub use config_ext::ResolverConfigExt;

use async_trait::async_trait;

/// Capacité de résolution d'une URL
///
/// Aucune écriture, aucune nouvelle tentative : chaque appel interroge la
/// source et renvoie un flux frais.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Result<ResolvedMedia>;
}
