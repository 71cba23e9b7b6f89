//! Extension de pmoconfig pour le résolveur

use std::time::Duration;

use anyhow::Result;
use pmoconfig::Config;
use tracing::warn;

use crate::platform::Platform;
use crate::ytdlp::{YtDlpResolver, DEFAULT_TIMEOUT, DEFAULT_YTDLP_PROGRAM};

/// Trait d'extension pour pmoconfig::Config
pub trait ResolverConfigExt {
    /// Chemin de l'exécutable `yt-dlp` (`resolver.ytdlp_path`)
    fn get_ytdlp_path(&self) -> Result<String>;

    /// Délai maximal d'une résolution (`resolver.timeout_secs`)
    fn get_resolver_timeout(&self) -> Result<Duration>;

    /// Plateformes acceptées (`resolver.allowed_platforms`)
    ///
    /// Les noms inconnus sont ignorés avec un avertissement.
    fn get_allowed_platforms(&self) -> Result<Vec<Platform>>;

    /// Construit un [`YtDlpResolver`] configuré
    fn create_resolver(&self) -> Result<YtDlpResolver>;
}

impl ResolverConfigExt for Config {
    fn get_ytdlp_path(&self) -> Result<String> {
        self.get_string(&["resolver", "ytdlp_path"], DEFAULT_YTDLP_PROGRAM)
    }

    fn get_resolver_timeout(&self) -> Result<Duration> {
        let secs = self.get_usize(
            &["resolver", "timeout_secs"],
            DEFAULT_TIMEOUT.as_secs() as usize,
        )?;
        Ok(Duration::from_secs(secs as u64))
    }

    fn get_allowed_platforms(&self) -> Result<Vec<Platform>> {
        let names = self.get_string_list(
            &["resolver", "allowed_platforms"],
            &["youtube", "vimeo", "facebook", "soundcloud"],
        )?;

        Ok(names
            .iter()
            .filter_map(|name| match name.parse::<Platform>() {
                Ok(p) => Some(p),
                Err(_) => {
                    warn!("Ignoring unknown platform '{}' in resolver.allowed_platforms", name);
                    None
                }
            })
            .collect())
    }

    fn create_resolver(&self) -> Result<YtDlpResolver> {
        Ok(YtDlpResolver::new(self.get_ytdlp_path()?)
            .with_timeout(self.get_resolver_timeout()?)
            .with_allowed_platforms(self.get_allowed_platforms()?))
    }
}
