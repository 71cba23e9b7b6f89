//! Extension de pmoconfig pour le pipeline d'acquisition

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use pmocache::CacheConfigExt;
use pmoconfig::Config;
use pmoresolver::ResolverConfigExt;

use crate::fetcher::{HttpFetcher, DEFAULT_FETCH_TIMEOUT};
use crate::pipeline::AcquisitionPipeline;
use crate::transcoder::{FfmpegTranscoder, DEFAULT_FFMPEG_PROGRAM, DEFAULT_TRANSCODE_TIMEOUT};

/// Trait d'extension pour pmoconfig::Config
pub trait AcquisitionConfigExt {
    /// Chemin de l'exécutable ffmpeg (`transcoder.ffmpeg_path`)
    fn get_ffmpeg_path(&self) -> Result<String>;

    /// Délai maximal d'un transcodage (`transcoder.timeout_secs`)
    fn get_transcoder_timeout(&self) -> Result<Duration>;

    /// Délai maximal d'un téléchargement (`fetcher.timeout_secs`)
    fn get_fetcher_timeout(&self) -> Result<Duration>;

    fn create_transcoder(&self) -> Result<FfmpegTranscoder>;

    fn create_fetcher(&self) -> Result<HttpFetcher>;

    /// Assemble cache, résolveur, téléchargeur et transcodeur configurés
    fn create_acquisition_pipeline(&self) -> Result<AcquisitionPipeline>;
}

fn secs(config: &Config, path: &[&str], default: Duration) -> Result<Duration> {
    let secs = config.get_usize(path, default.as_secs() as usize)?;
    Ok(Duration::from_secs(secs as u64))
}

impl AcquisitionConfigExt for Config {
    fn get_ffmpeg_path(&self) -> Result<String> {
        self.get_string(&["transcoder", "ffmpeg_path"], DEFAULT_FFMPEG_PROGRAM)
    }

    fn get_transcoder_timeout(&self) -> Result<Duration> {
        secs(self, &["transcoder", "timeout_secs"], DEFAULT_TRANSCODE_TIMEOUT)
    }

    fn get_fetcher_timeout(&self) -> Result<Duration> {
        secs(self, &["fetcher", "timeout_secs"], DEFAULT_FETCH_TIMEOUT)
    }

    fn create_transcoder(&self) -> Result<FfmpegTranscoder> {
        Ok(FfmpegTranscoder::new(self.get_ffmpeg_path()?).with_timeout(self.get_transcoder_timeout()?))
    }

    fn create_fetcher(&self) -> Result<HttpFetcher> {
        Ok(HttpFetcher::new(self.get_fetcher_timeout()?)?)
    }

    fn create_acquisition_pipeline(&self) -> Result<AcquisitionPipeline> {
        Ok(AcquisitionPipeline::new(
            self.create_cache_store()?,
            Arc::new(self.create_resolver()?),
            Arc::new(self.create_fetcher()?),
            Arc::new(self.create_transcoder()?),
        ))
    }
}
