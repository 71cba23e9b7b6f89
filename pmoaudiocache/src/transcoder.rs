//! Conversion du flux source vers la qualité demandée

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use pmocache::Quality;
use tokio::process::Command;
use tracing::debug;

use crate::error::{AcquisitionError, Result};

pub const DEFAULT_FFMPEG_PROGRAM: &str = "ffmpeg";
pub const DEFAULT_TRANSCODE_TIMEOUT: Duration = Duration::from_secs(600);

/// Capacité de transcodage d'un fichier vers une [`Quality`]
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input: &Path, output: &Path, quality: Quality) -> Result<()>;
}

/// Transcodage par ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    timeout: Duration,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_FFMPEG_PROGRAM)
    }
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TRANSCODE_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Vérifie que l'exécutable répond à `-version`
    pub async fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

/// Arguments ffmpeg de conversion de `input` vers `output`
pub fn ffmpeg_args(input: &Path, output: &Path, quality: Quality) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vn".to_string(),
    ];

    match quality.bitrate_kbps() {
        Some(kbps) => args.extend([
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", kbps),
            "-f".to_string(),
            "mp3".to_string(),
        ]),
        None => args.extend([
            "-c:a".to_string(),
            "flac".to_string(),
            "-f".to_string(),
            "flac".to_string(),
        ]),
    }

    args.push(output.to_string_lossy().to_string());
    args
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path, quality: Quality) -> Result<()> {
        let args = ffmpeg_args(input, output, quality);
        debug!(program = %self.program, quality = %quality, "Transcoding");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AcquisitionError::TranscodeFailure(format!("cannot run {}: {}", self.program, e))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                AcquisitionError::TranscodeFailure(format!(
                    "timed out after {}s",
                    self.timeout.as_secs()
                ))
            })?
            .map_err(|e| AcquisitionError::TranscodeFailure(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AcquisitionError::TranscodeFailure(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}
