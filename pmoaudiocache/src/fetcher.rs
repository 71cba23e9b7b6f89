//! Téléchargement du flux source

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use pmoresolver::StreamSource;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{AcquisitionError, Result};

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(300);

/// Capacité de téléchargement d'un flux vers un fichier local
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Écrit le contenu de `source` dans `dest` et renvoie le nombre
    /// d'octets reçus
    async fn fetch(&self, source: &StreamSource, dest: &Path) -> Result<u64>;
}

/// Téléchargement HTTP en streaming avec reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AcquisitionError::NetworkFailure(e.to_string()))?;
        Ok(Self { client })
    }
}

/// En-têtes imposés par l'extracteur ; les entrées invalides sont ignorées
fn build_headers(source: &StreamSource) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in &source.http_headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => warn!("Skipping invalid stream header '{}'", name),
        }
    }
    headers
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, source: &StreamSource, dest: &Path) -> Result<u64> {
        let network = |e: reqwest::Error| AcquisitionError::NetworkFailure(e.to_string());
        let storage = |e: std::io::Error| AcquisitionError::Storage(e.to_string());

        let response = self
            .client
            .get(&source.url)
            .headers(build_headers(source))
            .send()
            .await
            .map_err(network)?;

        if !response.status().is_success() {
            return Err(AcquisitionError::NetworkFailure(format!(
                "HTTP error: {}",
                response.status()
            )));
        }
        let expected = response.content_length();

        let mut file = tokio::fs::File::create(dest).await.map_err(storage)?;
        let mut stream = response.bytes_stream();
        let mut received = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network)?;
            file.write_all(&chunk).await.map_err(storage)?;
            received += chunk.len() as u64;
        }
        file.flush().await.map_err(storage)?;

        if let Some(expected) = expected {
            if received != expected {
                return Err(AcquisitionError::NetworkFailure(format!(
                    "truncated download: {} of {} bytes",
                    received, expected
                )));
            }
        }

        debug!(bytes = received, "Source fetched");
        Ok(received)
    }
}
