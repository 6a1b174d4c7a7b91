//! HTTP fetching behind a seam
//!
//! The pipeline only ever sees [`SourceFetcher`]; the real implementation is
//! a thin reqwest wrapper. No retries here: a failed source is skipped for
//! this rebuild and logged, the next rebuild tries again.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::errors::{SourceError, SourceResult};

/// Fetch seam for playlist and guide documents.
///
/// Everything is fetched as bytes; payloads may be compressed and the
/// decision is made downstream from the magic bytes, never from headers.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> SourceResult<Vec<u8>>;
}

/// reqwest-backed fetcher used in production.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch_bytes(&self, url: &str) -> SourceResult<Vec<u8>> {
        debug!("fetching {url}");
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SourceError::Timeout {
                    url: url.to_string(),
                }
            } else {
                SourceError::parse("http", e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SourceError::parse("http", e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
