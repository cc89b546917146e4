//! HTTP downloads of remote images for `download-all`.

use async_trait::async_trait;
use image_autoupload_core::contract::Fetcher;
use image_autoupload_core::error::HostError;

/// Downloads remote images with a plain GET.
pub struct HttpFetcher {
    http: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, HostError> {
        tracing::debug!(url = %url, "Downloading image");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| HostError::Other(format!("request: {e}")))?;
        if !response.status().is_success() {
            return Err(HostError::Other(format!("status {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| HostError::Other(format!("body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
