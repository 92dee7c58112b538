//! Bounded download of business-supplied images.
//!
//! Backgrounds and logos come from arbitrary URLs configured per offer. A
//! fetch is limited by a request timeout and a byte cap enforced while the
//! body streams in; any failure yields `None` and the render falls back to a
//! solid background or the icon artwork.

use std::time::Duration;

use tracing::{debug, warn};

/// Errors from a single image fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP client error: {0}")]
    Client(String),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Unexpected status {0}")]
    Status(u16),

    #[error("Response exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("Invalid image URL: {0}")]
    InvalidUrl(String),
}

/// HTTP client for background and logo images.
#[derive(Debug, Clone)]
pub struct BackgroundFetcher {
    http: reqwest::Client,
    max_bytes: usize,
}

impl BackgroundFetcher {
    /// Build a fetcher with the given per-request timeout and body cap.
    ///
    /// Installs the `ring` crypto provider for rustls (no-op if one is
    /// already installed).
    pub fn new(timeout: Duration, max_bytes: usize) -> Result<Self, FetchError> {
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(concat!("stampcard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { http, max_bytes })
    }

    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Download `url`, enforcing the byte cap chunk by chunk.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!(
                "unsupported scheme {}",
                parsed.scheme()
            )));
        }

        let mut response = self
            .http
            .get(parsed)
            .send()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.max_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            return Err(FetchError::TooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?
        {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url, bytes = body.len(), "Fetched image");
        Ok(body)
    }

    /// [`fetch`](Self::fetch), logging and discarding any failure.
    pub async fn fetch_or_none(&self, url: &str) -> Option<Vec<u8>> {
        match self.fetch(url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(url, error = %e, "Image fetch failed, falling back");
                None
            }
        }
    }
}
