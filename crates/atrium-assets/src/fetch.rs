//! Remote asset retrieval.

use std::time::Duration;

use tracing::debug;

use crate::error::FetchError;

/// Default per-request timeout for remote asset retrieval.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Retrieves the raw bytes of a remote asset.
///
/// Single attempt, bounded by a timeout, no retries; the fallback generator
/// is the retry-equivalent. A timed-out fetch is handled identically to any
/// other network failure.
#[allow(async_fn_in_trait)]
pub trait AssetFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, locator: &str) -> Result<Vec<u8>, FetchError> {
        debug!("fetching asset from {}", locator);
        let response = self.client.get(locator).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await?;
        debug!("fetched {} bytes from {}", bytes.len(), locator);
        Ok(bytes.to_vec())
    }
}
