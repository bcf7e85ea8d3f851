//! HTTP client wrapper used by the streaming engine.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::RANGE;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, USER_AGENT};

/// A fully-read response body and the URL it was served from after redirects.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// URL after redirects; relative playlist entries resolve against it.
    pub final_url: String,
    /// Raw body.
    pub bytes: Vec<u8>,
}

/// HTTP client for playlist and segment requests.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Sends a GET request and checks the status.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Network`] if the request fails and
    /// [`DownloadError::HttpStatus`] for a non-success response.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        self.get_range(url, None).await
    }

    /// Sends a GET request limited to the inclusive `range`, if any.
    ///
    /// Servers that ignore `Range` answer `200` with the whole resource;
    /// callers check for `206 Partial Content`.
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get`].
    #[instrument(level = "debug", skip(self))]
    pub async fn get_range(
        &self,
        url: &str,
        range: Option<(u64, u64)>,
    ) -> Result<reqwest::Response, DownloadError> {
        let mut request = self.client.get(url);
        if let Some((start, end)) = range {
            request = request.header(RANGE, format!("bytes={start}-{end}"));
        }
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "non-success response");
            return Err(DownloadError::http_status(url, status.as_u16()));
        }
        Ok(response)
    }

    /// Fetches a whole response body (used for playlists).
    ///
    /// # Errors
    ///
    /// Same as [`HttpClient::get`], plus [`DownloadError::Network`] if the
    /// body cannot be read.
    pub async fn get_bytes(&self, url: &str) -> Result<FetchedBody, DownloadError> {
        let response = self.get(url).await?;
        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| DownloadError::network(url, e))?;
        Ok(FetchedBody {
            final_url,
            bytes: body.to_vec(),
        })
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
