//! Reference image fetching.
//!
//! A fetch makes one attempt by default; `max_retries` adds bounded
//! exponential-backoff retries. Callers treat any error as a skip, never
//! as a fatal build error.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Source of reference image bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Download the image at `url`.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Configuration for HTTP fetching.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Request timeout
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub max_retries: u32,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 0,
            user_agent: format!("cardmatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl From<&card_types::FetchSettings> for FetchConfig {
    fn from(settings: &card_types::FetchSettings) -> Self {
        Self {
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            user_agent: settings.user_agent.clone(),
        }
    }
}

/// Fetcher backed by a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: Client,
    config: FetchConfig,
}

impl HttpImageFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Make a single request.
    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| classify(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(|e| classify(url, e))?;
        debug!(url, bytes = bytes.len(), "Fetched image");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::MissingUrl);
        }

        let mut backoff = ExponentialBackoff {
            current_interval: Duration::from_millis(250),
            initial_interval: Duration::from_millis(250),
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut retries = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if retries < self.config.max_retries => {
                    retries += 1;
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(backoff.max_interval);
                    warn!(
                        url,
                        error = %e,
                        attempt = retries,
                        retry_in_ms = delay.as_millis(),
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn classify(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Request {
            url: url.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Fetcher serving images from memory; unknown URLs answer 404.
///
/// Useful for offline builds from pre-seeded bytes and for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    images: HashMap<String, Vec<u8>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register bytes for a URL (builder pattern).
    pub fn with_image(mut self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.images.insert(url.into(), bytes.into());
        self
    }
}

#[async_trait]
impl ImageFetcher for InMemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(max_retries: u32) -> HttpImageFetcher {
        HttpImageFetcher::new(FetchConfig {
            timeout: Duration::from_millis(500),
            max_retries,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cards/A.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
            .mount(&server)
            .await;

        let bytes = fetcher(0)
            .fetch(&format!("{}/cards/A.png", server.uri()))
            .await
            .unwrap();
        assert_eq!(bytes, b"png-bytes");
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let err = fetcher(0)
            .fetch(&format!("{}/missing.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
            .mount(&server)
            .await;

        let err = fetcher(0)
            .fetch(&format!("{}/slow.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_fetch_retries_are_bounded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = fetcher(2)
            .fetch(&format!("{}/flaky.png", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_fetch_empty_url() {
        let err = fetcher(0).fetch("").await.unwrap_err();
        assert!(matches!(err, FetchError::MissingUrl));
    }

    #[tokio::test]
    async fn test_in_memory_fetcher() {
        let fetcher = InMemoryFetcher::new().with_image("u1", b"one".to_vec());
        assert_eq!(fetcher.fetch("u1").await.unwrap(), b"one");
        assert!(matches!(
            fetcher.fetch("u2").await,
            Err(FetchError::Status { status: 404, .. })
        ));
    }
}
