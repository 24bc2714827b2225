use crate::cache::ExpiringCache;
use crate::shutdown::Shutdown;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a feed document.
///
/// `Network`, `Timeout`, `HttpStatus` and `ResponseTooLarge` are transport
/// failures: the caller skips the feed until its next turn. `Cancelled` means
/// the shutdown signal fired and the caller should stop.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// Shutdown was requested before the response arrived
    #[error("Request cancelled")]
    Cancelled,
    /// Response body exceeded the configured size limit
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
}

/// Settings for [`DocumentFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Sent as the `User-Agent` header on every request.
    pub user_agent: String,
    /// Deadline for one request, body included.
    pub timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("feedpoll/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(10),
            max_body_bytes: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Fetches raw feed documents over HTTP.
///
/// Issues exactly one GET per call and never retries; retry policy belongs to
/// the caller. When constructed with a cache, responses are stored under
/// their URL and served from memory until the cache sweeps them.
#[derive(Clone)]
pub struct DocumentFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
    cache: Option<Arc<ExpiringCache>>,
}

impl DocumentFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_body_bytes: config.max_body_bytes,
            cache: None,
        })
    }

    pub fn with_cache(mut self, cache: Arc<ExpiringCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch the document at `url`.
    ///
    /// Returns the full body on a 2xx response. Resolves early with
    /// [`FetchError::Cancelled`] if `shutdown` fires first.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Network`] - Connection, DNS or TLS failure
    /// - [`FetchError::Timeout`] - No complete response within the deadline
    /// - [`FetchError::HttpStatus`] - Non-2xx response
    /// - [`FetchError::ResponseTooLarge`] - Body exceeded the size limit
    /// - [`FetchError::Cancelled`] - Shutdown requested
    pub async fn fetch(&self, url: &str, shutdown: &mut Shutdown) -> Result<Vec<u8>, FetchError> {
        if let Some(payload) = self.cache.as_ref().and_then(|cache| cache.get(url)) {
            tracing::debug!(url = %url, bytes = payload.len(), "Serving feed from cache");
            return Ok(payload.to_vec());
        }

        let bytes = tokio::select! {
            biased;

            _ = shutdown.cancelled() => return Err(FetchError::Cancelled),

            result = tokio::time::timeout(self.timeout, self.request(url)) => {
                result.map_err(|_| FetchError::Timeout(self.timeout))??
            }
        };

        if let Some(cache) = &self.cache {
            cache.put(url, bytes.as_slice());
        }
        Ok(bytes)
    }

    async fn request(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        read_limited_bytes(response, self.max_body_bytes).await
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    fn fetcher() -> DocumentFetcher {
        DocumentFetcher::new(&FetcherConfig {
            user_agent: "feedpoll-test".to_string(),
            timeout: Duration::from_secs(2),
            max_body_bytes: 1024,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_fetch_success_sends_user_agent() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("user-agent", "feedpoll-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let bytes = fetcher().fetch(&url, &mut Shutdown::never()).await.unwrap();
        assert_eq!(bytes, VALID_RSS.as_bytes());
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        match fetcher().fetch(&url, &mut Shutdown::never()).await {
            Err(FetchError::HttpStatus(404)) => {}
            other => panic!("Expected HttpStatus(404), got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_500_is_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let result = fetcher().fetch(&url, &mut Shutdown::never()).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(500))));
    }

    #[tokio::test]
    async fn test_fetch_timeout() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let fetcher = DocumentFetcher::new(&FetcherConfig {
            timeout: Duration::from_millis(200),
            ..FetcherConfig::default()
        })
        .unwrap();

        let url = format!("{}/feed", mock_server.uri());
        let result = fetcher.fetch(&url, &mut Shutdown::never()).await;
        assert!(matches!(result, Err(FetchError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_fetch_cancelled_in_flight() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&mock_server)
            .await;

        let (trigger, mut shutdown) = shutdown::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.trigger();
        });

        let started = std::time::Instant::now();
        let url = format!("{}/feed", mock_server.uri());
        let result = fetcher().fetch(&url, &mut shutdown).await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 4096]))
            .mount(&mock_server)
            .await;

        let url = format!("{}/feed", mock_server.uri());
        let result = fetcher().fetch(&url, &mut Shutdown::never()).await;
        assert!(matches!(result, Err(FetchError::ResponseTooLarge(1024))));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        // Port 1 (tcpmux) is not listening on any sane test host
        let result = fetcher()
            .fetch("http://127.0.0.1:1/feed", &mut Shutdown::never())
            .await;
        assert!(matches!(result, Err(FetchError::Network(_))));
    }

    #[tokio::test]
    async fn test_cached_fetch_hits_network_once() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .expect(1)
            .mount(&mock_server)
            .await;

        let cache = Arc::new(ExpiringCache::new(Duration::from_secs(60)));
        let fetcher = fetcher().with_cache(Arc::clone(&cache));
        let url = format!("{}/feed", mock_server.uri());

        let first = fetcher.fetch(&url, &mut Shutdown::never()).await.unwrap();
        let second = fetcher.fetch(&url, &mut Shutdown::never()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_fetch_not_cached() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&mock_server)
            .await;

        let cache = Arc::new(ExpiringCache::new(Duration::from_secs(60)));
        let fetcher = fetcher().with_cache(Arc::clone(&cache));
        let url = format!("{}/feed", mock_server.uri());

        assert!(fetcher.fetch(&url, &mut Shutdown::never()).await.is_err());
        assert!(fetcher.fetch(&url, &mut Shutdown::never()).await.is_err());
        assert!(cache.is_empty());
    }
}
