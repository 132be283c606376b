//! Raw page fetching for vendor templates.

use crate::http::HttpClient;
use async_trait::async_trait;
use cabledex_core::FetchError;

/// Plain-text page fetches (search pages, embedded JSON, `.js` endpoints).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` and return the response body as text.
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Reqwest-backed page fetcher.
pub struct HttpPageFetcher {
    http: HttpClient,
}

impl HttpPageFetcher {
    /// # Errors
    ///
    /// `FetchError::Transport` if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpClient::new()?,
        })
    }

    #[must_use]
    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let builder = self
            .http
            .inner()
            .get(url)
            .header("accept", "text/html,application/json");

        let response = self.http.execute_with_retry(builder, "vendor").await?;
        response.text().await.map_err(|e| FetchError::Payload {
            service: "vendor".to_string(),
            message: format!("failed to read body: {e}"),
        })
    }
}
