//! Firecrawl scrape client.

use crate::http::HttpClient;
use async_trait::async_trait;
use cabledex_core::FetchError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default Firecrawl API base.
const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

/// Snapshot of a scraped page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    /// URL the scrape was requested for.
    pub url: String,
    /// Canonical source URL reported by the scraper, when present.
    pub source_url: Option<String>,
    pub markdown: String,
    pub html: String,
    pub og_image: Option<String>,
}

/// Markdown/html scraping service used by the generic extractor.
#[async_trait]
pub trait ScrapeService: Send + Sync {
    /// Scrape `url` into markdown and html.
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FetchError>;
}

/// HTTP client for the Firecrawl scrape API.
pub struct FirecrawlClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
}

impl FirecrawlClient {
    /// Create a client against the production Firecrawl endpoint.
    ///
    /// # Errors
    ///
    /// `FetchError::Transport` if the HTTP client cannot be constructed.
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        Ok(Self {
            http: HttpClient::new()?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different base URL (tests, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
}

#[derive(Deserialize)]
struct ScrapeResponse {
    success: bool,
    data: Option<ScrapeData>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    html: String,
    #[serde(default)]
    metadata: ScrapeMetadata,
}

#[derive(Deserialize, Default)]
struct ScrapeMetadata {
    #[serde(rename = "sourceURL")]
    source_url: Option<String>,
    #[serde(rename = "ogImage")]
    og_image: Option<String>,
}

#[async_trait]
impl ScrapeService for FirecrawlClient {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FetchError> {
        let endpoint = format!("{}/v1/scrape", self.base_url);
        let body = ScrapeRequest {
            url,
            formats: ["markdown"],
        };

        let builder = self
            .http
            .inner()
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = self.http.execute_with_retry(builder, "firecrawl").await?;
        let payload: ScrapeResponse =
            response.json().await.map_err(|e| FetchError::Payload {
                service: "firecrawl".to_string(),
                message: format!("failed to parse scrape response: {e}"),
            })?;

        if !payload.success {
            return Err(FetchError::Payload {
                service: "firecrawl".to_string(),
                message: payload
                    .error
                    .unwrap_or_else(|| "scrape reported success=false".to_string()),
            });
        }

        let data = payload.data.ok_or_else(|| FetchError::Payload {
            service: "firecrawl".to_string(),
            message: "scrape response missing data".to_string(),
        })?;

        debug!(
            url,
            markdown_bytes = data.markdown.len(),
            html_bytes = data.html.len(),
            "scraped page"
        );

        Ok(ScrapedPage {
            url: url.to_string(),
            source_url: data.metadata.source_url,
            markdown: data.markdown,
            html: data.html,
            og_image: data.metadata.og_image,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn scrape_parses_the_documented_wire_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer fc-test"))
            .and(body_partial_json(json!({
                "url": "https://shop.example.com/products/cable",
                "formats": ["markdown"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "markdown": "# Cable\n240W charging",
                    "html": "<h1>Cable</h1>",
                    "metadata": {
                        "sourceURL": "https://shop.example.com/products/cable",
                        "ogImage": "https://cdn.example.com/cable.jpg",
                    }
                }
            })))
            .mount(&server)
            .await;

        let client = FirecrawlClient::new("fc-test")
            .unwrap()
            .with_base_url(server.uri());
        let page = client
            .scrape("https://shop.example.com/products/cable")
            .await
            .unwrap();

        assert!(page.markdown.contains("240W"));
        assert_eq!(page.html, "<h1>Cable</h1>");
        assert_eq!(
            page.source_url.as_deref(),
            Some("https://shop.example.com/products/cable")
        );
        assert_eq!(
            page.og_image.as_deref(),
            Some("https://cdn.example.com/cable.jpg")
        );
    }

    #[tokio::test]
    async fn unsuccessful_scrape_is_a_payload_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "blocked by robots.txt",
            })))
            .mount(&server)
            .await;

        let client = FirecrawlClient::new("fc-test")
            .unwrap()
            .with_base_url(server.uri());
        let err = client.scrape("https://example.com").await.unwrap_err();

        match err {
            FetchError::Payload { message, .. } => assert!(message.contains("robots")),
            other => panic!("expected Payload error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn auth_failure_maps_to_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = FirecrawlClient::new("bad-key")
            .unwrap()
            .with_base_url(server.uri());
        let err = client.scrape("https://example.com").await.unwrap_err();

        match err {
            FetchError::Status { status, .. } => assert_eq!(status, 401),
            other => panic!("expected Status error, got {other:?}"),
        }
    }
}
