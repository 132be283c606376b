//! Static fetch doubles for tests.

use crate::firecrawl::{ScrapeService, ScrapedPage};
use crate::page::PageFetcher;
use async_trait::async_trait;
use cabledex_core::FetchError;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Page fetcher serving a fixed URL -> body map; unknown URLs return 404.
#[derive(Default)]
pub struct StaticPageFetcher {
    pages: HashMap<String, String>,
}

impl StaticPageFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page(mut self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.pages.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl PageFetcher for StaticPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                service: "vendor".to_string(),
                status: 404,
                url: url.to_string(),
            })
    }
}

/// One scripted scrape outcome.
pub enum ScriptedScrape {
    Page(ScrapedPage),
    Failure(String),
}

/// Scrape service that replays a scripted sequence of outcomes, falling back
/// to a URL map once the script is exhausted. Useful for retry-path tests.
#[derive(Default)]
pub struct ScriptedScraper {
    script: Mutex<VecDeque<ScriptedScrape>>,
    pages: HashMap<String, ScrapedPage>,
}

impl ScriptedScraper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_page(mut self, page: ScrapedPage) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    /// Queue an outcome consumed before the URL map is consulted.
    pub fn push(&self, outcome: ScriptedScrape) {
        self.script.lock().unwrap().push_back(outcome);
    }

    #[must_use]
    pub fn with_scripted(self, outcome: ScriptedScrape) -> Self {
        self.push(outcome);
        self
    }
}

#[async_trait]
impl ScrapeService for ScriptedScraper {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage, FetchError> {
        if let Some(outcome) = self.script.lock().unwrap().pop_front() {
            return match outcome {
                ScriptedScrape::Page(page) => Ok(page),
                ScriptedScrape::Failure(message) => Err(FetchError::Transport {
                    service: "firecrawl".to_string(),
                    message,
                }),
            };
        }

        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                service: "firecrawl".to_string(),
                status: 404,
                url: url.to_string(),
            })
    }
}

/// Convenience constructor for a scraped page fixture.
#[must_use]
pub fn page(url: &str, markdown: &str, html: &str) -> ScrapedPage {
    ScrapedPage {
        url: url.to_string(),
        source_url: Some(url.to_string()),
        markdown: markdown.to_string(),
        html: html.to_string(),
        og_image: None,
    }
}
