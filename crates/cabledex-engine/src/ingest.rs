//! Seed ingestion workflow execution.

use crate::ranking;
use crate::report::{self, WorkflowReport};
use cabledex_config::DEFAULT_EXTRACTION_MODEL;
use cabledex_core::{
    EvidenceId, NotFoundError, QualityState, Result, SpecId, WorkflowId, WorkflowStatus,
};
use cabledex_extract::{
    GenericLlmExtractor, ShopifyAdapter, SourceExtraction, TemplateInfo, canonical,
    canonicalize_url, list_templates, template_by_id, template_for_url,
};
use cabledex_fetch::redact::redact_error_message;
use cabledex_fetch::{PageFetcher, ScrapeService};
use cabledex_llm::LlmGateway;
use cabledex_store::{CatalogStore, EnrichmentQueueSummary, content_hash};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Tuning knobs for the ingestion loop.
#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Hard cap on items per workflow.
    pub max_items: usize,
    /// Attempts per item, including the first.
    pub max_parse_retries: u32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    /// Model used by the generic LLM extractor.
    pub extraction_model: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_items: 25,
            max_parse_retries: 3,
            initial_retry_delay_ms: 500,
            max_retry_delay_ms: 8_000,
            extraction_model: DEFAULT_EXTRACTION_MODEL.to_string(),
        }
    }
}

/// Request for `run_seed_ingest`.
#[derive(Debug, Clone, Default)]
pub struct SeedIngestRequest {
    pub seed_urls: Vec<String>,
    /// Empty list allows all hosts.
    pub allowed_domains: Vec<String>,
    pub max_items: Option<usize>,
}

/// Aggregate result of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct SeedIngestResult {
    pub workflow_run_id: WorkflowId,
    pub total_items: u32,
    pub completed_items: u32,
    pub failed_items: u32,
    pub status: WorkflowStatus,
}

/// Exponential backoff with a cap: `min(initial * 2^(attempt-1), max)`.
#[must_use]
pub fn backoff_delay(attempt: u32, initial_ms: u64, max_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = initial_ms.saturating_mul(1u64 << exponent);
    Duration::from_millis(delay.min(max_ms))
}

/// Normalize seed URLs: domain allow-list, canonicalization, ordered
/// deduplication, truncation.
fn normalize_seed_urls(
    seed_urls: &[String],
    allowed_domains: &[String],
    max_items: usize,
) -> Vec<String> {
    let mut normalized = Vec::new();
    for raw in seed_urls {
        let Some(canonical_url) = canonicalize_url(raw) else {
            continue;
        };
        if !allowed_domains.is_empty() {
            let Some(host) = canonical::host_of(&canonical_url) else {
                continue;
            };
            if !allowed_domains
                .iter()
                .any(|domain| canonical::host_matches_domain(&host, domain))
            {
                continue;
            }
        }
        if !normalized.contains(&canonical_url) {
            normalized.push(canonical_url);
        }
        if normalized.len() >= max_items {
            break;
        }
    }
    normalized
}

/// The ingestion and query service.
pub struct IngestService {
    store: Arc<CatalogStore>,
    fetcher: Arc<dyn PageFetcher>,
    scraper: Arc<dyn ScrapeService>,
    gateway: Arc<dyn LlmGateway>,
    options: IngestOptions,
}

impl IngestService {
    #[must_use]
    pub fn new(
        store: Arc<CatalogStore>,
        fetcher: Arc<dyn PageFetcher>,
        scraper: Arc<dyn ScrapeService>,
        gateway: Arc<dyn LlmGateway>,
        options: IngestOptions,
    ) -> Self {
        Self {
            store,
            fetcher,
            scraper,
            gateway,
            options,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CatalogStore> {
        &self.store
    }

    /// Execute a batch of seed URLs end to end.
    ///
    /// Items run sequentially; a failing item never aborts the workflow.
    /// The workflow finalizes `failed` iff any item failed, and retains the
    /// first observed item error as `last_error`.
    ///
    /// # Errors
    ///
    /// Only persistence failures escape; per-item fetch/extraction errors
    /// are recorded on the items.
    pub async fn run_seed_ingest(&self, request: SeedIngestRequest) -> Result<SeedIngestResult> {
        let max_items = request
            .max_items
            .unwrap_or(self.options.max_items)
            .min(self.options.max_items);
        let seeds =
            normalize_seed_urls(&request.seed_urls, &request.allowed_domains, max_items);

        let workflow =
            self.store
                .create_workflow(seeds.clone(), request.allowed_domains.clone(), Utc::now());
        info!(workflow = %workflow.id, items = seeds.len(), "seed ingest started");

        let mut items = Vec::with_capacity(seeds.len());
        for seed in &seeds {
            items.push(
                self.store
                    .add_workflow_item(workflow.id, seed, seed, Utc::now())?,
            );
        }

        for item in &items {
            self.run_item(workflow.id, item.id, &item.url, &item.canonical_url)
                .await?;
        }

        let finalized = self.store.finalize_workflow(workflow.id, Utc::now())?;
        info!(
            workflow = %finalized.id,
            status = ?finalized.status,
            completed = finalized.completed_items,
            failed = finalized.failed_items,
            "seed ingest finished"
        );

        Ok(SeedIngestResult {
            workflow_run_id: finalized.id,
            total_items: finalized.total_items,
            completed_items: finalized.completed_items,
            failed_items: finalized.failed_items,
            status: finalized.status,
        })
    }

    async fn run_item(
        &self,
        workflow_id: WorkflowId,
        item_id: cabledex_core::WorkflowItemId,
        url: &str,
        canonical_url: &str,
    ) -> Result<()> {
        let mut last_error = String::new();

        for attempt in 1..=self.options.max_parse_retries {
            self.store.begin_item_attempt(item_id, Utc::now())?;

            match self.process_source(workflow_id, url, canonical_url).await {
                Ok((evidence_id, spec_id)) => {
                    self.store
                        .complete_item(item_id, evidence_id, spec_id, Utc::now())?;
                    return Ok(());
                }
                Err(err) => {
                    last_error = redact_error_message(&err.to_string());
                    let retryable = err.is_retryable();
                    warn!(
                        item = %item_id,
                        attempt,
                        retryable,
                        error = %last_error,
                        "item attempt failed"
                    );
                    if !retryable {
                        break;
                    }
                    if attempt < self.options.max_parse_retries {
                        tokio::time::sleep(backoff_delay(
                            attempt,
                            self.options.initial_retry_delay_ms,
                            self.options.max_retry_delay_ms,
                        ))
                        .await;
                    }
                }
            }
        }

        self.store.fail_item(item_id, &last_error, Utc::now())?;
        Ok(())
    }

    /// Fetch, extract and persist one source URL: vendor template when one
    /// matches, otherwise scrape + LLM extraction.
    async fn process_source(
        &self,
        workflow_id: WorkflowId,
        url: &str,
        canonical_url: &str,
    ) -> Result<(EvidenceId, Option<SpecId>)> {
        let extraction = match template_for_url(url) {
            Some(template) => {
                let adapter = ShopifyAdapter::new(template, self.fetcher.as_ref());
                adapter
                    .extract_from_product_url(url)
                    .await?
                    .ok_or_else(|| NotFoundError::UnmatchedUrl {
                        url: url.to_string(),
                    })?
            }
            None => {
                let scraped = self.scraper.scrape(url).await?;
                let hash = content_hash(canonical_url, &scraped.markdown, &scraped.html);
                let extractor =
                    GenericLlmExtractor::new(self.gateway.as_ref(), &self.options.extraction_model);
                let cables = extractor.extract(&scraped, canonical_url, &hash).await?;
                SourceExtraction {
                    url: url.to_string(),
                    canonical_url: canonical_url.to_string(),
                    markdown: scraped.markdown,
                    html: scraped.html,
                    cables,
                }
            }
        };

        let evidence = self.store.insert_evidence(
            workflow_id,
            &extraction.url,
            &extraction.canonical_url,
            &extraction.markdown,
            &extraction.html,
            Utc::now(),
        );

        let mut first_spec: Option<SpecId> = None;
        for cable in &extraction.cables {
            let outcome = self.store.upsert_variant_and_insert_spec(
                workflow_id,
                &extraction.canonical_url,
                evidence.id,
                cable,
                Utc::now(),
            )?;
            first_spec.get_or_insert(outcome.spec.id);
        }

        Ok((evidence.id, first_spec))
    }

    /// Discover seed URLs from a vendor template's search surface.
    ///
    /// # Errors
    ///
    /// `NotFoundError::Template` for an unknown template id.
    pub async fn discover_shopify_seed_urls(
        &self,
        template_id: &str,
        max_items: Option<usize>,
    ) -> Result<Vec<String>> {
        let template = template_by_id(template_id).ok_or_else(|| NotFoundError::Template {
            id: template_id.to_string(),
        })?;
        let adapter = ShopifyAdapter::new(template, self.fetcher.as_ref());
        adapter
            .discover_product_urls(max_items.unwrap_or(self.options.max_items))
            .await
    }

    /// Vendor templates available for discovery.
    #[must_use]
    pub fn list_shopify_templates(&self) -> Vec<TemplateInfo> {
        list_templates()
    }

    /// Ranked, deduplicated, quality-filtered top cables.
    #[must_use]
    pub fn get_top_cables(
        &self,
        limit: usize,
        search_query: Option<&str>,
    ) -> Vec<ranking::TopCableRow> {
        ranking::get_top_cables(&self.store, limit, search_query, &[QualityState::Ready])
    }

    /// Review variant of the top list: includes `needs_enrichment` rows.
    #[must_use]
    pub fn get_top_cables_for_review(&self, limit: usize) -> Vec<ranking::TopCableRow> {
        ranking::get_top_cables(
            &self.store,
            limit,
            None,
            &[QualityState::Ready, QualityState::NeedsEnrichment],
        )
    }

    /// Report for one workflow run.
    ///
    /// # Errors
    ///
    /// `PersistenceError::MissingRow` for an unknown workflow id.
    pub fn get_workflow_report(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<WorkflowReport> {
        report::workflow_report(&self.store, workflow_id, limit)
    }

    /// Report for the most recent workflow, if any exist.
    #[must_use]
    pub fn get_latest_workflow_report(&self, limit: usize) -> Option<WorkflowReport> {
        let workflow = self.store.latest_workflow()?;
        report::workflow_report(&self.store, workflow.id, limit).ok()
    }

    /// Enrichment queue counts.
    #[must_use]
    pub fn get_enrichment_queue_summary(&self) -> EnrichmentQueueSummary {
        self.store.enrichment_queue_summary()
    }
}
