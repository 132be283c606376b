//! Command implementations.
//!
//! Every command prints one JSON document to stdout. The catalog store is
//! in-memory and per-process, so `ingest` prints its own run report; the
//! standalone query commands operate on whatever the current process has
//! ingested.

use super::args::InferCommands;
use anyhow::{Context, Result};
use async_trait::async_trait;
use cabledex_config::EnvConfig;
use cabledex_core::{ExtractionError, FetchError};
use cabledex_engine::{IngestOptions, IngestService, SeedIngestRequest};
use cabledex_extract::template_for_url;
use cabledex_fetch::{FirecrawlClient, HttpPageFetcher, PageFetcher, ScrapeService, ScrapedPage};
use cabledex_infer::InferenceService;
use cabledex_llm::{AiGatewayClient, LlmGateway, ObjectRequest};
use cabledex_store::CatalogStore;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}

/// Scrape guard for runs that never hit the generic path: surfaces the
/// missing key instead of silently doing nothing if it is hit anyway.
struct MissingKeyScraper;

#[async_trait]
impl ScrapeService for MissingKeyScraper {
    async fn scrape(&self, _url: &str) -> std::result::Result<ScrapedPage, FetchError> {
        Err(FetchError::Transport {
            service: "firecrawl".to_string(),
            message: "Missing required environment variable: FIRECRAWL_API_KEY".to_string(),
        })
    }
}

/// Gateway guard, same idea as [`MissingKeyScraper`].
struct MissingKeyGateway;

#[async_trait]
impl LlmGateway for MissingKeyGateway {
    async fn generate_object(
        &self,
        _request: &ObjectRequest,
    ) -> cabledex_core::Result<Value> {
        Err(ExtractionError::Gateway(
            "Missing required environment variable: AI_GATEWAY_API_KEY".to_string(),
        )
        .into())
    }
}

fn build_ingest_service(config: &EnvConfig, needs_generic_path: bool) -> Result<IngestService> {
    let fetcher: Arc<dyn PageFetcher> = Arc::new(HttpPageFetcher::new()?);

    let scraper: Arc<dyn ScrapeService> = match config.require_firecrawl_key() {
        Ok(key) => Arc::new(FirecrawlClient::new(key)?),
        Err(err) if needs_generic_path => return Err(err.into()),
        Err(_) => Arc::new(MissingKeyScraper),
    };

    let gateway: Arc<dyn LlmGateway> = match config.require_ai_gateway_key() {
        Ok(key) => Arc::new(AiGatewayClient::new(key)?.with_telemetry(config.telemetry)),
        Err(err) if needs_generic_path => return Err(err.into()),
        Err(_) => Arc::new(MissingKeyGateway),
    };

    Ok(IngestService::new(
        Arc::new(CatalogStore::new()),
        fetcher,
        scraper,
        gateway,
        IngestOptions::default(),
    ))
}

pub async fn ingest(
    seeds: Vec<String>,
    allowed_domains: Vec<String>,
    max_items: Option<usize>,
) -> Result<()> {
    let config = EnvConfig::from_env()?;
    // Keys for the generic path are required only when a seed needs it.
    let needs_generic_path = seeds.iter().any(|s| template_for_url(s).is_none());
    let service = build_ingest_service(&config, needs_generic_path)?;

    let result = service
        .run_seed_ingest(SeedIngestRequest {
            seed_urls: seeds,
            allowed_domains,
            max_items,
        })
        .await?;

    #[derive(Serialize)]
    struct IngestOutput {
        run: cabledex_engine::SeedIngestResult,
        report: Option<cabledex_engine::WorkflowReport>,
    }

    let report = service
        .get_workflow_report(result.workflow_run_id, 50)
        .ok();
    print_json(&IngestOutput {
        run: result,
        report,
    })
}

pub async fn discover(template_id: &str, max_items: Option<usize>) -> Result<()> {
    let config = EnvConfig::from_env()?;
    let service = build_ingest_service(&config, false)?;
    let urls = service
        .discover_shopify_seed_urls(template_id, max_items)
        .await?;
    print_json(&urls)
}

pub fn templates() -> Result<()> {
    print_json(&cabledex_extract::list_templates())
}

pub fn top(limit: usize, query: Option<&str>) -> Result<()> {
    let config = EnvConfig::from_env()?;
    let service = build_ingest_service(&config, false)?;
    print_json(&service.get_top_cables(limit, query))
}

pub fn review(limit: usize) -> Result<()> {
    let config = EnvConfig::from_env()?;
    let service = build_ingest_service(&config, false)?;
    print_json(&service.get_top_cables_for_review(limit))
}

pub fn report(workflow: Option<u64>, limit: usize) -> Result<()> {
    let config = EnvConfig::from_env()?;
    let service = build_ingest_service(&config, false)?;
    match workflow {
        Some(id) => print_json(&service.get_workflow_report(id.into(), limit)?),
        None => match service.get_latest_workflow_report(limit) {
            Some(report) => print_json(&report),
            None => print_json(&serde_json::json!(null)),
        },
    }
}

pub fn queue() -> Result<()> {
    let config = EnvConfig::from_env()?;
    let service = build_ingest_service(&config, false)?;
    print_json(&service.get_enrichment_queue_summary())
}

fn build_inference_service(config: &EnvConfig, require_llm: bool) -> Result<InferenceService> {
    let gateway: Option<Arc<dyn LlmGateway>> = match config.require_ai_gateway_key() {
        Ok(key) => Some(Arc::new(
            AiGatewayClient::new(key)?.with_telemetry(config.telemetry),
        )),
        Err(err) if require_llm => return Err(err.into()),
        Err(_) => None,
    };

    Ok(InferenceService::new(
        Arc::new(CatalogStore::new()),
        gateway,
        config.manual_inference_model.clone(),
    ))
}

pub async fn infer(command: InferCommands) -> Result<()> {
    let config = EnvConfig::from_env()?;

    match command {
        InferCommands::Submit { workspace, prompt } => {
            let service = build_inference_service(&config, true)?;
            let session = service.submit_prompt(&workspace, &prompt).await?;
            print_json(&session)
        }
        InferCommands::Answer {
            workspace,
            question,
            answer,
        } => {
            let service = build_inference_service(&config, false)?;
            service.ensure_session(&workspace);
            let session = service.answer_question(&workspace, &question, answer.into())?;
            print_json(&session)
        }
        InferCommands::Show { workspace } => {
            let service = build_inference_service(&config, false)?;
            print_json(&service.ensure_session(&workspace))
        }
        InferCommands::Reset { workspace } => {
            let service = build_inference_service(&config, false)?;
            print_json(&service.reset_session(&workspace))
        }
        InferCommands::Defaults => print_json(&InferenceService::get_defaults()),
    }
}

pub fn doctor() -> Result<()> {
    let config = EnvConfig::from_env()?;

    #[derive(Serialize)]
    struct DoctorOutput {
        ai_gateway_key_present: bool,
        firecrawl_key_present: bool,
        telemetry: cabledex_config::TelemetryConfig,
        manual_inference_model: String,
        templates: Vec<cabledex_extract::TemplateInfo>,
        ok: bool,
    }

    let output = DoctorOutput {
        ai_gateway_key_present: config.has_ai_gateway_key(),
        firecrawl_key_present: config.has_firecrawl_key(),
        telemetry: config.telemetry,
        manual_inference_model: config.manual_inference_model.clone(),
        templates: cabledex_extract::list_templates(),
        ok: config.has_ai_gateway_key() && config.has_firecrawl_key(),
    };
    print_json(&output)
}
