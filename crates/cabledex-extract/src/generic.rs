//! Generic LLM-backed extractor for pages no vendor template matches.

use cabledex_core::{
    Connector, DataSpec, ExtractionError, ParsedCable, ParsedEvidence, PowerSpec, Result,
    VideoSpec, field_paths,
};
use cabledex_fetch::ScrapedPage;
use cabledex_llm::{LlmGateway, ObjectRequest};
use cabledex_normalize::{clamp_data_capability_by_connector, normalize_connector};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

/// Markdown beyond this many characters is truncated before prompting.
const MAX_MARKDOWN_CHARS: usize = 120_000;

const SYSTEM_PROMPT: &str = "You extract structured USB/Thunderbolt/Lightning cable \
specifications from product pages. Report only what the page states; never invent \
capability values. Every cable must carry evidence entries for brand, model, \
connectorPair.from and connectorPair.to quoting the page text that supports them.";

/// Schema-constrained extractor driven by the LLM gateway.
pub struct GenericLlmExtractor<'a> {
    gateway: &'a dyn LlmGateway,
    model: String,
}

impl<'a> GenericLlmExtractor<'a> {
    #[must_use]
    pub fn new(gateway: &'a dyn LlmGateway, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
        }
    }

    /// Extract cables from a scraped page snapshot.
    ///
    /// # Errors
    ///
    /// `ExtractionError::SchemaViolation` when the model output does not
    /// deserialize, `ExtractionError::MissingCriticalEvidence` when the
    /// payload lacks evidence for a critical field path, and
    /// `ExtractionError::NoCables` when the page yields nothing.
    pub async fn extract(
        &self,
        scraped: &ScrapedPage,
        canonical_url: &str,
        content_hash: &str,
    ) -> Result<Vec<ParsedCable>> {
        let prompt = build_prompt(scraped, canonical_url, content_hash);
        let request = ObjectRequest::deterministic(
            &self.model,
            SYSTEM_PROMPT,
            prompt,
            "cable_extraction",
            extraction_schema(),
        );

        let value = self.gateway.generate_object(&request).await?;
        let payload: ExtractionPayload = serde_json::from_value(value)
            .map_err(|e| ExtractionError::SchemaViolation(e.to_string()))?;

        if payload.cables.is_empty() {
            return Err(ExtractionError::NoCables {
                url: scraped.url.clone(),
            }
            .into());
        }

        let mut cables = Vec::with_capacity(payload.cables.len());
        for cable in payload.cables {
            cables.push(convert_cable(cable, canonical_url)?);
        }

        debug!(url = %scraped.url, cables = cables.len(), "generic extraction succeeded");
        Ok(cables)
    }
}

fn build_prompt(scraped: &ScrapedPage, canonical_url: &str, content_hash: &str) -> String {
    let markdown = truncate_chars(&scraped.markdown, MAX_MARKDOWN_CHARS);
    format!(
        "Source URL: {}\nCanonical URL: {}\nContent hash: {}\n\n--- PAGE MARKDOWN ---\n{}\n\n--- PAGE HTML ---\n{}",
        scraped.url, canonical_url, content_hash, markdown, scraped.html
    )
}

fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &s[..byte_index],
        None => s,
    }
}

/// The strict extraction schema: the evidence array must include the four
/// critical field paths, which the converter re-verifies after parsing.
fn extraction_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["cables"],
        "properties": {
            "cables": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["brand", "model", "connectorPair", "evidence"],
                    "properties": {
                        "brand": {"type": "string"},
                        "model": {"type": "string"},
                        "variant": {"type": ["string", "null"]},
                        "sku": {"type": ["string", "null"]},
                        "connectorPair": {
                            "type": "object",
                            "required": ["from", "to"],
                            "properties": {
                                "from": {"type": "string"},
                                "to": {"type": "string"}
                            }
                        },
                        "productUrl": {"type": ["string", "null"]},
                        "imageUrls": {"type": "array", "items": {"type": "string"}},
                        "power": {
                            "type": "object",
                            "properties": {
                                "maxWatts": {"type": ["number", "null"]},
                                "pdSupported": {"type": ["boolean", "null"]},
                                "eprSupported": {"type": ["boolean", "null"]}
                            }
                        },
                        "data": {
                            "type": "object",
                            "properties": {
                                "usbGeneration": {"type": ["string", "null"]},
                                "maxGbps": {"type": ["number", "null"]}
                            }
                        },
                        "video": {
                            "type": "object",
                            "properties": {
                                "explicitlySupported": {"type": ["boolean", "null"]},
                                "maxResolution": {"type": ["string", "null"]},
                                "maxRefreshHz": {"type": ["number", "null"]}
                            }
                        },
                        "evidence": {
                            "type": "array",
                            "minItems": 4,
                            "items": {
                                "type": "object",
                                "required": ["fieldPath"],
                                "properties": {
                                    "fieldPath": {"type": "string"},
                                    "snippet": {"type": ["string", "null"]}
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[derive(Deserialize)]
struct ExtractionPayload {
    cables: Vec<LlmCable>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmCable {
    brand: String,
    model: String,
    #[serde(default)]
    variant: Option<String>,
    #[serde(default)]
    sku: Option<String>,
    connector_pair: LlmConnectorPair,
    #[serde(default)]
    product_url: Option<String>,
    #[serde(default)]
    image_urls: Vec<String>,
    #[serde(default)]
    power: LlmPower,
    #[serde(default)]
    data: LlmData,
    #[serde(default)]
    video: LlmVideo,
    evidence: Vec<LlmEvidence>,
}

#[derive(Deserialize)]
struct LlmConnectorPair {
    from: String,
    to: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LlmPower {
    max_watts: Option<f64>,
    pd_supported: Option<bool>,
    epr_supported: Option<bool>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LlmData {
    usb_generation: Option<String>,
    max_gbps: Option<f64>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct LlmVideo {
    explicitly_supported: Option<bool>,
    max_resolution: Option<String>,
    max_refresh_hz: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmEvidence {
    field_path: String,
    #[serde(default)]
    snippet: Option<String>,
}

fn convert_cable(cable: LlmCable, canonical_url: &str) -> Result<ParsedCable> {
    let missing: Vec<String> = field_paths::CRITICAL
        .iter()
        .filter(|critical| !cable.evidence.iter().any(|e| e.field_path == **critical))
        .map(ToString::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ExtractionError::MissingCriticalEvidence(missing).into());
    }

    let connector_from = normalize_connector(&cable.connector_pair.from);
    let connector_to = normalize_connector(&cable.connector_pair.to);

    let mut data = DataSpec {
        usb_generation: cable.data.usb_generation,
        max_gbps: cable.data.max_gbps,
    };
    clamp_data_capability_by_connector(connector_from, connector_to, &mut data);

    Ok(ParsedCable {
        brand: cable.brand,
        model: cable.model,
        variant: cable.variant,
        sku: cable.sku,
        connector_from,
        connector_to,
        product_url: cable
            .product_url
            .filter(|u| !u.trim().is_empty())
            .or_else(|| Some(canonical_url.to_string())),
        image_urls: cable.image_urls,
        power: PowerSpec {
            max_watts: cable.power.max_watts,
            pd_supported: cable.power.pd_supported,
            epr_supported: cable.power.epr_supported,
        },
        data,
        video: VideoSpec {
            explicitly_supported: cable.video.explicitly_supported,
            max_resolution: cable.video.max_resolution,
            max_refresh_hz: cable.video.max_refresh_hz,
        },
        evidence: cable
            .evidence
            .into_iter()
            .map(|e| ParsedEvidence {
                field_path: e.field_path,
                snippet: e.snippet,
            })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabledex_core::CabledexError;
    use cabledex_llm::testing::StaticGateway;

    fn scraped() -> ScrapedPage {
        ScrapedPage {
            url: "https://boutique.example.com/cable".to_string(),
            source_url: Some("https://boutique.example.com/cable".to_string()),
            markdown: "# Boutique Cable\nUSB-C to Lightning, 30W, MFi".to_string(),
            html: "<h1>Boutique Cable</h1>".to_string(),
            og_image: None,
        }
    }

    fn llm_payload() -> Value {
        json!({
            "cables": [{
                "brand": "Boutique",
                "model": "Boutique MFi Cable",
                "variant": "1m",
                "sku": "BTQ-01",
                "connectorPair": {"from": "USB-C", "to": "lightening"},
                "imageUrls": ["https://cdn.example.com/cable.jpg"],
                "power": {"maxWatts": 30, "pdSupported": true},
                "data": {"usbGeneration": "USB 2.0", "maxGbps": 0.48},
                "video": {},
                "evidence": [
                    {"fieldPath": "brand", "snippet": "Boutique"},
                    {"fieldPath": "model", "snippet": "Boutique MFi Cable"},
                    {"fieldPath": "connectorPair.from", "snippet": "USB-C to Lightning"},
                    {"fieldPath": "connectorPair.to", "snippet": "USB-C to Lightning"},
                    {"fieldPath": "power.maxWatts", "snippet": "30W"}
                ]
            }]
        })
    }

    #[tokio::test]
    async fn extraction_converts_and_normalizes_connectors() {
        let gateway = StaticGateway::answering(llm_payload());
        let extractor = GenericLlmExtractor::new(&gateway, "anthropic/claude-sonnet-4");

        let cables = extractor
            .extract(&scraped(), "https://boutique.example.com/cable", "hash123")
            .await
            .unwrap();

        assert_eq!(cables.len(), 1);
        assert_eq!(cables[0].connector_from, Connector::UsbC);
        // "lightening" misspelling normalizes.
        assert_eq!(cables[0].connector_to, Connector::Lightning);
        assert_eq!(cables[0].power.max_watts, Some(30.0));
        assert_eq!(cables[0].data.max_gbps, Some(0.48));
    }

    #[tokio::test]
    async fn lightning_claims_are_clamped_even_from_the_llm() {
        let mut payload = llm_payload();
        payload["cables"][0]["data"] = json!({"usbGeneration": "Thunderbolt 3", "maxGbps": 40});
        let gateway = StaticGateway::answering(payload);
        let extractor = GenericLlmExtractor::new(&gateway, "anthropic/claude-sonnet-4");

        let cables = extractor
            .extract(&scraped(), "https://boutique.example.com/cable", "hash123")
            .await
            .unwrap();

        assert_eq!(cables[0].data.max_gbps, Some(0.48));
        assert!(cables[0].data.usb_generation.as_deref().unwrap().contains("USB 2.0"));
    }

    #[tokio::test]
    async fn missing_critical_evidence_rejects_the_payload() {
        let mut payload = llm_payload();
        payload["cables"][0]["evidence"] = json!([
            {"fieldPath": "brand", "snippet": "Boutique"},
            {"fieldPath": "model", "snippet": "Boutique MFi Cable"}
        ]);
        let gateway = StaticGateway::answering(payload);
        let extractor = GenericLlmExtractor::new(&gateway, "anthropic/claude-sonnet-4");

        let err = extractor
            .extract(&scraped(), "https://boutique.example.com/cable", "hash123")
            .await
            .unwrap_err();

        match err {
            CabledexError::Extraction(ExtractionError::MissingCriticalEvidence(paths)) => {
                assert!(paths.contains(&"connectorPair.from".to_string()));
                assert!(paths.contains(&"connectorPair.to".to_string()));
            }
            other => panic!("expected MissingCriticalEvidence, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_cable_list_is_an_error() {
        let gateway = StaticGateway::answering(json!({"cables": []}));
        let extractor = GenericLlmExtractor::new(&gateway, "anthropic/claude-sonnet-4");

        let err = extractor
            .extract(&scraped(), "https://boutique.example.com/cable", "hash123")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CabledexError::Extraction(ExtractionError::NoCables { .. })
        ));
    }

    #[tokio::test]
    async fn prompt_carries_source_identity_and_truncated_markdown() {
        let gateway = StaticGateway::answering(llm_payload());
        let extractor = GenericLlmExtractor::new(&gateway, "anthropic/claude-sonnet-4");

        let mut page = scraped();
        page.markdown = "x".repeat(MAX_MARKDOWN_CHARS + 500);
        extractor
            .extract(&page, "https://boutique.example.com/cable", "hash123")
            .await
            .unwrap();

        let requests = gateway.requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].prompt;
        assert!(prompt.contains("Canonical URL: https://boutique.example.com/cable"));
        assert!(prompt.contains("Content hash: hash123"));
        assert!(prompt.len() < MAX_MARKDOWN_CHARS + 1000);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld";
        assert_eq!(truncate_chars(s, 4), "héll");
        assert_eq!(truncate_chars(s, 100), s);
    }
}
