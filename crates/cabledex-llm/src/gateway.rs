//! HTTP client for the AI gateway's chat-completions dialect.

use crate::{LlmGateway, ObjectRequest};
use async_trait::async_trait;
use cabledex_config::TelemetryConfig;
use cabledex_core::{ExtractionError, Result};
use cabledex_fetch::HttpClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Default AI gateway base URL.
const DEFAULT_BASE_URL: &str = "https://ai-gateway.vercel.sh/v1";

/// Schema-constrained client for the AI gateway.
pub struct AiGatewayClient {
    http: HttpClient,
    api_key: String,
    base_url: String,
    telemetry: TelemetryConfig,
}

impl AiGatewayClient {
    /// Create a client against the production gateway.
    ///
    /// # Errors
    ///
    /// `FetchError::Transport` if the HTTP client cannot be constructed.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new()?,
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            telemetry: TelemetryConfig::default(),
        })
    }

    /// Point the client at a different base URL (tests, proxies).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach telemetry switches controlling what gets traced.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: TelemetryConfig) -> Self {
        self.telemetry = telemetry;
        self
    }

    async fn invoke_once(&self, request: &ObjectRequest) -> Result<Value> {
        let endpoint = format!("{}/chat/completions", self.base_url);

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.prompt,
                },
            ],
            temperature: request.temperature,
            response_format: ResponseFormat {
                format_type: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: &request.schema_name,
                    strict: true,
                    schema: &request.schema,
                },
            },
        };

        if self.telemetry.enabled && self.telemetry.record_inputs {
            debug!(model = %request.model, prompt = %request.prompt, "gateway request");
        }

        let builder = self
            .http
            .inner()
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&body);

        let response = self.http.execute_with_retry(builder, "ai-gateway").await?;
        let payload: ChatResponse = response.json().await.map_err(|e| {
            ExtractionError::Gateway(format!("failed to parse gateway response: {e}"))
        })?;

        let content = payload
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ExtractionError::Gateway("gateway response has no choices".to_string()))?;

        if self.telemetry.enabled && self.telemetry.record_outputs {
            debug!(model = %request.model, output = %content, "gateway response");
        }

        let value: Value = serde_json::from_str(&content).map_err(|e| {
            ExtractionError::SchemaViolation(format!("model output is not valid JSON: {e}"))
        })?;

        Ok(value)
    }
}

#[async_trait]
impl LlmGateway for AiGatewayClient {
    async fn generate_object(&self, request: &ObjectRequest) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.invoke_once(request).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < request.max_retries && is_schema_violation(&err) => {
                    attempt += 1;
                    debug!(
                        model = %request.model,
                        attempt,
                        "schema violation from model, re-invoking"
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn is_schema_violation(err: &cabledex_core::CabledexError) -> bool {
    matches!(
        err,
        cabledex_core::CabledexError::Extraction(ExtractionError::SchemaViolation(_))
    )
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    format_type: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    strict: bool,
    schema: &'a Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}
