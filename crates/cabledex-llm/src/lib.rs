//! LLM gateway abstraction for cabledex.
//!
//! A single trait, [`LlmGateway`], exposes `generate_object`: invoke a model
//! with a system prompt, a user prompt, and a strict JSON schema, and get
//! back a schema-shaped `serde_json::Value` or an error. The production
//! implementation, [`AiGatewayClient`], speaks the OpenAI-compatible
//! chat-completions dialect of the AI gateway with a `json_schema` response
//! format; callers deserialize the value into their own typed payloads.
//!
//! Schema violations are retried up to `max_retries` — model
//! non-determinism means a second attempt can recover where the first
//! produced malformed output.

mod gateway;

// Test double; not part of the public API stability guarantees.
#[doc(hidden)]
pub mod testing;

pub use gateway::AiGatewayClient;

use async_trait::async_trait;
use cabledex_core::Result;
use serde_json::Value;
use std::time::Duration;

/// One structured-output request.
#[derive(Debug, Clone)]
pub struct ObjectRequest {
    /// Gateway model id, e.g. `anthropic/claude-3-5-haiku`.
    pub model: String,
    pub system: String,
    pub prompt: String,
    /// JSON schema the response must satisfy.
    pub schema: Value,
    /// Name attached to the schema in the response-format block.
    pub schema_name: String,
    pub temperature: f32,
    /// Re-invocations allowed after a schema violation.
    pub max_retries: u32,
    /// Per-invocation HTTP timeout.
    pub timeout: Duration,
}

impl ObjectRequest {
    /// A deterministic request (temperature 0, one retry) — the shape every
    /// cabledex call site uses.
    #[must_use]
    pub fn deterministic(
        model: impl Into<String>,
        system: impl Into<String>,
        prompt: impl Into<String>,
        schema_name: impl Into<String>,
        schema: Value,
    ) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            prompt: prompt.into(),
            schema,
            schema_name: schema_name.into(),
            temperature: 0.0,
            max_retries: 1,
            timeout: Duration::from_secs(60),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Gateway capable of schema-constrained object generation.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    /// Generate an object satisfying `request.schema`.
    ///
    /// # Errors
    ///
    /// `ExtractionError::SchemaViolation` when the model output cannot be
    /// parsed as JSON after retries, `ExtractionError::Gateway` for malformed
    /// gateway responses, `FetchError` for transport failures.
    async fn generate_object(&self, request: &ObjectRequest) -> Result<Value>;
}
