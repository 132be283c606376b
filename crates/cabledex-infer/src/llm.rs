//! The bounded LLM pass and its tolerant result parser.

use cabledex_core::{
    CabledexError, CableDraft, Connector, ExtractionError, Result, TimeoutError,
    UncertaintyCategory,
};
use cabledex_llm::{LlmGateway, ObjectRequest};
use cabledex_normalize::normalize_connector;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Hard ceiling on the LLM pass; an elapsed timer fails the submission.
pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(8);

const SYSTEM_PROMPT: &str = "You infer USB/Thunderbolt/Lightning cable capabilities from a \
user's physical description. Fill only fields the description supports; list the categories \
you are unsure about in `uncertainties`. Categories: connector, power, data, video.";

/// Parsed (and coerced) LLM inference result.
#[derive(Debug, Clone, Default)]
pub struct LlmInference {
    /// Clamped to `[0, 1]`.
    pub confidence: f64,
    pub draft_patch: CableDraft,
    pub uncertainties: Vec<UncertaintyCategory>,
    pub notes: Option<String>,
}

fn inference_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["confidence", "draftPatch", "uncertainties"],
        "properties": {
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
            "draftPatch": {
                "type": "object",
                "properties": {
                    "connectorFrom": {"type": ["string", "null"]},
                    "connectorTo": {"type": ["string", "null"]},
                    "watts": {"type": ["string", "number", "null"]},
                    "usbGeneration": {"type": ["string", "null"]},
                    "gbps": {"type": ["string", "number", "null"]},
                    "videoSupport": {"type": ["string", "null"]},
                    "maxResolution": {"type": ["string", "null"]},
                    "maxRefreshHz": {"type": ["string", "number", "null"]},
                    "dataOnly": {"type": ["boolean", "null"]}
                }
            },
            "uncertainties": {"type": "array", "items": {"type": "string"}},
            "notes": {"type": ["string", "null"]}
        }
    })
}

/// Run the LLM pass with the 8 s bound.
///
/// # Errors
///
/// `TimeoutError` when the bound elapses (the session transitions to
/// `failed`; no automatic retry). Gateway and schema errors pass through.
pub async fn run_llm_pass(
    gateway: &dyn LlmGateway,
    model: &str,
    prompt: &str,
) -> Result<LlmInference> {
    let request = ObjectRequest::deterministic(
        model,
        SYSTEM_PROMPT,
        prompt,
        "cable_inference",
        inference_schema(),
    )
    .with_timeout(INFERENCE_TIMEOUT);

    let value = tokio::time::timeout(INFERENCE_TIMEOUT, gateway.generate_object(&request))
        .await
        .map_err(|_| {
            CabledexError::Timeout(TimeoutError {
                operation: "manual inference",
                limit: INFERENCE_TIMEOUT,
            })
        })??;

    let inference = coerce_inference(&value)?;
    debug!(
        confidence = inference.confidence,
        uncertainties = inference.uncertainties.len(),
        "LLM inference pass completed"
    );
    Ok(inference)
}

/// Coerce a gateway value into an [`LlmInference`].
///
/// Tolerates stringified numbers, misspelled connector tokens and unknown
/// uncertainty categories (mapped into the known set where possible,
/// dropped otherwise).
///
/// # Errors
///
/// `ExtractionError::SchemaViolation` when the value is not an object or
/// has no usable confidence.
pub fn coerce_inference(value: &Value) -> Result<LlmInference> {
    let obj = value.as_object().ok_or_else(|| {
        ExtractionError::SchemaViolation("inference result is not an object".to_string())
    })?;

    let confidence = obj
        .get("confidence")
        .and_then(coerce_number)
        .ok_or_else(|| {
            ExtractionError::SchemaViolation("inference result has no confidence".to_string())
        })?
        .clamp(0.0, 1.0);

    let patch_value = obj.get("draftPatch").or_else(|| obj.get("draft_patch"));
    let draft_patch = patch_value.map(coerce_draft_patch).unwrap_or_default();

    let uncertainties = obj
        .get("uncertainties")
        .and_then(Value::as_array)
        .map(|items| {
            let mut out = Vec::new();
            for item in items.iter().filter_map(Value::as_str) {
                if let Some(category) = coerce_category(item)
                    && !out.contains(&category)
                {
                    out.push(category);
                }
            }
            out
        })
        .unwrap_or_default();

    let notes = obj
        .get("notes")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string);

    Ok(LlmInference {
        confidence,
        draft_patch,
        uncertainties,
        notes,
    })
}

fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_number_string(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

fn coerce_connector(value: &Value) -> Option<Connector> {
    let raw = value.as_str()?;
    let connector = normalize_connector(raw);
    (connector != Connector::Unknown).then_some(connector)
}

fn coerce_draft_patch(value: &Value) -> CableDraft {
    let get = |keys: &[&str]| -> Option<&Value> {
        keys.iter()
            .find_map(|k| value.get(*k))
            .filter(|v| !v.is_null())
    };

    CableDraft {
        connector_from: get(&["connectorFrom", "connector_from"]).and_then(coerce_connector),
        connector_to: get(&["connectorTo", "connector_to"]).and_then(coerce_connector),
        watts: get(&["watts"]).and_then(coerce_number_string),
        usb_generation: get(&["usbGeneration", "usb_generation"])
            .and_then(Value::as_str)
            .map(ToString::to_string),
        gbps: get(&["gbps"]).and_then(coerce_number_string),
        video_support: get(&["videoSupport", "video_support"])
            .and_then(Value::as_str)
            .map(|s| s.trim().to_lowercase()),
        max_resolution: get(&["maxResolution", "max_resolution"])
            .and_then(Value::as_str)
            .map(ToString::to_string),
        max_refresh_hz: get(&["maxRefreshHz", "max_refresh_hz"]).and_then(coerce_number_string),
        data_only: get(&["dataOnly", "data_only"]).and_then(Value::as_bool),
    }
}

/// Map a free-form category string into the known set.
fn coerce_category(raw: &str) -> Option<UncertaintyCategory> {
    let lower = raw.trim().to_lowercase();
    if lower.contains("conn") || lower.contains("plug") || lower.contains("port") {
        Some(UncertaintyCategory::Connector)
    } else if lower.contains("pow") || lower.contains("watt") || lower.contains("charg") {
        Some(UncertaintyCategory::Power)
    } else if lower.contains("data") || lower.contains("speed") || lower.contains("transfer") {
        Some(UncertaintyCategory::Data)
    } else if lower.contains("video") || lower.contains("display") || lower.contains("screen") {
        Some(UncertaintyCategory::Video)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cabledex_llm::testing::{ScriptedReply, StaticGateway};

    #[test]
    fn coercion_accepts_the_happy_path() {
        let inference = coerce_inference(&json!({
            "confidence": 0.82,
            "draftPatch": {"connectorFrom": "USB-C", "watts": "100", "dataOnly": false},
            "uncertainties": ["video"],
            "notes": "braided cable suggests recent model"
        }))
        .unwrap();

        assert!((inference.confidence - 0.82).abs() < 1e-9);
        assert_eq!(inference.draft_patch.connector_from, Some(Connector::UsbC));
        assert_eq!(inference.draft_patch.watts.as_deref(), Some("100"));
        assert_eq!(inference.uncertainties, vec![UncertaintyCategory::Video]);
        assert!(inference.notes.is_some());
    }

    #[test]
    fn coercion_tolerates_sloppy_output() {
        let inference = coerce_inference(&json!({
            "confidence": "0.6",
            "draftPatch": {
                "connectorTo": "lightening",
                "watts": 60,
                "gbps": 0.48,
                "maxRefreshHz": "60"
            },
            "uncertainties": ["connector type", "charging speed", "warp drive"],
        }))
        .unwrap();

        assert!((inference.confidence - 0.6).abs() < 1e-9);
        assert_eq!(
            inference.draft_patch.connector_to,
            Some(Connector::Lightning)
        );
        assert_eq!(inference.draft_patch.watts.as_deref(), Some("60"));
        assert_eq!(inference.draft_patch.gbps.as_deref(), Some("0.48"));
        // "warp drive" is dropped; the other two map into the known set.
        assert_eq!(
            inference.uncertainties,
            vec![UncertaintyCategory::Connector, UncertaintyCategory::Power]
        );
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let inference = coerce_inference(&json!({
            "confidence": 1.7,
            "draftPatch": {},
            "uncertainties": [],
        }))
        .unwrap();
        assert!((inference.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unusable_payloads_are_schema_violations() {
        assert!(coerce_inference(&json!("just a string")).is_err());
        assert!(coerce_inference(&json!({"draftPatch": {}})).is_err());
    }

    #[test]
    fn unknown_connector_strings_are_ignored_not_errors() {
        let inference = coerce_inference(&json!({
            "confidence": 0.5,
            "draftPatch": {"connectorFrom": "RJ45"},
            "uncertainties": [],
        }))
        .unwrap();
        assert_eq!(inference.draft_patch.connector_from, None);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_gateway_times_out_as_timeout_error() {
        let gateway = StaticGateway::new().with_scripted(ScriptedReply::Hang);
        let err = run_llm_pass(&gateway, "anthropic/claude-3-5-haiku", "usb-c cable")
            .await
            .unwrap_err();
        assert!(matches!(err, CabledexError::Timeout(_)));
    }

    #[tokio::test]
    async fn gateway_reply_round_trips() {
        let gateway = StaticGateway::answering(json!({
            "confidence": 0.75,
            "draftPatch": {"videoSupport": "yes"},
            "uncertainties": [],
        }));
        let inference = run_llm_pass(&gateway, "anthropic/claude-3-5-haiku", "usb-c 4k cable")
            .await
            .unwrap();
        assert_eq!(inference.draft_patch.video_support.as_deref(), Some("yes"));

        let requests = gateway.requests();
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].max_retries, 1);
        assert_eq!(requests[0].timeout, INFERENCE_TIMEOUT);
    }
}
