//! Environment configuration for cabledex.
//!
//! All runtime configuration arrives through environment variables; there is
//! no config file. Keys are read once into [`EnvConfig`] and validated up
//! front — an invalid telemetry boolean is fatal immediately, while the two
//! API keys are only required on entry to the actions that need them
//! (`require_*` accessors raise `Missing required environment variable:
//! <NAME>` at that point).

use cabledex_core::ConfigError;
use serde::Serialize;
use std::env;

/// Environment variable holding the LLM gateway API key.
pub const AI_GATEWAY_API_KEY: &str = "AI_GATEWAY_API_KEY";
/// Environment variable holding the Firecrawl API key.
pub const FIRECRAWL_API_KEY: &str = "FIRECRAWL_API_KEY";
/// Optional override for the manual inference model id.
pub const MANUAL_INFERENCE_MODEL: &str = "MANUAL_INFERENCE_MODEL";

const TELEMETRY_ENABLED: &str = "AI_SDK_TELEMETRY_ENABLED";
const TELEMETRY_RECORD_INPUTS: &str = "AI_SDK_TELEMETRY_RECORD_INPUTS";
const TELEMETRY_RECORD_OUTPUTS: &str = "AI_SDK_TELEMETRY_RECORD_OUTPUTS";

/// Model used for manual inference when no override is configured.
pub const DEFAULT_MANUAL_INFERENCE_MODEL: &str = "anthropic/claude-3-5-haiku";

/// Model used by the generic LLM extractor.
pub const DEFAULT_EXTRACTION_MODEL: &str = "anthropic/claude-sonnet-4";

/// Telemetry switches for the LLM gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryConfig {
    pub enabled: bool,
    pub record_inputs: bool,
    pub record_outputs: bool,
}

/// Snapshot of all environment configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    ai_gateway_api_key: Option<String>,
    firecrawl_api_key: Option<String>,
    pub telemetry: TelemetryConfig,
    pub manual_inference_model: String,
}

impl EnvConfig {
    /// Read configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBool` for a telemetry variable set to
    /// anything other than `true/false/1/0/yes/no` (case-insensitive).
    /// Missing API keys are not an error here; see [`Self::require_ai_gateway_key`]
    /// and [`Self::require_firecrawl_key`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            ai_gateway_api_key: non_empty_var(AI_GATEWAY_API_KEY),
            firecrawl_api_key: non_empty_var(FIRECRAWL_API_KEY),
            telemetry: TelemetryConfig {
                enabled: bool_var(TELEMETRY_ENABLED, false)?,
                record_inputs: bool_var(TELEMETRY_RECORD_INPUTS, false)?,
                record_outputs: bool_var(TELEMETRY_RECORD_OUTPUTS, false)?,
            },
            manual_inference_model: non_empty_var(MANUAL_INFERENCE_MODEL)
                .unwrap_or_else(|| DEFAULT_MANUAL_INFERENCE_MODEL.to_string()),
        })
    }

    /// The LLM gateway key, required for any LLM-backed path.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingEnv` when `AI_GATEWAY_API_KEY` is unset.
    pub fn require_ai_gateway_key(&self) -> Result<&str, ConfigError> {
        self.ai_gateway_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnv {
                name: AI_GATEWAY_API_KEY.to_string(),
            })
    }

    /// The Firecrawl key, required for the generic scrape path.
    ///
    /// # Errors
    ///
    /// `ConfigError::MissingEnv` when `FIRECRAWL_API_KEY` is unset.
    pub fn require_firecrawl_key(&self) -> Result<&str, ConfigError> {
        self.firecrawl_api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingEnv {
                name: FIRECRAWL_API_KEY.to_string(),
            })
    }

    #[must_use]
    pub fn has_ai_gateway_key(&self) -> bool {
        self.ai_gateway_api_key.is_some()
    }

    #[must_use]
    pub fn has_firecrawl_key(&self) -> bool {
        self.firecrawl_api_key.is_some()
    }

    /// Construct a config without touching the environment (test seam).
    #[doc(hidden)]
    #[must_use]
    pub fn for_testing(ai_key: Option<&str>, firecrawl_key: Option<&str>) -> Self {
        Self {
            ai_gateway_api_key: ai_key.map(ToString::to_string),
            firecrawl_api_key: firecrawl_key.map(ToString::to_string),
            telemetry: TelemetryConfig::default(),
            manual_inference_model: DEFAULT_MANUAL_INFERENCE_MODEL.to_string(),
        }
    }
}

/// Parse a boolean flag value: `true/false/1/0/yes/no`, case-insensitive.
///
/// # Errors
///
/// Any other value is a `ConfigError::InvalidBool` — fatal rather than
/// silently defaulted, so a typo in a telemetry switch cannot go unnoticed.
pub fn parse_bool_flag(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn bool_var(name: &str, default: bool) -> Result<bool, ConfigError> {
    match non_empty_var(name) {
        Some(value) => parse_bool_flag(name, &value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex, OnceLock};

    // Single global lock for tests that touch environment variables, so
    // env-mutating tests never run concurrently with each other.
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_guard() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
    }

    #[test]
    fn bool_flag_accepts_the_documented_spellings() {
        for v in ["true", "TRUE", "1", "yes", "Yes"] {
            assert!(parse_bool_flag("X", v).unwrap());
        }
        for v in ["false", "0", "no", "NO"] {
            assert!(!parse_bool_flag("X", v).unwrap());
        }
    }

    #[test]
    fn bool_flag_rejects_anything_else() {
        let err = parse_bool_flag("AI_SDK_TELEMETRY_ENABLED", "enabled").unwrap_err();
        match err {
            ConfigError::InvalidBool { name, value } => {
                assert_eq!(name, "AI_SDK_TELEMETRY_ENABLED");
                assert_eq!(value, "enabled");
            }
            other => panic!("expected InvalidBool, got {other:?}"),
        }
    }

    #[test]
    fn missing_keys_surface_on_require_not_on_load() {
        let _guard = env_guard();
        // SAFETY: guarded by ENV_LOCK; variables are restored below.
        unsafe {
            env::remove_var(AI_GATEWAY_API_KEY);
            env::remove_var(FIRECRAWL_API_KEY);
            env::remove_var(TELEMETRY_ENABLED);
            env::remove_var(TELEMETRY_RECORD_INPUTS);
            env::remove_var(TELEMETRY_RECORD_OUTPUTS);
            env::remove_var(MANUAL_INFERENCE_MODEL);
        }

        let config = EnvConfig::from_env().unwrap();
        assert!(!config.has_ai_gateway_key());

        let err = config.require_ai_gateway_key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: AI_GATEWAY_API_KEY"
        );
        let err = config.require_firecrawl_key().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Missing required environment variable: FIRECRAWL_API_KEY"
        );
    }

    #[test]
    fn telemetry_and_model_override_are_read() {
        let _guard = env_guard();
        // SAFETY: guarded by ENV_LOCK; variables are removed below.
        unsafe {
            env::set_var(TELEMETRY_ENABLED, "yes");
            env::set_var(TELEMETRY_RECORD_INPUTS, "0");
            env::set_var(TELEMETRY_RECORD_OUTPUTS, "TRUE");
            env::set_var(MANUAL_INFERENCE_MODEL, "vendor/custom-model");
        }

        let config = EnvConfig::from_env().unwrap();
        assert!(config.telemetry.enabled);
        assert!(!config.telemetry.record_inputs);
        assert!(config.telemetry.record_outputs);
        assert_eq!(config.manual_inference_model, "vendor/custom-model");

        // SAFETY: guarded by ENV_LOCK.
        unsafe {
            env::remove_var(TELEMETRY_ENABLED);
            env::remove_var(TELEMETRY_RECORD_INPUTS);
            env::remove_var(TELEMETRY_RECORD_OUTPUTS);
            env::remove_var(MANUAL_INFERENCE_MODEL);
        }
    }

    #[test]
    fn invalid_telemetry_bool_is_fatal_on_load() {
        let _guard = env_guard();
        // SAFETY: guarded by ENV_LOCK; variable is removed below.
        unsafe {
            env::set_var(TELEMETRY_ENABLED, "maybe");
        }

        let result = EnvConfig::from_env();

        // SAFETY: guarded by ENV_LOCK.
        unsafe {
            env::remove_var(TELEMETRY_ENABLED);
        }

        assert!(matches!(result, Err(ConfigError::InvalidBool { .. })));
    }
}
