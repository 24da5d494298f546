//! Configuration management for the gateway
//!
//! Parses TOML configuration files, applies environment overrides and
//! provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::router::KbFallback;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Environment variable naming the deployment region
pub const ENV_REGION: &str = "AWS_REGION";
/// Environment variable naming the default knowledge base
pub const ENV_KNOWLEDGE_BASE_ID: &str = "KNOWLEDGE_BASE_ID";
/// Environment variable carrying the Bedrock API key
pub const ENV_API_KEY: &str = "AWS_BEARER_TOKEN_BEDROCK";

/// Upper bound for the outbound call deadline
const MAX_REQUEST_TIMEOUT_SECONDS: u64 = 900;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bedrock: BedrockConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for the single outbound Bedrock call
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    120
}

/// Bedrock connection settings
///
/// Fields are private; values come from the config file or environment
/// overrides and are read through accessors.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BedrockConfig {
    #[serde(default = "default_region")]
    region: String,
    #[serde(default)]
    knowledge_base_id: Option<String>,
    /// Model used when a request omits `model`
    #[serde(default)]
    default_model_id: Option<String>,
    /// Generation model for knowledge base queries when the request has no `model_arn`
    #[serde(default)]
    default_model_arn: Option<String>,
    #[serde(default)]
    runtime_endpoint: Option<String>,
    #[serde(default)]
    agent_runtime_endpoint: Option<String>,
    #[serde(default, skip_serializing)]
    api_key: Option<String>,
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            knowledge_base_id: None,
            default_model_id: None,
            default_model_arn: None,
            runtime_endpoint: None,
            agent_runtime_endpoint: None,
            api_key: None,
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Treat empty strings as unset
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl BedrockConfig {
    /// Get the deployment region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Get the default knowledge base id, if one is configured
    pub fn knowledge_base_id(&self) -> Option<&str> {
        non_empty(&self.knowledge_base_id)
    }

    /// Get the fallback model id
    pub fn default_model_id(&self) -> Option<&str> {
        non_empty(&self.default_model_id)
    }

    /// Get the fallback generation model ARN for knowledge base queries
    pub fn default_model_arn(&self) -> Option<&str> {
        non_empty(&self.default_model_arn)
    }

    /// Bedrock API key sent as bearer token; unset means SigV4 signing
    pub fn api_key(&self) -> Option<&str> {
        non_empty(&self.api_key)
    }

    /// Base URL of the bedrock-runtime service
    pub fn runtime_endpoint(&self) -> String {
        non_empty(&self.runtime_endpoint)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", self.region))
    }

    /// Base URL of the bedrock-agent-runtime service
    pub fn agent_runtime_endpoint(&self) -> String {
        non_empty(&self.agent_runtime_endpoint)
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or_else(|| {
                format!(
                    "https://bedrock-agent-runtime.{}.amazonaws.com",
                    self.region
                )
            })
    }
}

/// Routing configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// What `/kb/completions` does when no knowledge base id is available
    #[serde(default)]
    pub kb_fallback: KbFallback,
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides are applied after parsing and before validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content = std::fs::read_to_string(path.as_ref()).map_err(|source| {
            AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            }
        })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let mut config: Self =
            toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
                path: path_display.clone(),
                source,
            })?;

        config.apply_env_overrides(|key| std::env::var(key).ok());

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Build configuration from defaults and environment variables only
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply environment-level overrides
    ///
    /// `lookup` resolves a variable name; empty values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(region) = lookup(ENV_REGION) {
            tracing::debug!(region = %region, "Region overridden from environment");
            self.bedrock.region = region;
        }
        if let Some(kb_id) = lookup(ENV_KNOWLEDGE_BASE_ID) {
            tracing::debug!(knowledge_base_id = %kb_id, "Knowledge base overridden from environment");
            self.bedrock.knowledge_base_id = Some(kb_id);
        }
        if let Some(key) = lookup(ENV_API_KEY) {
            self.bedrock.api_key = Some(key);
        }
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than 0".to_string(),
            ));
        }
        if self.server.request_timeout_seconds > MAX_REQUEST_TIMEOUT_SECONDS {
            return Err(AppError::Config(format!(
                "request_timeout_seconds cannot exceed {} seconds, got {}",
                MAX_REQUEST_TIMEOUT_SECONDS, self.server.request_timeout_seconds
            )));
        }

        if self.bedrock.region.trim().is_empty() {
            return Err(AppError::Config("bedrock.region cannot be empty".to_string()));
        }

        for (name, endpoint) in [
            ("runtime_endpoint", &self.bedrock.runtime_endpoint),
            ("agent_runtime_endpoint", &self.bedrock.agent_runtime_endpoint),
        ] {
            if let Some(url) = non_empty(endpoint)
                && !url.starts_with("http://")
                && !url.starts_with("https://")
            {
                return Err(AppError::Config(format!(
                    "bedrock.{} '{}' must start with 'http://' or 'https://'",
                    name, url
                )));
            }
        }

        let level = self.observability.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(AppError::Config(format!(
                "observability.log_level '{}' is not one of {:?}",
                self.observability.log_level, LOG_LEVELS
            )));
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_CONFIG: &str = r#"
[server]
host = "0.0.0.0"
port = 8080
request_timeout_seconds = 60

[bedrock]
region = "ap-northeast-1"
knowledge_base_id = "KB12345678"
default_model_id = "anthropic.claude-3-haiku-20240307-v1:0"

[routing]
kb_fallback = "reject"

[observability]
log_level = "debug"
"#;

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.request_timeout_seconds, 60);
        assert_eq!(config.bedrock.region(), "ap-northeast-1");
        assert_eq!(config.bedrock.knowledge_base_id(), Some("KB12345678"));
        assert_eq!(config.routing.kb_fallback, KbFallback::Reject);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").expect("empty config should parse");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.bedrock.region(), "us-east-1");
        assert_eq!(config.bedrock.knowledge_base_id(), None);
        assert_eq!(config.routing.kb_fallback, KbFallback::Chat);
    }

    #[test]
    fn test_default_endpoints_follow_region() {
        let config = Config::from_str("[bedrock]\nregion = \"eu-west-1\"").unwrap();
        assert_eq!(
            config.bedrock.runtime_endpoint(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );
        assert_eq!(
            config.bedrock.agent_runtime_endpoint(),
            "https://bedrock-agent-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_explicit_endpoint_trailing_slash_trimmed() {
        let config =
            Config::from_str("[bedrock]\nruntime_endpoint = \"http://localhost:9000/\"").unwrap();
        assert_eq!(config.bedrock.runtime_endpoint(), "http://localhost:9000");
    }

    #[test]
    fn test_empty_knowledge_base_id_is_unset() {
        let config = Config::from_str("[bedrock]\nknowledge_base_id = \"\"").unwrap();
        assert_eq!(config.bedrock.knowledge_base_id(), None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = Config::from_str("[server]\nrequest_timeout_seconds = 0");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_excessive_timeout_rejected() {
        let result = Config::from_str("[server]\nrequest_timeout_seconds = 901");
        let err = result.expect_err("timeout above limit should fail");
        assert!(err.to_string().contains("cannot exceed"));
    }

    #[test]
    fn test_endpoint_without_scheme_rejected() {
        let result = Config::from_str("[bedrock]\nruntime_endpoint = \"localhost:9000\"");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let result = Config::from_str("[observability]\nlog_level = \"verbose\"");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_kb_fallback_rejected_at_parse() {
        let result = Config::from_str("[routing]\nkb_fallback = \"maybe\"");
        assert!(matches!(result, Err(AppError::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_env_overrides_replace_file_values() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_REGION, "us-west-2"),
            (ENV_KNOWLEDGE_BASE_ID, "KBFROMENV"),
            (ENV_API_KEY, "secret"),
        ]
        .into_iter()
        .collect();

        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.bedrock.region(), "us-west-2");
        assert_eq!(config.bedrock.knowledge_base_id(), Some("KBFROMENV"));
        assert_eq!(config.bedrock.api_key(), Some("secret"));
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let mut config = Config::from_str(TEST_CONFIG).unwrap();
        config.apply_env_overrides(|_| Some(String::new()));
        assert_eq!(config.bedrock.region(), "ap-northeast-1");
        assert_eq!(config.bedrock.knowledge_base_id(), Some("KB12345678"));
    }

    #[test]
    fn test_api_key_not_serialized() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| (key == ENV_API_KEY).then(|| "secret".to_string()));
        let rendered = toml::to_string(&config).expect("config should serialize");
        assert!(!rendered.contains("secret"));
    }
}
