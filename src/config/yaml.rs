use serde::Deserialize;
use std::path::PathBuf;

use super::ConfigError;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present here
/// override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 5050
///   public_host: "relay.example.com"
///   webhook_url: "https://relay.example.com/incoming-call"
///
/// twilio:
///   auth_token: "your-auth-token"
///
/// openai:
///   api_key: "sk-..."
///   realtime_url: "wss://api.openai.com/v1/realtime"
///   model: "gpt-realtime"
///
/// assistant:
///   voice: "alloy"
///   temperature: 0.8
///   instructions: "You are a helpful phone assistant."
///   greeting: "Greet the user with 'Hey, what's up?'"
///   mcp:
///     server_url: "https://mcp.example.com/sse"
///     token: "mcp-secret"
///     label: "tasks"
///   tools:
///     - type: "function"
///       name: "lookup_order"
///
/// security:
///   rate_limit_requests_per_second: 60
///   rate_limit_burst_size: 10
///   trust_proxy_headers: false
///   max_concurrent_calls: 50
///
/// tokens:
///   sweep_interval_seconds: 30
///
/// logging:
///   show_timing_math: true
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub twilio: Option<TwilioYaml>,
    pub openai: Option<OpenAIYaml>,
    pub assistant: Option<AssistantYaml>,
    pub security: Option<SecurityYaml>,
    pub tokens: Option<TokensYaml>,
    pub logging: Option<LoggingYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub public_host: Option<String>,
    pub webhook_url: Option<String>,
}

/// Telephony provider credentials from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TwilioYaml {
    pub auth_token: Option<String>,
}

/// OpenAI Realtime connection settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OpenAIYaml {
    pub api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub model: Option<String>,
}

/// Assistant behavior from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssistantYaml {
    pub voice: Option<String>,
    pub temperature: Option<f32>,
    pub instructions: Option<String>,
    /// Empty string disables the greeting
    pub greeting: Option<String>,
    pub mcp: Option<McpYaml>,
    /// Tool definitions passed through to the AI session untouched
    #[serde(default)]
    pub tools: Vec<serde_json::Value>,
}

/// MCP tool server from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct McpYaml {
    pub server_url: Option<String>,
    pub token: Option<String>,
    pub label: Option<String>,
}

/// Security configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    /// Maximum requests per second per IP address
    pub rate_limit_requests_per_second: Option<u32>,
    /// Maximum burst size for rate limiting
    pub rate_limit_burst_size: Option<u32>,
    /// Key the rate limit on proxy headers instead of the peer address
    pub trust_proxy_headers: Option<bool>,
    /// Maximum concurrent relayed calls
    pub max_concurrent_calls: Option<usize>,
}

/// Access token housekeeping from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TokensYaml {
    pub sweep_interval_seconds: Option<u64>,
}

/// Logging toggles from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LoggingYaml {
    pub show_timing_math: Option<bool>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file cannot be read
    /// - The YAML is malformed
    /// - Required fields have invalid types
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }
}
