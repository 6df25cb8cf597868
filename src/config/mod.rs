//! Configuration module for the phonebridge server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `env`: Environment variable loading
//! - `yaml`: YAML configuration file loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use phonebridge::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::realtime::RealtimeConfig;

mod env;
mod merge;
mod validation;
mod yaml;

pub use env::EnvConfig;
pub use yaml::YamlConfig;

/// Default listen port (matches the port the telephony webhook is usually pointed at)
pub const DEFAULT_PORT: u16 = 5050;

/// Default OpenAI Realtime model
pub const DEFAULT_REALTIME_MODEL: &str = "gpt-realtime";

/// Default sampling temperature for the assistant
pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Default prompt used to make the assistant speak first
pub const DEFAULT_GREETING: &str = "Greet the user with 'Hey, what's up?'";

/// Default label for the MCP tool server
pub const DEFAULT_MCP_SERVER_LABEL: &str = "zapier";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Server configuration
///
/// Contains everything needed to run the relay:
/// - Server settings (host, port, public host used in stream URLs)
/// - Telephony webhook authentication (auth token, optional fixed webhook URL)
/// - Conversational AI settings (API key, model, voice, instructions, tools)
/// - Security settings (rate limiting, concurrent call limit)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,
    /// Host name placed in the `wss://` media-stream URL. Falls back to the
    /// request's Host header when unset.
    pub public_host: Option<String>,
    /// Exact URL the telephony provider signs. When unset the URL is rebuilt
    /// from the forwarded proto and Host headers.
    pub webhook_url: Option<String>,

    // Telephony provider
    pub twilio_auth_token: String,

    // Conversational AI
    pub openai_api_key: String,
    pub realtime_url: String,
    pub realtime_model: String,
    pub temperature: f32,
    pub voice: String,
    pub instructions: String,
    /// Prompt sent after session setup so the assistant greets the caller.
    /// `None` disables the greeting.
    pub greeting: Option<String>,
    pub mcp_server_url: Option<String>,
    pub mcp_server_token: Option<String>,
    pub mcp_server_label: String,
    /// Extra tool definitions passed verbatim to the AI session (YAML only)
    pub assistant_tools: Vec<serde_json::Value>,

    // Access tokens
    /// How often expired media-stream tokens are purged
    pub token_sweep_interval_seconds: u64,

    // Rate limiting configuration
    /// Sustained webhook requests per second per client IP; one permit is
    /// replenished every `1s / rate` (see [`ServerConfig::rate_limit_period`])
    /// Default: 60
    pub rate_limit_requests_per_second: u32,
    /// Maximum burst size for rate limiting
    /// Default: 10
    pub rate_limit_burst_size: u32,
    /// Key the rate limit on `X-Forwarded-For`/`X-Real-IP` instead of the
    /// socket peer. Only safe behind a proxy that overwrites those headers.
    /// Default: false
    pub trust_proxy_headers: bool,

    // Connection limits
    /// Maximum concurrent relayed calls
    /// Default: None (unlimited)
    pub max_concurrent_calls: Option<usize>,

    /// Log the interruption timing arithmetic at debug level
    pub show_timing_math: bool,
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        self.twilio_auth_token.zeroize();
        self.openai_api_key.zeroize();
        if let Some(ref mut token) = self.mcp_server_token {
            token.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables only
    ///
    /// The .env file is loaded by `main` before this is called, so its values are
    /// visible here as ordinary environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(EnvConfig::from_env(), None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(EnvConfig::from_env(), Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Build configuration from explicit sources (used by tests and embedders)
    pub fn from_sources(env: EnvConfig, yaml: Option<YamlConfig>) -> Result<Self, ConfigError> {
        let config = merge::merge_config(env, yaml)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Interval after which one rate-limit permit is replenished
    pub fn rate_limit_period(&self) -> Duration {
        Duration::from_secs(1) / self.rate_limit_requests_per_second.max(1)
    }

    /// Tool definitions for the AI session: the configured MCP server (if any)
    /// followed by any tools supplied in YAML.
    pub fn session_tools(&self) -> Vec<serde_json::Value> {
        let mut tools = Vec::with_capacity(self.assistant_tools.len() + 1);

        if let Some(ref url) = self.mcp_server_url {
            let mut tool = serde_json::json!({
                "type": "mcp",
                "server_label": self.mcp_server_label,
                "server_url": url,
                "require_approval": "never",
            });
            if let Some(ref token) = self.mcp_server_token {
                tool["headers"] = serde_json::json!({
                    "Authorization": format!("Bearer {token}"),
                });
            }
            tools.push(tool);
        }

        tools.extend(self.assistant_tools.iter().cloned());
        tools
    }

    /// Settings handed to the AI connection for each call
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            api_key: self.openai_api_key.clone(),
            url: self.realtime_url.clone(),
            model: self.realtime_model.clone(),
            temperature: self.temperature,
            voice: self.voice.clone(),
            instructions: self.instructions.clone(),
            greeting: self.greeting.clone(),
            tools: self.session_tools(),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: DEFAULT_PORT,
        public_host: Some("relay.example.com".to_string()),
        webhook_url: None,
        twilio_auth_token: "test-auth-token".to_string(),
        openai_api_key: "sk-test".to_string(),
        realtime_url: crate::core::realtime::OPENAI_REALTIME_URL.to_string(),
        realtime_model: DEFAULT_REALTIME_MODEL.to_string(),
        temperature: DEFAULT_TEMPERATURE,
        voice: "alloy".to_string(),
        instructions: "Be helpful".to_string(),
        greeting: Some(DEFAULT_GREETING.to_string()),
        mcp_server_url: None,
        mcp_server_token: None,
        mcp_server_label: DEFAULT_MCP_SERVER_LABEL.to_string(),
        assistant_tools: Vec::new(),
        token_sweep_interval_seconds: 30,
        rate_limit_requests_per_second: 60,
        rate_limit_burst_size: 10,
        trust_proxy_headers: false,
        max_concurrent_calls: None,
        show_timing_math: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address() {
        let config = test_config();
        assert_eq!(config.address(), "127.0.0.1:5050");
    }

    #[test]
    fn test_session_tools_without_mcp() {
        let config = test_config();
        assert!(config.session_tools().is_empty());
    }

    #[test]
    fn test_session_tools_with_mcp_and_extra_tools() {
        let mut config = test_config();
        config.mcp_server_url = Some("https://mcp.example.com/sse".to_string());
        config.mcp_server_token = Some("secret".to_string());
        config.assistant_tools = vec![serde_json::json!({"type": "function", "name": "noop"})];

        let tools = config.session_tools();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0]["type"], "mcp");
        assert_eq!(tools[0]["server_label"], "zapier");
        assert_eq!(tools[0]["server_url"], "https://mcp.example.com/sse");
        assert_eq!(tools[0]["headers"]["Authorization"], "Bearer secret");
        assert_eq!(tools[1]["name"], "noop");
    }

    #[test]
    fn test_mcp_tool_without_token_has_no_headers() {
        let mut config = test_config();
        config.mcp_server_url = Some("https://mcp.example.com/sse".to_string());

        let tools = config.session_tools();
        assert!(tools[0].get("headers").is_none());
    }

    #[test]
    fn test_rate_limit_period_is_per_request_interval() {
        let mut config = test_config();
        config.rate_limit_requests_per_second = 60;
        assert_eq!(config.rate_limit_period(), Duration::from_nanos(16_666_666));

        config.rate_limit_requests_per_second = 4;
        assert_eq!(config.rate_limit_period(), Duration::from_millis(250));

        config.rate_limit_requests_per_second = 0;
        assert_eq!(config.rate_limit_period(), Duration::from_secs(1));
    }

    #[test]
    fn test_realtime_config_carries_assistant_settings() {
        let config = test_config();
        let realtime = config.realtime_config();

        assert_eq!(realtime.api_key, "sk-test");
        assert_eq!(realtime.model, "gpt-realtime");
        assert_eq!(realtime.voice, "alloy");
        assert_eq!(realtime.instructions, "Be helpful");
        assert_eq!(realtime.greeting.as_deref(), Some(DEFAULT_GREETING));
    }
}
