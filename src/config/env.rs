//! Environment variable loading
//!
//! Values are read raw here; defaults and type conversion happen in `merge`
//! so that YAML overrides and environment values go through the same parsing.

/// Raw configuration values read from the environment
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<String>,
    pub public_host: Option<String>,
    pub webhook_url: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub openai_api_key: Option<String>,
    pub realtime_url: Option<String>,
    pub realtime_model: Option<String>,
    pub temperature: Option<String>,
    pub voice: Option<String>,
    pub instructions: Option<String>,
    pub greeting: Option<String>,
    pub mcp_server_url: Option<String>,
    pub mcp_server_token: Option<String>,
    pub mcp_server_label: Option<String>,
    pub token_sweep_interval_seconds: Option<String>,
    pub rate_limit_requests_per_second: Option<String>,
    pub rate_limit_burst_size: Option<String>,
    pub trust_proxy_headers: Option<String>,
    pub max_concurrent_calls: Option<String>,
    pub show_timing_math: Option<String>,
}

impl EnvConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    ///
    /// Empty values are treated as unset, except for `ASSISTANT_GREETING` where
    /// an empty string explicitly disables the greeting.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: get("HOST"),
            port: get("PORT"),
            public_host: get("PUBLIC_HOST"),
            webhook_url: get("WEBHOOK_URL"),
            twilio_auth_token: get("TWILIO_AUTH_TOKEN"),
            openai_api_key: get("OPENAI_API_KEY"),
            realtime_url: get("REALTIME_URL"),
            realtime_model: get("REALTIME_MODEL"),
            temperature: get("TEMPERATURE"),
            voice: get("VOICE"),
            instructions: get("ASSISTANT_INSTRUCTIONS"),
            greeting: lookup("ASSISTANT_GREETING"),
            mcp_server_url: get("MCP_SERVER_URL"),
            mcp_server_token: get("MCP_SERVER_TOKEN"),
            mcp_server_label: get("MCP_SERVER_LABEL"),
            token_sweep_interval_seconds: get("TOKEN_SWEEP_INTERVAL_SECONDS"),
            rate_limit_requests_per_second: get("RATE_LIMIT_REQUESTS_PER_SECOND"),
            rate_limit_burst_size: get("RATE_LIMIT_BURST_SIZE"),
            trust_proxy_headers: get("TRUST_PROXY_HEADERS"),
            max_concurrent_calls: get("MAX_CONCURRENT_CALLS"),
            show_timing_math: get("SHOW_TIMING_MATH"),
        }
    }
}

/// Parse a boolean flag the way operators tend to write them
pub(super) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
