//! Merging environment values with YAML overrides

use std::str::FromStr;

use super::env::{EnvConfig, parse_bool};
use super::yaml::YamlConfig;
use super::{
    ConfigError, DEFAULT_GREETING, DEFAULT_MCP_SERVER_LABEL, DEFAULT_PORT, DEFAULT_REALTIME_MODEL,
    DEFAULT_TEMPERATURE, ServerConfig,
};
use crate::core::realtime::OPENAI_REALTIME_URL;

fn parse_env<T>(name: &'static str, value: Option<&str>) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                name,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn parse_env_bool(name: &'static str, value: Option<&str>) -> Result<Option<bool>, ConfigError> {
    value
        .map(|v| {
            parse_bool(v).ok_or_else(|| ConfigError::Invalid {
                name,
                reason: format!("expected a boolean, got '{v}'"),
            })
        })
        .transpose()
}

/// Merge environment configuration (base) with optional YAML overrides
pub(super) fn merge_config(
    env: EnvConfig,
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, ConfigError> {
    let yaml = yaml.unwrap_or_default();
    let server = yaml.server.unwrap_or_default();
    let twilio = yaml.twilio.unwrap_or_default();
    let openai = yaml.openai.unwrap_or_default();
    let assistant = yaml.assistant.unwrap_or_default();
    let mcp = assistant.mcp.clone().unwrap_or_default();
    let security = yaml.security.unwrap_or_default();
    let tokens = yaml.tokens.unwrap_or_default();
    let logging = yaml.logging.unwrap_or_default();

    let port = match server.port {
        Some(port) => port,
        None => parse_env("PORT", env.port.as_deref())?.unwrap_or(DEFAULT_PORT),
    };

    let temperature = match assistant.temperature {
        Some(t) => t,
        None => parse_env("TEMPERATURE", env.temperature.as_deref())?
            .unwrap_or(DEFAULT_TEMPERATURE),
    };

    let twilio_auth_token = twilio
        .auth_token
        .or(env.twilio_auth_token)
        .ok_or(ConfigError::Missing("TWILIO_AUTH_TOKEN"))?;
    let openai_api_key = openai
        .api_key
        .or(env.openai_api_key)
        .ok_or(ConfigError::Missing("OPENAI_API_KEY"))?;
    let voice = assistant
        .voice
        .or(env.voice)
        .ok_or(ConfigError::Missing("VOICE"))?;
    let instructions = assistant
        .instructions
        .or(env.instructions)
        .ok_or(ConfigError::Missing("ASSISTANT_INSTRUCTIONS"))?;

    // An explicitly empty greeting turns the greeting off
    let greeting = match assistant.greeting.or(env.greeting) {
        Some(g) if g.trim().is_empty() => None,
        Some(g) => Some(g),
        None => Some(DEFAULT_GREETING.to_string()),
    };

    let token_sweep_interval_seconds = match tokens.sweep_interval_seconds {
        Some(v) => v,
        None => parse_env(
            "TOKEN_SWEEP_INTERVAL_SECONDS",
            env.token_sweep_interval_seconds.as_deref(),
        )?
        .unwrap_or(30),
    };

    let rate_limit_requests_per_second = match security.rate_limit_requests_per_second {
        Some(v) => v,
        None => parse_env(
            "RATE_LIMIT_REQUESTS_PER_SECOND",
            env.rate_limit_requests_per_second.as_deref(),
        )?
        .unwrap_or(60),
    };

    let rate_limit_burst_size = match security.rate_limit_burst_size {
        Some(v) => v,
        None => parse_env("RATE_LIMIT_BURST_SIZE", env.rate_limit_burst_size.as_deref())?
            .unwrap_or(10),
    };

    let trust_proxy_headers = match security.trust_proxy_headers {
        Some(v) => v,
        None => parse_env_bool("TRUST_PROXY_HEADERS", env.trust_proxy_headers.as_deref())?
            .unwrap_or(false),
    };

    let max_concurrent_calls = match security.max_concurrent_calls {
        Some(v) => Some(v),
        None => parse_env("MAX_CONCURRENT_CALLS", env.max_concurrent_calls.as_deref())?,
    };

    let show_timing_math = match logging.show_timing_math {
        Some(v) => v,
        None => parse_env_bool("SHOW_TIMING_MATH", env.show_timing_math.as_deref())?
            .unwrap_or(false),
    };

    Ok(ServerConfig {
        host: server
            .host
            .or(env.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port,
        public_host: server.public_host.or(env.public_host),
        webhook_url: server.webhook_url.or(env.webhook_url),
        twilio_auth_token,
        openai_api_key,
        realtime_url: openai
            .realtime_url
            .or(env.realtime_url)
            .unwrap_or_else(|| OPENAI_REALTIME_URL.to_string()),
        realtime_model: openai
            .model
            .or(env.realtime_model)
            .unwrap_or_else(|| DEFAULT_REALTIME_MODEL.to_string()),
        temperature,
        voice,
        instructions,
        greeting,
        mcp_server_url: mcp.server_url.or(env.mcp_server_url),
        mcp_server_token: mcp.token.or(env.mcp_server_token),
        mcp_server_label: mcp
            .label
            .or(env.mcp_server_label)
            .unwrap_or_else(|| DEFAULT_MCP_SERVER_LABEL.to_string()),
        assistant_tools: assistant.tools,
        token_sweep_interval_seconds,
        rate_limit_requests_per_second,
        rate_limit_burst_size,
        trust_proxy_headers,
        max_concurrent_calls,
        show_timing_math,
    })
}
