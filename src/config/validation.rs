use super::{ConfigError, ServerConfig};

/// Validate the merged configuration
pub(super) fn validate(config: &ServerConfig) -> Result<(), ConfigError> {
    validate_temperature(config.temperature)?;
    validate_realtime_url(&config.realtime_url)?;
    if let Some(ref url) = config.webhook_url {
        validate_webhook_url(url)?;
    }
    if let Some(ref url) = config.mcp_server_url {
        validate_mcp_url(url)?;
    }
    if config.token_sweep_interval_seconds == 0 {
        return Err(ConfigError::Invalid {
            name: "TOKEN_SWEEP_INTERVAL_SECONDS",
            reason: "must be greater than zero".to_string(),
        });
    }
    if config.rate_limit_requests_per_second == 0 || config.rate_limit_burst_size == 0 {
        return Err(ConfigError::Invalid {
            name: "RATE_LIMIT_REQUESTS_PER_SECOND",
            reason: "rate limit and burst size must be greater than zero".to_string(),
        });
    }
    if config.max_concurrent_calls == Some(0) {
        return Err(ConfigError::Invalid {
            name: "MAX_CONCURRENT_CALLS",
            reason: "must be greater than zero when set".to_string(),
        });
    }
    Ok(())
}

fn validate_temperature(temperature: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&temperature) {
        return Err(ConfigError::Invalid {
            name: "TEMPERATURE",
            reason: format!("{temperature} is outside 0.0..=2.0"),
        });
    }
    Ok(())
}

fn validate_realtime_url(raw: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name: "REALTIME_URL",
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(ConfigError::Invalid {
            name: "REALTIME_URL",
            reason: format!("unsupported scheme '{other}', expected ws or wss"),
        }),
    }
}

fn validate_webhook_url(raw: &str) -> Result<(), ConfigError> {
    let url = url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
        name: "WEBHOOK_URL",
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid {
            name: "WEBHOOK_URL",
            reason: format!("unsupported scheme '{other}', expected http or https"),
        }),
    }
}

fn validate_mcp_url(raw: &str) -> Result<(), ConfigError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|e| ConfigError::Invalid {
            name: "MCP_SERVER_URL",
            reason: e.to_string(),
        })
}
