//! Shared types for the AI realtime connection.

use std::fmt;

use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while talking to the realtime AI service.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// Connection to the provider failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    /// Provider reported an error event
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The connection closed during setup
    #[error("Connection closed")]
    ConnectionClosed,
}

/// Result type for realtime operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

impl From<serde_json::Error> for RealtimeError {
    fn from(err: serde_json::Error) -> Self {
        RealtimeError::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for RealtimeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => RealtimeError::ConnectionClosed,
            other => RealtimeError::WebSocketError(other.to_string()),
        }
    }
}

// =============================================================================
// Configuration Types
// =============================================================================

/// Per-call settings for the AI connection.
///
/// Built from `ServerConfig::realtime_config` and handed to every new call.
#[derive(Clone, Default)]
pub struct RealtimeConfig {
    /// Bearer credential for the AI service
    pub api_key: String,

    /// WebSocket endpoint, without query parameters
    pub url: String,

    /// Realtime model name, sent both in the URL and in `session.update`
    pub model: String,

    /// Sampling temperature, sent as a connection parameter
    pub temperature: f32,

    /// Output voice
    pub voice: String,

    /// System instructions for the assistant
    pub instructions: String,

    /// Prompt that makes the assistant speak first. `None` waits for the caller.
    pub greeting: Option<String>,

    /// Tool definitions passed through to the session unchanged
    pub tools: Vec<serde_json::Value>,
}

impl fmt::Debug for RealtimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeConfig")
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("voice", &self.voice)
            .field("greeting", &self.greeting.is_some())
            .field("tools", &self.tools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_api_key() {
        let config = RealtimeConfig {
            api_key: "sk-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_closed_socket_maps_to_connection_closed() {
        let err: RealtimeError = tokio_tungstenite::tungstenite::Error::ConnectionClosed.into();
        assert!(matches!(err, RealtimeError::ConnectionClosed));
    }
}
