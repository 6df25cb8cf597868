//! OpenAI Realtime API connection setup.
//!
//! # API Reference
//!
//! - Endpoint: `wss://api.openai.com/v1/realtime?model=<model>&temperature=<t>`
//! - Protocol: WebSocket with JSON events
//! - Audio: G.711 µ-law, 8kHz, base64 encoded
//!
//! Setting up a call means connecting, sending `session.update`, waiting for
//! the matching `session.updated`, then optionally prompting the assistant to
//! speak first. After that the stream belongs to the relay engine.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;

use super::config::{CONNECT_TIMEOUT, SESSION_UPDATE_TIMEOUT};
use super::messages::{ClientEvent, ConversationItem, ServerEvent, SessionConfig};
use crate::core::realtime::base::{RealtimeConfig, RealtimeError, RealtimeResult};

/// WebSocket stream to the AI service
pub type RealtimeStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connects calls to the OpenAI Realtime API.
#[derive(Debug, Clone)]
pub struct OpenAIRealtime {
    config: RealtimeConfig,
}

impl OpenAIRealtime {
    pub fn new(config: RealtimeConfig) -> RealtimeResult<Self> {
        if config.api_key.is_empty() {
            return Err(RealtimeError::InvalidConfiguration(
                "API key is required".to_string(),
            ));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RealtimeConfig {
        &self.config
    }

    /// Build the WebSocket URL with model and temperature parameters.
    pub fn ws_url(&self) -> RealtimeResult<Url> {
        let mut url = Url::parse(&self.config.url)
            .map_err(|e| RealtimeError::InvalidConfiguration(format!("realtime url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.config.model)
            .append_pair("temperature", &self.config.temperature.to_string());
        Ok(url)
    }

    /// The `session.update` payload for a telephony call.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::telephony(
            &self.config.model,
            &self.config.voice,
            &self.config.instructions,
            self.config.tools.clone(),
        )
    }

    /// Open the AI connection and configure the session.
    pub async fn connect(&self) -> RealtimeResult<RealtimeStream> {
        let url = self.ws_url()?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.config.api_key))
            .map_err(|e| RealtimeError::InvalidConfiguration(e.to_string()))?;
        request.headers_mut().insert("Authorization", auth);

        let (mut ws, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| RealtimeError::Timeout("connect".to_string()))?
                .map_err(|e| RealtimeError::ConnectionFailed(e.to_string()))?;

        info!(model = %self.config.model, "Connected to OpenAI Realtime API");

        self.initialize_session(&mut ws).await?;
        Ok(ws)
    }

    /// Send `session.update`, wait for it to apply, then send the greeting.
    pub async fn initialize_session<S>(&self, ws: &mut WebSocketStream<S>) -> RealtimeResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let update = ClientEvent::SessionUpdate {
            session: self.session_config(),
        };
        debug!(tools = self.config.tools.len(), "Sending session update");
        send_event(ws, &update).await?;

        match tokio::time::timeout(SESSION_UPDATE_TIMEOUT, wait_for_session_updated(ws)).await {
            Ok(result) => result?,
            Err(_) => warn!(
                timeout_secs = SESSION_UPDATE_TIMEOUT.as_secs(),
                "No session.updated received, continuing"
            ),
        }

        if let Some(greeting) = &self.config.greeting {
            send_event(
                ws,
                &ClientEvent::ConversationItemCreate {
                    item: ConversationItem::user_text(greeting),
                },
            )
            .await?;
            send_event(ws, &ClientEvent::ResponseCreate).await?;
            debug!("Sent greeting prompt");
        }

        Ok(())
    }
}

async fn send_event<S>(ws: &mut WebSocketStream<S>, event: &ClientEvent) -> RealtimeResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let json = event.to_json()?;
    ws.send(Message::Text(json.into())).await?;
    Ok(())
}

/// Read until `session.updated` arrives. An `error` event aborts setup.
async fn wait_for_session_updated<S>(ws: &mut WebSocketStream<S>) -> RealtimeResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(msg) = ws.next().await {
        let text = match msg? {
            Message::Text(text) => text,
            Message::Close(_) => return Err(RealtimeError::ConnectionClosed),
            _ => continue,
        };

        match serde_json::from_str::<ServerEvent>(&text) {
            Ok(event @ ServerEvent::SessionUpdated { .. }) => {
                let tools = event.registered_tools().map(Vec::len).unwrap_or(0);
                info!(registered_tools = tools, "Session updated");
                if let Some(registered) = event.registered_tools() {
                    for tool in registered {
                        debug!(
                            tool_type = ?tool.get("type"),
                            server_label = ?tool.get("server_label"),
                            allowed_tools = ?tool.get("allowed_tools"),
                            "Registered tool"
                        );
                    }
                }
                return Ok(());
            }
            Ok(ServerEvent::Error { error }) => {
                return Err(RealtimeError::ProviderError(error.message));
            }
            Ok(ServerEvent::SessionCreated { .. }) => info!("Session created"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to parse server event during setup"),
        }
    }

    Err(RealtimeError::ConnectionClosed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::realtime::openai::OPENAI_REALTIME_URL;

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            api_key: "sk-test".to_string(),
            url: OPENAI_REALTIME_URL.to_string(),
            model: "gpt-realtime".to_string(),
            temperature: 0.8,
            voice: "alloy".to_string(),
            instructions: "Be helpful".to_string(),
            greeting: None,
            tools: Vec::new(),
        }
    }

    #[test]
    fn test_api_key_required() {
        let config = RealtimeConfig {
            api_key: String::new(),
            ..test_config()
        };
        assert!(matches!(
            OpenAIRealtime::new(config),
            Err(RealtimeError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_build_ws_url() {
        let client = OpenAIRealtime::new(test_config()).unwrap();
        assert_eq!(
            client.ws_url().unwrap().as_str(),
            "wss://api.openai.com/v1/realtime?model=gpt-realtime&temperature=0.8"
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let config = RealtimeConfig {
            url: "not a url".to_string(),
            ..test_config()
        };
        let client = OpenAIRealtime::new(config).unwrap();
        assert!(client.ws_url().is_err());
    }

    #[test]
    fn test_session_config_uses_settings() {
        let client = OpenAIRealtime::new(test_config()).unwrap();
        let session = client.session_config();
        assert_eq!(session.model, "gpt-realtime");
        assert_eq!(session.audio.output.voice, "alloy");
        assert_eq!(session.instructions, "Be helpful");
    }
}
