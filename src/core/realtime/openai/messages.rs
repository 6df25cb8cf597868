//! OpenAI Realtime API WebSocket message types.
//!
//! Only the events the relay produces or reacts to are modeled; every other
//! server event deserializes to `ServerEvent::Unknown`.
//!
//! # Protocol Overview
//!
//! Client events (sent to server):
//! - session.update - Configure audio formats, voice, instructions and tools
//! - input_audio_buffer.append - Append caller audio
//! - conversation.item.create - Add the greeting prompt
//! - conversation.item.truncate - Cut an assistant item at the point heard
//! - response.create - Ask the assistant to speak
//!
//! Server events (received from server):
//! - response.output_audio.delta - Assistant audio chunk
//! - input_audio_buffer.speech_started - Caller started speaking
//! - input_audio_buffer.speech_stopped - Caller stopped speaking
//! - response.done - Response complete
//! - session.created / session.updated - Session lifecycle
//! - error - Error occurred

use serde::{Deserialize, Serialize};

use super::config::{AUDIO_FORMAT_PCMU, SESSION_TYPE_REALTIME};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration sent in `session.update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Session type, always "realtime"
    #[serde(rename = "type")]
    pub session_type: String,

    /// Model name
    pub model: String,

    /// Response modalities
    pub output_modalities: Vec<String>,

    /// Input and output audio settings
    pub audio: AudioConfig,

    /// System instructions for the assistant
    pub instructions: String,

    /// Tool definitions, forwarded as-is
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
}

impl SessionConfig {
    /// Audio-only session with µ-law in both directions and server-side VAD
    pub fn telephony(
        model: &str,
        voice: &str,
        instructions: &str,
        tools: Vec<serde_json::Value>,
    ) -> Self {
        Self {
            session_type: SESSION_TYPE_REALTIME.to_string(),
            model: model.to_string(),
            output_modalities: vec!["audio".to_string()],
            audio: AudioConfig {
                input: AudioInputConfig {
                    format: AudioFormat::pcmu(),
                    turn_detection: TurnDetection::ServerVad {},
                },
                output: AudioOutputConfig {
                    format: AudioFormat::pcmu(),
                    voice: voice.to_string(),
                },
            },
            instructions: instructions.to_string(),
            tools,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioConfig {
    pub input: AudioInputConfig,
    pub output: AudioOutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioInputConfig {
    pub format: AudioFormat,
    pub turn_detection: TurnDetection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioOutputConfig {
    pub format: AudioFormat,
    pub voice: String,
}

/// Audio format descriptor, e.g. `{"type": "audio/pcmu"}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioFormat {
    #[serde(rename = "type")]
    pub format_type: String,
}

impl AudioFormat {
    pub fn pcmu() -> Self {
        Self {
            format_type: AUDIO_FORMAT_PCMU.to_string(),
        }
    }
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD with provider defaults
    #[serde(rename = "server_vad")]
    ServerVad {},
}

// =============================================================================
// Conversation Items
// =============================================================================

/// Conversation item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationItem {
    /// Item type
    #[serde(rename = "type")]
    pub item_type: String,
    /// Item role (user, assistant, system)
    pub role: String,
    /// Content parts
    pub content: Vec<ContentPart>,
}

impl ConversationItem {
    /// A user message carrying a single text part
    pub fn user_text(text: &str) -> Self {
        Self {
            item_type: "message".to_string(),
            role: "user".to_string(),
            content: vec![ContentPart {
                content_type: "input_text".to_string(),
                text: text.to_string(),
            }],
        }
    }
}

/// Content part within a conversation item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

// =============================================================================
// Client Events (sent to server)
// =============================================================================

/// Client events sent to the OpenAI Realtime API.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded µ-law audio, as received from telephony
        audio: String,
    },

    /// Create a conversation item
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate {
        /// Item to create
        item: ConversationItem,
    },

    /// Truncate a conversation item
    #[serde(rename = "conversation.item.truncate")]
    ConversationItemTruncate {
        /// Item ID
        item_id: String,
        /// Content index
        content_index: u32,
        /// Audio end in ms
        audio_end_ms: u64,
    },

    /// Create a response
    #[serde(rename = "response.create")]
    ResponseCreate,
}

impl ClientEvent {
    /// Forward a telephony payload without decoding it.
    pub fn audio_append(payload: impl Into<String>) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: payload.into(),
        }
    }

    /// Truncate the first content part of an item.
    pub fn truncate(item_id: impl Into<String>, audio_end_ms: u64) -> Self {
        ClientEvent::ConversationItemTruncate {
            item_id: item_id.into(),
            content_index: 0,
            audio_end_ms,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Server Events (received from server)
// =============================================================================

/// Server events received from the OpenAI Realtime API.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// Error occurred
    #[serde(rename = "error")]
    Error {
        /// Error details
        error: ApiError,
    },

    /// Session created
    #[serde(rename = "session.created")]
    SessionCreated {
        #[serde(default)]
        session: serde_json::Value,
    },

    /// Session updated
    #[serde(rename = "session.updated")]
    SessionUpdated {
        #[serde(default)]
        session: serde_json::Value,
    },

    /// Assistant audio chunk
    #[serde(rename = "response.output_audio.delta", alias = "response.audio.delta")]
    AudioDelta {
        /// Base64-encoded µ-law audio
        delta: String,
        /// Assistant item the audio belongs to
        #[serde(default)]
        item_id: Option<String>,
        /// Response ID
        #[serde(default)]
        response_id: Option<String>,
    },

    /// Speech started (VAD detected speech)
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {
        #[serde(default)]
        audio_start_ms: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Speech stopped (VAD detected silence)
    #[serde(rename = "input_audio_buffer.speech_stopped")]
    SpeechStopped {
        #[serde(default)]
        audio_end_ms: Option<u64>,
        #[serde(default)]
        item_id: Option<String>,
    },

    /// Response done
    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: serde_json::Value,
    },

    /// Any event the relay does not act on
    #[serde(other)]
    Unknown,
}

impl ServerEvent {
    /// Number of tools registered on a `session.updated` event.
    pub fn registered_tools(&self) -> Option<&Vec<serde_json::Value>> {
        match self {
            ServerEvent::SessionUpdated { session } => {
                session.get("tools").and_then(|tools| tools.as_array())
            }
            _ => None,
        }
    }
}

/// API error details.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    /// Error code
    #[serde(default)]
    pub code: Option<String>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_update_shape() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig::telephony(
                "gpt-realtime",
                "alloy",
                "Be brief",
                vec![json!({"type": "mcp", "server_label": "zapier"})],
            ),
        };
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["type"], "realtime");
        assert_eq!(value["session"]["model"], "gpt-realtime");
        assert_eq!(value["session"]["output_modalities"], json!(["audio"]));
        assert_eq!(value["session"]["audio"]["input"]["format"]["type"], "audio/pcmu");
        assert_eq!(
            value["session"]["audio"]["input"]["turn_detection"]["type"],
            "server_vad"
        );
        assert_eq!(value["session"]["audio"]["output"]["format"]["type"], "audio/pcmu");
        assert_eq!(value["session"]["audio"]["output"]["voice"], "alloy");
        assert_eq!(value["session"]["instructions"], "Be brief");
        assert_eq!(value["session"]["tools"][0]["server_label"], "zapier");
    }

    #[test]
    fn test_session_update_omits_empty_tools() {
        let session = SessionConfig::telephony("gpt-realtime", "alloy", "x", Vec::new());
        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn test_truncate_shape() {
        let json = ClientEvent::truncate("item_1", 300).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "conversation.item.truncate",
                "item_id": "item_1",
                "content_index": 0,
                "audio_end_ms": 300
            })
        );
    }

    #[test]
    fn test_response_create_and_greeting() {
        assert_eq!(
            ClientEvent::ResponseCreate.to_json().unwrap(),
            r#"{"type":"response.create"}"#
        );

        let greeting = ClientEvent::ConversationItemCreate {
            item: ConversationItem::user_text("Say hi"),
        };
        let value = serde_json::to_value(&greeting).unwrap();
        assert_eq!(value["item"]["type"], "message");
        assert_eq!(value["item"]["role"], "user");
        assert_eq!(value["item"]["content"][0]["type"], "input_text");
        assert_eq!(value["item"]["content"][0]["text"], "Say hi");
    }

    #[test]
    fn test_audio_append_passes_payload_through() {
        let value = serde_json::to_value(ClientEvent::audio_append("//79/A==")).unwrap();
        assert_eq!(value, json!({"type": "input_audio_buffer.append", "audio": "//79/A=="}));
    }

    #[test]
    fn test_parse_audio_delta_both_names() {
        for name in ["response.output_audio.delta", "response.audio.delta"] {
            let raw = json!({
                "type": name,
                "delta": "AAAA",
                "item_id": "item_7",
                "response_id": "resp_1"
            });
            let event: ServerEvent = serde_json::from_value(raw).unwrap();
            assert_eq!(
                event,
                ServerEvent::AudioDelta {
                    delta: "AAAA".to_string(),
                    item_id: Some("item_7".to_string()),
                    response_id: Some("resp_1".to_string()),
                }
            );
        }
    }

    #[test]
    fn test_parse_speech_and_done_events() {
        let started: ServerEvent = serde_json::from_str(
            r#"{"type":"input_audio_buffer.speech_started","audio_start_ms":120,"item_id":"u1"}"#,
        )
        .unwrap();
        assert!(matches!(started, ServerEvent::SpeechStarted { .. }));

        let done: ServerEvent =
            serde_json::from_str(r#"{"type":"response.done","response":{"id":"r1"}}"#).unwrap();
        assert!(matches!(done, ServerEvent::ResponseDone { .. }));
    }

    #[test]
    fn test_unknown_event() {
        let event: ServerEvent =
            serde_json::from_str(r#"{"type":"rate_limits.updated","rate_limits":[]}"#).unwrap();
        assert_eq!(event, ServerEvent::Unknown);
    }

    #[test]
    fn test_registered_tools() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "session.updated",
            "session": {"tools": [{"type": "mcp"}, {"type": "function"}]}
        }))
        .unwrap();
        assert_eq!(event.registered_tools().map(Vec::len), Some(2));
    }

    #[test]
    fn test_parse_error_event() {
        let event: ServerEvent = serde_json::from_value(json!({
            "type": "error",
            "error": {"type": "invalid_request_error", "message": "bad"}
        }))
        .unwrap();
        match event {
            ServerEvent::Error { error } => assert_eq!(error.message, "bad"),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
