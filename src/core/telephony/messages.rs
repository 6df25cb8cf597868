//! Telephony media-stream envelopes.
//!
//! Inbound messages are JSON objects discriminated by `event`:
//! `connected`, `start`, `media`, `mark`, `stop`. Media payloads are base64
//! µ-law and are never decoded here; the relay forwards them verbatim.
//!
//! Outbound messages are `media`, `mark` and `clear`, each addressed to the
//! stream id announced by `start`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Custom parameter carrying the media-stream access token
pub const TOKEN_PARAMETER: &str = "token";

// =============================================================================
// Inbound
// =============================================================================

/// A parsed inbound telephony message.
#[derive(Debug, Clone, PartialEq)]
pub enum TelephonyEvent {
    Connected,
    Start(StreamStart),
    Media(MediaChunk),
    Mark { name: Option<String> },
    Stop,
}

impl TelephonyEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            TelephonyEvent::Connected => "connected",
            TelephonyEvent::Start(_) => "start",
            TelephonyEvent::Media(_) => "media",
            TelephonyEvent::Mark { .. } => "mark",
            TelephonyEvent::Stop => "stop",
        }
    }
}

/// Metadata announced when a stream begins.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: Option<String>,
    pub custom_parameters: HashMap<String, String>,
}

impl StreamStart {
    /// Access token passed through the stream's custom parameters
    pub fn token(&self) -> Option<&str> {
        self.custom_parameters
            .get(TOKEN_PARAMETER)
            .map(String::as_str)
            .filter(|t| !t.is_empty())
    }
}

/// One chunk of caller audio.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaChunk {
    /// Base64 µ-law audio
    pub payload: String,
    /// Milliseconds since the stream started
    pub timestamp: u64,
}

/// Why an inbound message could not be used.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnvelopeError {
    #[error("Message is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("Message has no event field")]
    MissingEvent,

    #[error("Unknown event kind: {0}")]
    UnknownEvent(String),

    #[error("Malformed {event} event: {reason}")]
    Malformed { event: &'static str, reason: String },
}

impl EnvelopeError {
    /// A malformed `start` or `stop` leaves the stream in an unknown state.
    /// Everything else only costs the one message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EnvelopeError::Malformed {
                event: "start" | "stop",
                ..
            }
        )
    }
}

#[derive(Deserialize)]
struct StartEnvelope {
    #[serde(rename = "streamSid")]
    stream_sid: Option<String>,
    start: StartBody,
}

#[derive(Deserialize)]
struct StartBody {
    #[serde(rename = "streamSid")]
    stream_sid: Option<String>,
    #[serde(rename = "callSid")]
    call_sid: Option<String>,
    #[serde(rename = "customParameters", default)]
    custom_parameters: HashMap<String, String>,
}

#[derive(Deserialize)]
struct MediaEnvelope {
    media: MediaBody,
}

#[derive(Deserialize)]
struct MediaBody {
    payload: String,
    timestamp: Timestamp,
}

/// Media timestamps arrive as strings but numbers are accepted too
#[derive(Deserialize)]
#[serde(untagged)]
enum Timestamp {
    Number(u64),
    Text(String),
}

#[derive(Deserialize)]
struct MarkEnvelope {
    #[serde(default)]
    mark: Option<MarkBody>,
}

#[derive(Deserialize)]
struct MarkBody {
    name: Option<String>,
}

#[derive(Deserialize)]
struct StopEnvelope {
    #[serde(rename = "streamSid")]
    #[allow(dead_code)]
    stream_sid: Option<String>,
}

fn malformed(event: &'static str, reason: impl ToString) -> EnvelopeError {
    EnvelopeError::Malformed {
        event,
        reason: reason.to_string(),
    }
}

/// Parse one inbound text frame.
pub fn parse_inbound(text: &str) -> Result<TelephonyEvent, EnvelopeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| EnvelopeError::InvalidJson(e.to_string()))?;
    let kind = value
        .get("event")
        .and_then(Value::as_str)
        .ok_or(EnvelopeError::MissingEvent)?
        .to_string();

    match kind.as_str() {
        "connected" => Ok(TelephonyEvent::Connected),
        "start" => {
            let envelope: StartEnvelope =
                serde_json::from_value(value).map_err(|e| malformed("start", e))?;
            let stream_sid = envelope
                .start
                .stream_sid
                .or(envelope.stream_sid)
                .filter(|sid| !sid.is_empty())
                .ok_or_else(|| malformed("start", "missing streamSid"))?;
            Ok(TelephonyEvent::Start(StreamStart {
                stream_sid,
                call_sid: envelope.start.call_sid,
                custom_parameters: envelope.start.custom_parameters,
            }))
        }
        "media" => {
            let envelope: MediaEnvelope =
                serde_json::from_value(value).map_err(|e| malformed("media", e))?;
            let timestamp = match envelope.media.timestamp {
                Timestamp::Number(ms) => ms,
                Timestamp::Text(raw) => raw
                    .parse()
                    .map_err(|_| malformed("media", format!("invalid timestamp {raw:?}")))?,
            };
            Ok(TelephonyEvent::Media(MediaChunk {
                payload: envelope.media.payload,
                timestamp,
            }))
        }
        "mark" => {
            let envelope: MarkEnvelope =
                serde_json::from_value(value).map_err(|e| malformed("mark", e))?;
            Ok(TelephonyEvent::Mark {
                name: envelope.mark.and_then(|m| m.name),
            })
        }
        "stop" => {
            serde_json::from_value::<StopEnvelope>(value).map_err(|e| malformed("stop", e))?;
            Ok(TelephonyEvent::Stop)
        }
        _ => Err(EnvelopeError::UnknownEvent(kind)),
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Messages sent to the telephony provider.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    /// Play audio to the caller
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: MediaPayload,
    },
    /// Ask for an acknowledgment once preceding audio has played
    Mark {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        mark: MarkPayload,
    },
    /// Drop all buffered audio
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaPayload {
    pub payload: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MarkPayload {
    pub name: String,
}

impl TelephonyCommand {
    pub fn media(stream_sid: impl Into<String>, payload: impl Into<String>) -> Self {
        TelephonyCommand::Media {
            stream_sid: stream_sid.into(),
            media: MediaPayload {
                payload: payload.into(),
            },
        }
    }

    pub fn mark(stream_sid: impl Into<String>, name: impl Into<String>) -> Self {
        TelephonyCommand::Mark {
            stream_sid: stream_sid.into(),
            mark: MarkPayload { name: name.into() },
        }
    }

    pub fn clear(stream_sid: impl Into<String>) -> Self {
        TelephonyCommand::Clear {
            stream_sid: stream_sid.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
