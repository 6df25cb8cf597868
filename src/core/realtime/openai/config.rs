//! OpenAI Realtime API connection constants.

use std::time::Duration;

/// OpenAI Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Session type for speech-to-speech sessions.
pub const SESSION_TYPE_REALTIME: &str = "realtime";

/// G.711 µ-law at 8kHz, the format the telephony provider streams.
pub const AUDIO_FORMAT_PCMU: &str = "audio/pcmu";

/// Upper bound on the WebSocket connect handshake.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long to wait for `session.updated` before carrying on without it.
pub const SESSION_UPDATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server event types worth logging at info level.
pub const LOGGED_EVENT_TYPES: &[&str] = &[
    "error",
    "response.content.done",
    "rate_limits.updated",
    "response.done",
    "input_audio_buffer.committed",
    "input_audio_buffer.speech_stopped",
    "input_audio_buffer.speech_started",
    "session.created",
    "session.updated",
    "response.function_call_arguments.delta",
    "response.function_call_arguments.done",
];

/// Whether a server event type is logged at info level.
#[inline]
pub fn is_logged_event(event_type: &str) -> bool {
    LOGGED_EVENT_TYPES.contains(&event_type)
}
