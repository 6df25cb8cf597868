//! Realtime AI connection module.
//!
//! Each call owns one WebSocket connection to the OpenAI Realtime API. The
//! connection is configured for narrowband telephony audio (G.711 µ-law,
//! `audio/pcmu`) in both directions, so audio is passed through without
//! transcoding.

mod base;
pub mod openai;

pub use base::{RealtimeConfig, RealtimeError, RealtimeResult};
pub use openai::{
    AUDIO_FORMAT_PCMU, ClientEvent, LOGGED_EVENT_TYPES, OPENAI_REALTIME_URL, OpenAIRealtime,
    RealtimeStream, ServerEvent, SessionConfig, is_logged_event,
};
