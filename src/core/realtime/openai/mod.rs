//! OpenAI Realtime API module.
//!
//! # Features
//!
//! - µ-law audio passthrough in both directions
//! - Server-side Voice Activity Detection (VAD)
//! - Opaque tool definitions (MCP servers, functions)
//! - Optional greeting so the assistant speaks first

mod client;
mod config;
mod messages;

pub use client::{OpenAIRealtime, RealtimeStream};
pub use config::{
    AUDIO_FORMAT_PCMU, CONNECT_TIMEOUT, LOGGED_EVENT_TYPES, OPENAI_REALTIME_URL,
    SESSION_UPDATE_TIMEOUT, is_logged_event,
};
pub use messages::{
    ApiError, ClientEvent, ConversationItem, ServerEvent, SessionConfig, TurnDetection,
};
