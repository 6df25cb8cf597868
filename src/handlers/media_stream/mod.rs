//! Media-stream WebSocket endpoint
//!
//! # Protocol
//!
//! Provider → server:
//! - **connected**: socket open
//! - **start**: stream id and custom parameters, including the access token
//! - **media**: base64 µ-law audio with a media timestamp
//! - **mark**: playback acknowledgment
//! - **stop**: stream ended
//!
//! Server → provider:
//! - **media**: assistant audio
//! - **mark**: playback checkpoint after each audio chunk
//! - **clear**: drop buffered audio on barge-in

mod handler;
pub mod handshake;

pub use handler::{MediaStreamQuery, media_stream_handler};
