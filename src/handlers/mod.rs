//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `voice` - Call-setup webhook
//! - `media_stream` - Per-call media-stream WebSocket

pub mod api;
pub mod media_stream;
pub mod voice;

pub use media_stream::media_stream_handler;
pub use voice::incoming_call;
