//! Telephony provider wire formats.
//!
//! - `messages` - Media-stream envelopes in both directions
//! - `twiml` - Call-setup response document

pub mod messages;
pub mod twiml;

pub use messages::{
    EnvelopeError, MediaChunk, StreamStart, TOKEN_PARAMETER, TelephonyCommand, TelephonyEvent,
    parse_inbound,
};
pub use twiml::{MEDIA_STREAM_PATH, TWIML_CONTENT_TYPE, connect_stream};
