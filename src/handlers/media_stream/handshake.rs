//! Media-stream handshake
//!
//! The provider opens the socket, sends `connected`, then `start`. The access
//! token rides in `start.customParameters`; nothing is relayed until it has
//! been redeemed.

use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};
use thiserror::Error;

use crate::auth::TokenStore;
use crate::core::relay::RelayFrame;
use crate::core::telephony::{EnvelopeError, StreamStart, TelephonyEvent, parse_inbound};
use crate::errors::TokenError;
use crate::errors::token_error::CLOSE_POLICY_VIOLATION;

/// Upper bound on the time between upgrade and a redeemed token
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket close code for unexpected server conditions (RFC 6455)
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

#[derive(Debug, Error, PartialEq)]
pub enum HandshakeError {
    #[error("Unexpected event {0}")]
    UnexpectedEvent(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Malformed handshake message: {0}")]
    Malformed(String),

    #[error("Connection closed during handshake")]
    Closed,

    #[error("Handshake timed out")]
    Timeout,

    #[error("Transport error during handshake: {0}")]
    Transport(String),
}

impl HandshakeError {
    /// Close frame to send, if the connection is still open
    pub fn close_frame(&self) -> Option<(u16, String)> {
        match self {
            HandshakeError::UnexpectedEvent(_) => {
                Some((CLOSE_POLICY_VIOLATION, "Unexpected event".to_string()))
            }
            HandshakeError::Token(err) => Some((err.close_code(), err.to_string())),
            HandshakeError::Malformed(_) | HandshakeError::Timeout => {
                Some((CLOSE_INTERNAL_ERROR, "Authentication error".to_string()))
            }
            HandshakeError::Closed | HandshakeError::Transport(_) => None,
        }
    }
}

/// Read frames until the stream's `start` arrives, skipping `connected`.
pub async fn await_stream_start<S, E>(inbound: &mut S) -> Result<StreamStart, HandshakeError>
where
    S: Stream<Item = Result<RelayFrame, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(RelayFrame::Text(text)) => text,
            Ok(RelayFrame::Ignored) => continue,
            Ok(RelayFrame::Close) => return Err(HandshakeError::Closed),
            Err(e) => return Err(HandshakeError::Transport(e.to_string())),
        };

        match parse_inbound(&text) {
            Ok(TelephonyEvent::Connected) => continue,
            Ok(TelephonyEvent::Start(start)) => return Ok(start),
            Ok(other) => return Err(HandshakeError::UnexpectedEvent(other.kind().to_string())),
            Err(EnvelopeError::UnknownEvent(kind)) => {
                return Err(HandshakeError::UnexpectedEvent(kind));
            }
            Err(e) => return Err(HandshakeError::Malformed(e.to_string())),
        }
    }

    Err(HandshakeError::Closed)
}

/// Redeem the token from `start`, falling back to the `?token=` parameter.
pub fn authorize(
    tokens: &TokenStore,
    start: &StreamStart,
    query_token: Option<&str>,
) -> Result<(), HandshakeError> {
    let token = start
        .token()
        .or(query_token.filter(|t| !t.is_empty()))
        .ok_or(TokenError::InvalidToken)?;
    tokens.redeem(token)?;
    Ok(())
}
