use thiserror::Error;

/// WebSocket close code for policy violations (RFC 6455)
pub const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Reasons a media-stream access token cannot be redeemed
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid or missing token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token already used")]
    AlreadyConsumed,
}

impl TokenError {
    /// Close code sent to the media-stream connection on redemption failure
    pub fn close_code(&self) -> u16 {
        CLOSE_POLICY_VIOLATION
    }
}
