//! Caller authentication
//!
//! Two gates protect a call: the webhook signature on call setup, and the
//! single-use token the media-stream connection must redeem.

pub mod signature;
pub mod token_store;

pub use signature::{SIGNATURE_HEADER, compute_signature, validate, verify_request};
pub use token_store::{ACCESS_TOKEN_TTL, AccessToken, TokenStore};
