//! Error types surfaced at the HTTP and WebSocket boundaries
//!
//! - `app_error` - Generic HTTP handler errors
//! - `auth_error` - Call-setup webhook authentication failures
//! - `token_error` - Media-stream access token redemption failures

pub mod app_error;
pub mod auth_error;
pub mod token_error;

pub use app_error::{AppError, AppResult};
pub use auth_error::{AuthError, AuthResult};
pub use token_error::TokenError;
