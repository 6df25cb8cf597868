use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures while authenticating a call-setup webhook
///
/// Every variant is a client error: the request is rejected and no access
/// token is issued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing request signature header")]
    MissingSignature,

    #[error("Invalid request signature")]
    InvalidSignature,

    #[error("Malformed webhook request: {0}")]
    MalformedRequest(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::MissingSignature | AuthError::InvalidSignature => StatusCode::FORBIDDEN,
            AuthError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
