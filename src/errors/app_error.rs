use axum::response::{IntoResponse, Response};
use thiserror::Error;

use super::auth_error::AuthError;

/// Errors returned from HTTP handlers
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Auth(err) => err.into_response(),
        }
    }
}
