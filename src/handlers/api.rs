use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check: 200 while new calls can be accepted, 503 at capacity
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.at_call_capacity() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse { status: "at_capacity" }),
        )
    } else {
        (StatusCode::OK, Json(HealthResponse { status: "ok" }))
    }
}
