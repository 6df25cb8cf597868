//! Call-setup webhook route
//!
//! No bearer auth here: requests are authenticated by the telephony
//! provider's signature. Rate limiting is layered on in `main`.

use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::voice::incoming_call;
use crate::state::AppState;
use std::sync::Arc;

/// `POST /incoming-call` - returns stream instructions with a fresh token
pub fn create_voice_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/incoming-call", post(incoming_call))
        .layer(TraceLayer::new_for_http())
}
