//! Media-stream WebSocket route

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::core::telephony::MEDIA_STREAM_PATH;
use crate::handlers::media_stream_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the media-stream router
///
/// # Endpoint
///
/// `GET /media-stream` - WebSocket upgrade for one call's audio
///
/// The concurrent-call limit middleware is applied by the caller so it wraps
/// the upgrade.
pub fn create_media_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(MEDIA_STREAM_PATH, get(media_stream_handler))
        .layer(TraceLayer::new_for_http())
}
