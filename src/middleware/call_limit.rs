//! Concurrent call limit for media-stream connections
//!
//! Each WebSocket upgrade on the media-stream route reserves a call slot
//! before the handler runs. The slot travels to the handler as a request
//! extension and is released when the call ends.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use phonebridge::middleware::call_limit_middleware;
//!
//! let app = Router::new()
//!     .route("/media-stream", get(media_stream_handler))
//!     .layer(axum::middleware::from_fn_with_state(
//!         state.clone(),
//!         call_limit_middleware,
//!     ));
//! ```

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::{AppState, CallLimitError, CallSlot};

/// Extension carrying the reserved slot to the handler.
#[derive(Clone, Debug)]
pub struct CallPermit(pub Arc<CallSlot>);

/// Reserve a call slot for WebSocket upgrades, or reject with 503.
///
/// Non-upgrade requests pass through untouched.
pub async fn call_limit_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    match state.try_acquire_call() {
        Ok(slot) => {
            request.extensions_mut().insert(CallPermit(Arc::new(slot)));
            next.run(request).await
        }
        Err(CallLimitError::GlobalLimitReached) => {
            tracing::warn!(
                active_calls = state.active_calls(),
                "Rejecting media stream: call limit reached"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server at capacity. Please try again later.",
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use axum::{Extension, Router, routing::get};
    use tower::ServiceExt;

    fn app(state: Arc<AppState>) -> Router {
        Router::new()
            .route(
                "/media-stream",
                get(|permit: Option<Extension<CallPermit>>| async move {
                    if permit.is_some() { "permit" } else { "none" }
                }),
            )
            .layer(axum::middleware::from_fn_with_state(
                state.clone(),
                call_limit_middleware,
            ))
            .with_state(state)
    }

    fn upgrade_request() -> Request<Body> {
        Request::builder()
            .uri("/media-stream")
            .header("upgrade", "websocket")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn test_plain_request_passes_through() {
        let state = AppState::new(test_config());
        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .uri("/media-stream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.active_calls(), 0);
    }

    #[tokio::test]
    async fn test_upgrade_rejected_at_capacity() {
        let mut config = test_config();
        config.max_concurrent_calls = Some(1);
        let state = AppState::new(config);
        let _held = state.try_acquire_call().unwrap();

        let response = app(state.clone()).oneshot(upgrade_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_slot_released_after_request() {
        let mut config = test_config();
        config.max_concurrent_calls = Some(1);
        let state = AppState::new(config);

        let response = app(state.clone()).oneshot(upgrade_request()).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.active_calls(), 0);
    }
}
