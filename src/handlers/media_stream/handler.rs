//! Media-stream WebSocket handler
//!
//! One connection per call. After the handshake redeems the access token the
//! handler opens the AI connection and hands both sockets to the relay engine.

use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::handshake::{
    CLOSE_INTERNAL_ERROR, HANDSHAKE_TIMEOUT, HandshakeError, authorize, await_stream_start,
};
use crate::core::realtime::OpenAIRealtime;
use crate::core::relay::{CallSession, RELAY_CHANNEL_CAPACITY, RelayFrame, run_relay, spawn_writer};
use crate::middleware::CallPermit;
use crate::state::AppState;

/// Maximum WebSocket frame size (1 MB)
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum WebSocket message size (1 MB)
const MAX_WS_MESSAGE_SIZE: usize = 1024 * 1024;

/// Query parameters accepted on the media-stream URL
#[derive(Debug, Default, Deserialize)]
pub struct MediaStreamQuery {
    pub token: Option<String>,
}

impl From<Message> for RelayFrame {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => RelayFrame::Text(text.as_str().to_owned()),
            Message::Close(_) => RelayFrame::Close,
            _ => RelayFrame::Ignored,
        }
    }
}

/// Media-stream WebSocket handler
///
/// Upgrades the connection; the handshake and relay run on the upgraded socket.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MediaStreamQuery>,
    permit: Option<Extension<CallPermit>>,
) -> Response {
    debug!("Media stream upgrade requested");
    let permit = permit.map(|Extension(permit)| permit);
    let span = info_span!("call", call_id = %Uuid::new_v4());

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| {
            handle_media_stream(socket, state, query.token, permit).instrument(span)
        })
}

/// Run one call from handshake to teardown. The permit is held until return.
async fn handle_media_stream(
    socket: WebSocket,
    state: Arc<AppState>,
    query_token: Option<String>,
    _permit: Option<CallPermit>,
) {
    let (mut sender, receiver) = socket.split();
    let mut inbound = receiver.map(|frame| frame.map(RelayFrame::from));

    let handshake = async {
        let start = await_stream_start(&mut inbound).await?;
        authorize(&state.tokens, &start, query_token.as_deref())?;
        Ok::<_, HandshakeError>(start)
    };
    let start = match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake).await {
        Ok(Ok(start)) => start,
        Ok(Err(e)) => {
            warn!(error = %e, "Media stream rejected");
            reject(&mut sender, &e).await;
            return;
        }
        Err(_) => {
            warn!("Media stream handshake timed out");
            reject(&mut sender, &HandshakeError::Timeout).await;
            return;
        }
    };
    info!(stream_sid = %start.stream_sid, call_sid = ?start.call_sid, "Client connected with valid token");

    let ai_ws = match OpenAIRealtime::new(state.config.realtime_config()) {
        Ok(client) => client.connect().await,
        Err(e) => Err(e),
    };
    let ai_ws = match ai_ws {
        Ok(ws) => ws,
        Err(e) => {
            error!(error = %e, "Failed to open AI connection");
            close(&mut sender, CLOSE_INTERNAL_ERROR, "AI service unavailable").await;
            return;
        }
    };

    let session = Arc::new(CallSession::new(start, state.config.show_timing_math));
    let (ai_sink, ai_stream) = ai_ws.split();

    let (telephony_tx, telephony_rx) = mpsc::channel::<String>(RELAY_CHANNEL_CAPACITY);
    let (ai_tx, ai_rx) = mpsc::channel::<String>(RELAY_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();

    let telephony_writer = spawn_writer(
        telephony_rx,
        sender,
        |json: String| Message::Text(json.into()),
        "telephony",
        cancel.clone(),
    );
    let ai_writer = spawn_writer(
        ai_rx,
        ai_sink,
        |json: String| tungstenite::Message::Text(json.into()),
        "ai",
        cancel.clone(),
    );

    let outcome = run_relay(
        session,
        inbound,
        ai_stream.map(|frame| frame.map(RelayFrame::from)),
        telephony_tx,
        ai_tx,
        cancel,
    )
    .await;

    let _ = tokio::join!(telephony_writer, ai_writer);

    for (side, result) in [("telephony", &outcome.telephony), ("ai", &outcome.ai)] {
        match result {
            Ok(exit) => debug!(side, exit = ?exit, "Relay loop ended"),
            Err(e) => warn!(side, error = %e, "Relay loop failed"),
        }
    }
    info!("Call ended");
}

async fn reject(sender: &mut SplitSink<WebSocket, Message>, err: &HandshakeError) {
    if let Some((code, reason)) = err.close_frame() {
        close(sender, code, &reason).await;
    }
}

async fn close(sender: &mut SplitSink<WebSocket, Message>, code: u16, reason: &str) {
    let frame = CloseFrame {
        code,
        reason: reason.to_string().into(),
    };
    if let Err(e) = sender.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Failed to send close frame");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_axum_message() {
        assert_eq!(
            RelayFrame::from(Message::Text("{}".into())),
            RelayFrame::Text("{}".to_string())
        );
        assert_eq!(RelayFrame::from(Message::Close(None)), RelayFrame::Close);
        assert_eq!(
            RelayFrame::from(Message::Binary(vec![1, 2].into())),
            RelayFrame::Ignored
        );
    }
}
