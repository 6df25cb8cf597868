//! Media-stream endpoint tests over a real socket
//!
//! A server is bound to an ephemeral port and driven with a WebSocket client
//! acting as the telephony provider.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, middleware};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};

use phonebridge::{
    ServerConfig, config::EnvConfig, middleware::call_limit_middleware, routes, state::AppState,
};

async fn unused_realtime_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());
    drop(listener);
    url
}

async fn state(max_calls: Option<&str>) -> Arc<AppState> {
    state_with_realtime(unused_realtime_url().await, max_calls)
}

fn state_with_realtime(realtime_url: String, max_calls: Option<&str>) -> Arc<AppState> {
    let mut vars: HashMap<&str, String> = HashMap::from([
        ("TWILIO_AUTH_TOKEN", "12345".to_string()),
        ("OPENAI_API_KEY", "sk-test".to_string()),
        ("VOICE", "alloy".to_string()),
        ("ASSISTANT_INSTRUCTIONS", "Be brief".to_string()),
        ("ASSISTANT_GREETING", String::new()),
        ("REALTIME_URL", realtime_url),
    ]);
    if let Some(max) = max_calls {
        vars.insert("MAX_CONCURRENT_CALLS", max.to_string());
    }

    let config =
        ServerConfig::from_sources(EnvConfig::from_lookup(|key| vars.get(key).cloned()), None)
            .unwrap();
    AppState::new(config)
}

async fn serve(state: Arc<AppState>) -> SocketAddr {
    let app = Router::new()
        .merge(
            routes::media::create_media_router()
                .layer(middleware::from_fn_with_state(state.clone(), call_limit_middleware)),
        )
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

type CallerSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Realtime service stand-in for one call.
///
/// Completes the session handshake, reports the first caller-audio message it
/// receives, answers with one assistant audio delta, and closes when told to.
async fn mock_realtime() -> (String, oneshot::Receiver<Value>, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());
    let (audio_tx, audio_rx) = oneshot::channel();
    let (close_tx, close_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let update = ws.next().await.unwrap().unwrap();
        let update: Value = serde_json::from_str(update.to_text().unwrap()).unwrap();
        assert_eq!(update["type"], "session.update");
        let updated = json!({ "type": "session.updated", "session": update["session"] });
        ws.send(Message::Text(updated.to_string().into())).await.unwrap();

        let append = ws.next().await.unwrap().unwrap();
        let append: Value = serde_json::from_str(append.to_text().unwrap()).unwrap();
        let _ = audio_tx.send(append);

        let delta = json!({
            "type": "response.output_audio.delta",
            "response_id": "resp_1",
            "item_id": "item_1",
            "output_index": 0,
            "content_index": 0,
            "delta": "//79"
        });
        ws.send(Message::Text(delta.to_string().into())).await.unwrap();

        let _ = close_rx.await;
        let _ = ws.close(None).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    (url, audio_rx, close_tx)
}

/// Open a stream and send `connected` + `start`.
async fn open_stream(addr: SocketAddr, token: Option<&str>) -> CallerSocket {
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/media-stream"))
        .await
        .unwrap();

    let mut params = serde_json::Map::new();
    if let Some(token) = token {
        params.insert("token".to_string(), json!(token));
    }
    let connected = json!({ "event": "connected", "protocol": "Call", "version": "1.0.0" });
    let start = json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {
            "streamSid": "MZ1",
            "callSid": "CA1",
            "customParameters": params
        }
    });
    ws.send(Message::Text(connected.to_string().into())).await.unwrap();
    ws.send(Message::Text(start.to_string().into())).await.unwrap();
    ws
}

/// Next text message from the server, parsed.
async fn next_json(ws: &mut CallerSocket) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("server answered")
            .expect("connection open")
            .unwrap();
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text message, got {other:?}"),
        }
    }
}

/// Open a stream, send `connected` + `start`, and return the close frame.
async fn start_stream(addr: SocketAddr, token: Option<&str>) -> (u16, String) {
    let mut ws = open_stream(addr, token).await;

    loop {
        let msg = timeout(Duration::from_secs(15), ws.next())
            .await
            .expect("server answered")
            .expect("connection open")
            .unwrap();
        if let Message::Close(Some(frame)) = msg {
            return (u16::from(frame.code), frame.reason.as_str().to_string());
        }
    }
}

#[tokio::test]
async fn test_missing_token_is_policy_violation() {
    let addr = serve(state(None).await).await;

    let (code, reason) = start_stream(addr, None).await;

    assert_eq!(code, 1008);
    assert_eq!(reason, "Invalid or missing token");
}

#[tokio::test]
async fn test_unknown_token_is_policy_violation() {
    let addr = serve(state(None).await).await;

    let (code, reason) = start_stream(addr, Some("not-a-token")).await;

    assert_eq!(code, 1008);
    assert_eq!(reason, "Invalid or missing token");
}

#[tokio::test]
async fn test_token_is_single_use() {
    let state = state(None).await;
    let token = state.tokens.issue();
    let addr = serve(state.clone()).await;

    // First redemption succeeds; the AI service is unreachable so the call still ends
    let (code, reason) = start_stream(addr, Some(&token.value)).await;
    assert_eq!(code, 1011);
    assert_eq!(reason, "AI service unavailable");

    let (code, reason) = start_stream(addr, Some(&token.value)).await;
    assert_eq!(code, 1008);
    assert_eq!(reason, "Token already used");
}

#[tokio::test]
async fn test_unexpected_first_event() {
    let addr = serve(state(None).await).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/media-stream"))
        .await
        .unwrap();

    let media = json!({ "event": "media", "media": { "timestamp": "0", "payload": "AAAA" } });
    ws.send(Message::Text(media.to_string().into())).await.unwrap();

    let msg = timeout(Duration::from_secs(5), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), 1008),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn test_call_limit_rejects_upgrade() {
    let state = state(Some("1")).await;
    let _busy = state.try_acquire_call().unwrap();
    let addr = serve(state.clone()).await;

    let err = tokio_tungstenite::connect_async(format!("ws://{addr}/media-stream"))
        .await
        .unwrap_err();

    match err {
        tungstenite::Error::Http(response) => assert_eq!(response.status(), 503),
        other => panic!("expected HTTP rejection, got {other:?}"),
    }
    assert_eq!(state.active_calls(), 1);
}

#[tokio::test]
async fn test_call_slot_released_after_call() {
    let state = state(Some("1")).await;
    let addr = serve(state.clone()).await;

    let (code, _) = start_stream(addr, None).await;
    assert_eq!(code, 1008);

    // The handler drops its slot once the rejected call is torn down
    for _ in 0..50 {
        if state.active_calls() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.active_calls(), 0);
}

#[tokio::test]
async fn test_call_relays_audio_both_ways() {
    let (realtime_url, audio_rx, close_ai) = mock_realtime().await;
    let state = state_with_realtime(realtime_url, None);
    let token = state.tokens.issue();
    let addr = serve(state.clone()).await;

    let mut ws = open_stream(addr, Some(&token.value)).await;
    let media = json!({
        "event": "media",
        "streamSid": "MZ1",
        "media": { "track": "inbound", "chunk": "1", "timestamp": "20", "payload": "AQID" }
    });
    ws.send(Message::Text(media.to_string().into())).await.unwrap();

    // Caller audio reaches the AI as an append
    let append = timeout(Duration::from_secs(5), audio_rx).await.unwrap().unwrap();
    assert_eq!(append["type"], "input_audio_buffer.append");
    assert_eq!(append["audio"], "AQID");

    // Assistant audio reaches the caller, followed by a playback mark
    let outbound = next_json(&mut ws).await;
    assert_eq!(
        outbound,
        json!({ "event": "media", "streamSid": "MZ1", "media": { "payload": "//79" } })
    );
    let mark = next_json(&mut ws).await;
    assert_eq!(
        mark,
        json!({ "event": "mark", "streamSid": "MZ1", "mark": { "name": "responsePart-1" } })
    );

    // The AI hanging up ends the call on the caller's side too
    close_ai.send(()).unwrap();
    loop {
        match timeout(Duration::from_secs(5), ws.next()).await.unwrap() {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(_)) => continue,
        }
    }

    for _ in 0..50 {
        if state.active_calls() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.active_calls(), 0);
}
