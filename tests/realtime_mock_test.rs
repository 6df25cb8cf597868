//! AI connection setup against a local mock server
//!
//! The mock accepts one WebSocket, records the upgrade request and replays the
//! session handshake so the client's setup sequence can be checked end to end.

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use phonebridge::core::realtime::{OpenAIRealtime, RealtimeConfig, RealtimeError};

struct Recorded {
    uri: String,
    authorization: Option<String>,
    messages: Vec<Value>,
}

/// Accept one connection and answer `session.update` with `reply`.
async fn mock_server(
    reply: Value,
    expected_after_reply: usize,
) -> (String, tokio::task::JoinHandle<Recorded>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut uri = String::new();
        let mut authorization = None;
        let record = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
            uri = req.uri().to_string();
            authorization = req
                .headers()
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            Ok(resp)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, record)
            .await
            .unwrap();

        let mut messages = Vec::new();
        let first = ws.next().await.unwrap().unwrap();
        messages.push(serde_json::from_str::<Value>(first.to_text().unwrap()).unwrap());

        ws.send(Message::Text(reply.to_string().into())).await.unwrap();

        for _ in 0..expected_after_reply {
            let msg = ws.next().await.unwrap().unwrap();
            messages.push(serde_json::from_str::<Value>(msg.to_text().unwrap()).unwrap());
        }

        Recorded {
            uri,
            authorization,
            messages,
        }
    });

    (url, handle)
}

fn config(url: String, greeting: Option<&str>) -> RealtimeConfig {
    RealtimeConfig {
        api_key: "sk-test".to_string(),
        url,
        model: "gpt-realtime".to_string(),
        temperature: 0.8,
        voice: "alloy".to_string(),
        instructions: "You are a helpful assistant.".to_string(),
        greeting: greeting.map(str::to_string),
        tools: vec![json!({ "type": "mcp", "server_label": "zapier" })],
    }
}

#[tokio::test]
async fn test_session_setup_sequence() {
    let updated = json!({
        "type": "session.updated",
        "session": { "tools": [{ "type": "mcp", "server_label": "zapier" }] }
    });
    let (url, server) = mock_server(updated, 2).await;

    let client = OpenAIRealtime::new(config(url, Some("Say hello"))).unwrap();
    let _ws = client.connect().await.unwrap();
    let recorded = server.await.unwrap();

    assert!(recorded.uri.starts_with("/v1/realtime?"));
    assert!(recorded.uri.contains("model=gpt-realtime"));
    assert!(recorded.uri.contains("temperature=0.8"));
    assert_eq!(recorded.authorization.as_deref(), Some("Bearer sk-test"));

    let update = &recorded.messages[0];
    assert_eq!(update["type"], "session.update");
    assert_eq!(update["session"]["type"], "realtime");
    assert_eq!(update["session"]["output_modalities"], json!(["audio"]));
    assert_eq!(update["session"]["audio"]["input"]["format"]["type"], "audio/pcmu");
    assert_eq!(update["session"]["audio"]["input"]["turn_detection"]["type"], "server_vad");
    assert_eq!(update["session"]["audio"]["output"]["format"]["type"], "audio/pcmu");
    assert_eq!(update["session"]["audio"]["output"]["voice"], "alloy");
    assert_eq!(update["session"]["instructions"], "You are a helpful assistant.");
    assert_eq!(update["session"]["tools"][0]["server_label"], "zapier");

    let greeting = &recorded.messages[1];
    assert_eq!(greeting["type"], "conversation.item.create");
    assert_eq!(greeting["item"]["role"], "user");
    assert_eq!(greeting["item"]["content"][0]["type"], "input_text");
    assert_eq!(greeting["item"]["content"][0]["text"], "Say hello");

    assert_eq!(recorded.messages[2], json!({ "type": "response.create" }));
}

#[tokio::test]
async fn test_no_greeting_sends_only_session_update() {
    let (url, server) = mock_server(json!({ "type": "session.updated", "session": {} }), 0).await;

    let client = OpenAIRealtime::new(config(url, None)).unwrap();
    let _ws = client.connect().await.unwrap();
    let recorded = server.await.unwrap();

    assert_eq!(recorded.messages.len(), 1);
    assert_eq!(recorded.messages[0]["type"], "session.update");
}

#[tokio::test]
async fn test_error_event_aborts_setup() {
    let error = json!({
        "type": "error",
        "error": { "type": "invalid_request_error", "code": "bad_voice", "message": "Unknown voice" }
    });
    let (url, server) = mock_server(error, 0).await;

    let client = OpenAIRealtime::new(config(url, Some("Say hello"))).unwrap();
    let err = client.connect().await.unwrap_err();
    server.await.unwrap();

    assert!(matches!(err, RealtimeError::ProviderError(ref msg) if msg == "Unknown voice"));
}

#[tokio::test]
async fn test_unreachable_service() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/v1/realtime", listener.local_addr().unwrap());
    drop(listener);

    let client = OpenAIRealtime::new(config(url, None)).unwrap();
    let err = client.connect().await.unwrap_err();

    assert!(matches!(err, RealtimeError::ConnectionFailed(_)));
}
