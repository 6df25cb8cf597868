//! Duplex relay between the media stream and the AI connection.
//!
//! Two loops run per call:
//! - telephony → AI: caller audio becomes `input_audio_buffer.append`
//! - AI → telephony: assistant audio becomes `media` + `mark`, and barge-in
//!   produces `conversation.item.truncate` + `clear`
//!
//! The loops never touch a socket directly. They read frames from a stream and
//! push serialized messages into per-connection channels drained by writer
//! tasks, so they can be driven by anything that yields `RelayFrame`s.
//! When either loop ends, the shared cancellation token fires: the other loop
//! stops and the writers drop whatever is still queued.

use std::fmt::Display;
use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::session::{CallSession, InboundAction, OutboundAction};
use crate::core::realtime::{ServerEvent, is_logged_event};
use crate::core::telephony::parse_inbound;

/// Capacity of each outgoing message channel
pub const RELAY_CHANNEL_CAPACITY: usize = 256;

/// A frame read from either connection, reduced to what the relay needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    Text(String),
    Close,
    /// Ping, pong or binary; nothing to relay
    Ignored,
}

impl From<tungstenite::Message> for RelayFrame {
    fn from(msg: tungstenite::Message) -> Self {
        match msg {
            tungstenite::Message::Text(text) => RelayFrame::Text(text.as_str().to_owned()),
            tungstenite::Message::Close(_) => RelayFrame::Close,
            _ => RelayFrame::Ignored,
        }
    }
}

/// Errors raised inside a forwarding loop.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// The connection is unusable; the call is torn down
    #[error("Transport error: {0}")]
    Transport(String),

    /// One message could not be used; it is dropped
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl RelayError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, RelayError::Transport(_))
    }
}

/// Why a forwarding loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The remote side closed or the stream ended
    Closed,
    /// Telephony sent `stop`
    Stopped,
    /// The sibling loop ended first
    Cancelled,
}

/// How both loops of a call ended.
#[derive(Debug)]
pub struct RelayOutcome {
    pub telephony: Result<LoopExit, RelayError>,
    pub ai: Result<LoopExit, RelayError>,
}

async fn send_json<T: serde::Serialize>(
    tx: &mpsc::Sender<String>,
    message: &T,
    target: &'static str,
) -> Result<(), RelayError> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!(target_connection = target, error = %e, "Failed to serialize message");
            return Ok(());
        }
    };
    tx.send(json)
        .await
        .map_err(|_| RelayError::Transport(format!("{target} connection closed")))
}

/// Forward caller audio to the AI until the media stream ends.
pub async fn telephony_to_ai<S, E>(
    session: &CallSession,
    mut inbound: S,
    ai_tx: &mpsc::Sender<String>,
) -> Result<LoopExit, RelayError>
where
    S: Stream<Item = Result<RelayFrame, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(RelayFrame::Text(text)) => text,
            Ok(RelayFrame::Close) => return Ok(LoopExit::Closed),
            Ok(RelayFrame::Ignored) => continue,
            Err(e) => return Err(RelayError::Transport(e.to_string())),
        };

        let event = match parse_inbound(&text) {
            Ok(event) => event,
            Err(e) if e.is_fatal() => return Err(RelayError::Transport(e.to_string())),
            Err(e) => {
                let err = RelayError::Protocol(e.to_string());
                warn!(error = %err, "Dropping telephony message");
                continue;
            }
        };

        match session.on_telephony_event(event) {
            InboundAction::Forward(event) => send_json(ai_tx, &event, "ai").await?,
            InboundAction::None => {}
            InboundAction::Stop => return Ok(LoopExit::Stopped),
        }
    }

    Ok(LoopExit::Closed)
}

/// Forward assistant audio to the caller and handle barge-in.
pub async fn ai_to_telephony<S, E>(
    session: &CallSession,
    mut inbound: S,
    telephony_tx: &mpsc::Sender<String>,
    ai_tx: &mpsc::Sender<String>,
) -> Result<LoopExit, RelayError>
where
    S: Stream<Item = Result<RelayFrame, E>> + Unpin,
    E: Display,
{
    while let Some(frame) = inbound.next().await {
        let text = match frame {
            Ok(RelayFrame::Text(text)) => text,
            Ok(RelayFrame::Close) => return Ok(LoopExit::Closed),
            Ok(RelayFrame::Ignored) => continue,
            Err(e) => return Err(RelayError::Transport(e.to_string())),
        };

        let value: Value = match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %RelayError::Protocol(e.to_string()), "Dropping AI message");
                continue;
            }
        };

        let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
        if is_logged_event(event_type) {
            info!(event_type, event = %value, "Received AI event");
        }

        let event: ServerEvent = match serde_json::from_value(value) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %RelayError::Protocol(e.to_string()), "Dropping AI message");
                continue;
            }
        };

        for action in session.on_ai_event(event) {
            match action {
                OutboundAction::Telephony(command) => {
                    send_json(telephony_tx, &command, "telephony").await?
                }
                OutboundAction::Ai(event) => send_json(ai_tx, &event, "ai").await?,
            }
        }
    }

    Ok(LoopExit::Closed)
}

/// Run both loops for one call until either ends.
///
/// `cancel` is shared with the writer tasks. It is cancelled as soon as
/// either loop returns, so nothing queued after that point reaches a socket.
pub async fn run_relay<TS, TE, AS, AE>(
    session: Arc<CallSession>,
    telephony_in: TS,
    ai_in: AS,
    telephony_tx: mpsc::Sender<String>,
    ai_tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> RelayOutcome
where
    TS: Stream<Item = Result<RelayFrame, TE>> + Send + Unpin + 'static,
    TE: Display + Send + 'static,
    AS: Stream<Item = Result<RelayFrame, AE>> + Send + Unpin + 'static,
    AE: Display + Send + 'static,
{
    let telephony_task = {
        let session = Arc::clone(&session);
        let cancel = cancel.clone();
        let ai_tx = ai_tx.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Ok(LoopExit::Cancelled),
                result = telephony_to_ai(&session, telephony_in, &ai_tx) => result,
            };
            cancel.cancel();
            result
        })
    };

    let ai_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Ok(LoopExit::Cancelled),
                result = ai_to_telephony(&session, ai_in, &telephony_tx, &ai_tx) => result,
            };
            cancel.cancel();
            result
        })
    };

    let (telephony, ai) = tokio::join!(telephony_task, ai_task);
    let outcome = RelayOutcome {
        telephony: flatten_join(telephony),
        ai: flatten_join(ai),
    };

    debug!(telephony = ?outcome.telephony, ai = ?outcome.ai, "Relay finished");
    outcome
}

fn flatten_join(
    joined: Result<Result<LoopExit, RelayError>, tokio::task::JoinError>,
) -> Result<LoopExit, RelayError> {
    joined.unwrap_or_else(|e| Err(RelayError::Transport(format!("relay task failed: {e}"))))
}

/// Drain a channel into a WebSocket sink, then close the sink.
///
/// Stops at the first of: channel closed, `cancel` fired, send failed. Frames
/// still queued when `cancel` fires are dropped. A failed send means the
/// connection is gone; the channel is dropped so the loop feeding it fails on
/// its next send.
pub fn spawn_writer<K, M, F>(
    mut rx: mpsc::Receiver<String>,
    mut sink: K,
    wrap: F,
    target: &'static str,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    K: Sink<M> + Send + Unpin + 'static,
    K::Error: Display,
    M: Send + 'static,
    F: Fn(String) -> M + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if !rx.is_empty() {
                        debug!(target_connection = target, dropped = rx.len(), "Dropping queued frames");
                    }
                    break;
                }
                json = rx.recv() => match json {
                    Some(json) => json,
                    None => break,
                },
            };
            if let Err(e) = sink.send(wrap(json)).await {
                debug!(target_connection = target, error = %e, "Writer stopped");
                return;
            }
        }
        if let Err(e) = sink.close().await {
            debug!(target_connection = target, error = %e, "Error closing connection");
        }
    })
}
