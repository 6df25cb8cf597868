//! Per-call relay state.
//!
//! A `CallSession` is created once the media-stream token has been redeemed
//! and lives until either connection closes. Both forwarding loops share it;
//! each event is applied under a short lock and turned into outgoing messages,
//! so no lock is held across an await point.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use super::interruption::{Interruption, InterruptionController, InterruptionState};
use crate::core::realtime::{ClientEvent, ServerEvent};
use crate::core::telephony::{StreamStart, TelephonyCommand, TelephonyEvent};

/// Prefix of the marks sent after each assistant audio chunk
pub const MARK_NAME_PREFIX: &str = "responsePart";

/// A mark sent to telephony and not yet acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMark {
    pub name: String,
    /// Media timestamp when the mark was sent
    pub sent_at_ms: u64,
}

/// Mutable bookkeeping for one call.
#[derive(Debug, Default)]
pub struct SessionState {
    pub stream_sid: Option<String>,
    pub call_sid: Option<String>,
    /// Latest media timestamp reported by telephony, in ms since stream start
    pub latest_media_timestamp: u64,
    /// Telephony clock when the in-flight response began playing
    pub response_start_timestamp: Option<u64>,
    /// Assistant item currently being played
    pub last_assistant_item: Option<String>,
    pub mark_queue: VecDeque<PendingMark>,
    pub interruption_armed: bool,
    marks_sent: u64,
}

impl SessionState {
    pub fn new(stream_sid: impl Into<String>) -> Self {
        Self {
            stream_sid: Some(stream_sid.into()),
            ..Default::default()
        }
    }

    fn restart(&mut self, start: StreamStart) {
        *self = Self {
            stream_sid: Some(start.stream_sid),
            call_sid: start.call_sid,
            marks_sent: self.marks_sent,
            ..Default::default()
        };
    }

    fn next_mark_name(&mut self) -> String {
        self.marks_sent += 1;
        format!("{MARK_NAME_PREFIX}-{}", self.marks_sent)
    }
}

/// Result of applying a telephony event.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundAction {
    /// Send this event to the AI
    Forward(ClientEvent),
    /// Bookkeeping only
    None,
    /// The stream ended
    Stop,
}

/// A message produced by an AI event.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundAction {
    Telephony(TelephonyCommand),
    Ai(ClientEvent),
}

/// Shared state of one relayed call.
#[derive(Debug)]
pub struct CallSession {
    state: Mutex<SessionState>,
    controller: InterruptionController,
}

impl CallSession {
    pub fn new(start: StreamStart, show_timing_math: bool) -> Self {
        let mut state = SessionState::default();
        state.restart(start);
        Self {
            state: Mutex::new(state),
            controller: InterruptionController::new(show_timing_math),
        }
    }

    pub fn stream_sid(&self) -> Option<String> {
        self.state.lock().stream_sid.clone()
    }

    pub fn interruption_state(&self) -> InterruptionState {
        self.controller.state(&self.state.lock())
    }

    pub fn pending_marks(&self) -> usize {
        self.state.lock().mark_queue.len()
    }

    /// Apply a message from the media stream.
    pub fn on_telephony_event(&self, event: TelephonyEvent) -> InboundAction {
        let mut state = self.state.lock();
        match event {
            TelephonyEvent::Media(chunk) => {
                state.latest_media_timestamp = chunk.timestamp;
                InboundAction::Forward(ClientEvent::audio_append(chunk.payload))
            }
            TelephonyEvent::Start(start) => {
                info!(stream_sid = %start.stream_sid, "Incoming stream has started");
                state.restart(start);
                InboundAction::None
            }
            TelephonyEvent::Mark { name } => {
                match state.mark_queue.pop_front() {
                    Some(mark) if name.as_deref() != Some(mark.name.as_str()) => debug!(
                        expected = %mark.name,
                        received = ?name,
                        "Mark acknowledgment out of order"
                    ),
                    Some(_) => {}
                    None => debug!(received = ?name, "Mark acknowledgment with empty queue"),
                }
                InboundAction::None
            }
            TelephonyEvent::Stop => {
                info!(stream_sid = ?state.stream_sid, "Incoming stream has stopped");
                InboundAction::Stop
            }
            TelephonyEvent::Connected => InboundAction::None,
        }
    }

    /// Apply an event from the AI connection.
    pub fn on_ai_event(&self, event: ServerEvent) -> Vec<OutboundAction> {
        let mut state = self.state.lock();
        match event {
            ServerEvent::AudioDelta { delta, item_id, .. } => {
                let Some(stream_sid) = state.stream_sid.clone() else {
                    debug!("Dropping assistant audio before stream start");
                    return Vec::new();
                };

                self.controller.on_audio_delta(&mut state, item_id.as_deref());

                let name = state.next_mark_name();
                let sent_at_ms = state.latest_media_timestamp;
                state.mark_queue.push_back(PendingMark {
                    name: name.clone(),
                    sent_at_ms,
                });

                vec![
                    OutboundAction::Telephony(TelephonyCommand::media(stream_sid.clone(), delta)),
                    OutboundAction::Telephony(TelephonyCommand::mark(stream_sid, name)),
                ]
            }
            ServerEvent::SpeechStarted { .. } => {
                debug!("Speech started detected");
                match self.controller.on_speech_started(&mut state) {
                    Interruption::None => Vec::new(),
                    Interruption::ClearOnly { stream_sid } => stream_sid
                        .map(|sid| vec![OutboundAction::Telephony(TelephonyCommand::clear(sid))])
                        .unwrap_or_default(),
                    Interruption::Truncate {
                        item_id,
                        audio_end_ms,
                        stream_sid,
                    } => {
                        info!(
                            item_id = ?item_id,
                            audio_end_ms,
                            "Interrupting response"
                        );
                        let mut actions = Vec::with_capacity(2);
                        if let Some(item) = item_id {
                            actions.push(OutboundAction::Ai(ClientEvent::truncate(
                                item,
                                audio_end_ms,
                            )));
                        }
                        if let Some(sid) = stream_sid {
                            actions.push(OutboundAction::Telephony(TelephonyCommand::clear(sid)));
                        }
                        actions
                    }
                }
            }
            ServerEvent::SpeechStopped { .. } | ServerEvent::ResponseDone { .. } => {
                self.controller.on_response_finished(&mut state);
                Vec::new()
            }
            ServerEvent::Error { error } => {
                error!(
                    error_type = ?error.error_type,
                    code = ?error.code,
                    message = %error.message,
                    "AI service reported an error"
                );
                Vec::new()
            }
            ServerEvent::SessionCreated { .. }
            | ServerEvent::SessionUpdated { .. }
            | ServerEvent::Unknown => Vec::new(),
        }
    }
}
