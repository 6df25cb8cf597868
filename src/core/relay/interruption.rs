//! Barge-in detection.
//!
//! The controller is `Playing` from the first audio delta of an assistant
//! response until the response completes or the caller interrupts it. When the
//! caller starts speaking while `Playing`, the assistant item is truncated at
//! the point the caller actually heard and the provider's playback buffer is
//! cleared.

use tracing::debug;

use super::session::SessionState;

/// Interruption state, derived from the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptionState {
    Idle,
    Playing,
}

/// What to do about a speech-started event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interruption {
    /// Nothing is playing
    None,
    /// The response already completed but audio is still queued at the provider
    ClearOnly { stream_sid: Option<String> },
    /// Cut the in-flight item at `audio_end_ms` and clear playback
    Truncate {
        item_id: Option<String>,
        audio_end_ms: u64,
        stream_sid: Option<String>,
    },
}

/// Milliseconds of the current response the caller has heard.
///
/// Media timestamps can arrive out of order relative to the response start,
/// so a negative difference clamps to zero.
#[inline]
pub fn truncation_point(response_start_ms: u64, latest_media_ms: u64) -> u64 {
    latest_media_ms.saturating_sub(response_start_ms)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InterruptionController {
    show_timing_math: bool,
}

impl InterruptionController {
    pub fn new(show_timing_math: bool) -> Self {
        Self { show_timing_math }
    }

    pub fn state(&self, session: &SessionState) -> InterruptionState {
        if session.interruption_armed && session.response_start_timestamp.is_some() {
            InterruptionState::Playing
        } else {
            InterruptionState::Idle
        }
    }

    /// Record that assistant audio for `item_id` is being played.
    ///
    /// A new item restarts the response clock at the latest media timestamp.
    pub fn on_audio_delta(&self, session: &mut SessionState, item_id: Option<&str>) {
        let new_item = match (item_id, session.last_assistant_item.as_deref()) {
            (Some(incoming), Some(current)) => incoming != current,
            (Some(_), None) => true,
            (None, _) => false,
        };

        if session.response_start_timestamp.is_none() || new_item {
            session.response_start_timestamp = Some(session.latest_media_timestamp);
            if self.show_timing_math {
                debug!(
                    response_start_ms = session.latest_media_timestamp,
                    "Setting start timestamp for new response"
                );
            }
        }
        if let Some(item) = item_id {
            session.last_assistant_item = Some(item.to_string());
        }
        session.interruption_armed = true;
    }

    /// Decide how to react to the caller starting to speak.
    pub fn on_speech_started(&self, session: &mut SessionState) -> Interruption {
        match (self.state(session), session.response_start_timestamp) {
            (InterruptionState::Playing, Some(start)) => {
                let elapsed = truncation_point(start, session.latest_media_timestamp);
                if self.show_timing_math {
                    debug!(
                        latest_media_ms = session.latest_media_timestamp,
                        response_start_ms = start,
                        elapsed_ms = elapsed,
                        "Calculating truncation point"
                    );
                }

                let interruption = Interruption::Truncate {
                    item_id: session.last_assistant_item.take(),
                    audio_end_ms: elapsed,
                    stream_sid: session.stream_sid.clone(),
                };
                session.mark_queue.clear();
                session.response_start_timestamp = None;
                session.interruption_armed = false;
                interruption
            }
            _ if !session.mark_queue.is_empty() => {
                session.mark_queue.clear();
                Interruption::ClearOnly {
                    stream_sid: session.stream_sid.clone(),
                }
            }
            _ => Interruption::None,
        }
    }

    /// The response finished or the caller stopped speaking.
    ///
    /// Pending marks stay queued; their audio may still be playing.
    pub fn on_response_finished(&self, session: &mut SessionState) {
        session.response_start_timestamp = None;
        session.interruption_armed = false;
    }
}
