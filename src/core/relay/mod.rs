//! Per-call duplex relay.
//!
//! - `session` - Call state shared by both forwarding loops
//! - `interruption` - Barge-in state machine
//! - `engine` - The forwarding loops and their lifecycle

pub mod engine;
pub mod interruption;
pub mod session;

pub use engine::{
    LoopExit, RELAY_CHANNEL_CAPACITY, RelayError, RelayFrame, RelayOutcome, ai_to_telephony,
    run_relay, spawn_writer, telephony_to_ai,
};
pub use interruption::{Interruption, InterruptionController, InterruptionState, truncation_point};
pub use session::{CallSession, InboundAction, OutboundAction, PendingMark, SessionState};
