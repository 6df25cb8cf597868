pub mod realtime;
pub mod relay;
pub mod telephony;

pub use realtime::{OpenAIRealtime, RealtimeConfig, RealtimeError, RealtimeResult};
pub use relay::{CallSession, RelayError, RelayFrame, run_relay};
pub use telephony::{TelephonyCommand, TelephonyEvent, parse_inbound};
