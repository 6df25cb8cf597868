pub mod call_limit;

pub use call_limit::{CallPermit, call_limit_middleware};
