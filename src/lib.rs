//! inference-gateway: OpenAI-compatible HTTP gateway in front of a single,
//! shared LLM inference engine.
//!
//! Request flow:
//!   HTTP → shape validation → prompt formatting (chat) → sampling policy
//!   → engine adapter (submit, await) → response assembly → HTTP
//!
//! The engine is constructed once before traffic is admitted and drained on
//! shutdown; its lifecycle phase gates every generation request.

pub mod config;
pub mod error;
pub mod inference;
pub mod protocol;
pub mod server;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Time since the Unix epoch; zero if the clock is before it.
pub(crate) fn unix_now() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
}
