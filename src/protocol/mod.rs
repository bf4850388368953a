//! Translation between the HTTP protocol and the engine's flat interface.
//!
//! - [`prompt`]: Conversation → prompt string
//! - [`assembler`]: Engine result → completion response objects
//! - [`extract`]: Best-effort JSON/action extraction from model output

pub mod assembler;
pub mod extract;
pub mod prompt;
