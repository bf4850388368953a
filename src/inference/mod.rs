//! LLM inference engine boundary.
//!
//! - [`engine`]: Engine adapter, request handles and submission
//! - [`lifecycle`]: Process-wide engine lifecycle state machine
//! - [`backend`]: Backend trait, factory and the built-in echo engine
//! - [`sampling`]: Sampling parameter validation

pub mod backend;
pub mod engine;
pub mod lifecycle;
pub mod sampling;
