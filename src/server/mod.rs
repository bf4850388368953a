//! HTTP server providing an OpenAI-compatible API.
//!
//! - [`openai_api`]: Request/response types, router and route handlers
//! - [`metrics`]: Prometheus counters and gauges
//! - [`shutdown`]: Signal handling and engine drain on shutdown

pub mod metrics;
pub mod openai_api;
pub mod shutdown;
