//! Sampling policy: validates request knobs into a [`SamplingConfig`].
//!
//! Out-of-range values are rejected, never clamped.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::config::SamplingDefaults;
use crate::error::InvalidParameter;

pub const TEMPERATURE_RANGE: RangeInclusive<f64> = 0.0..=2.0;
pub const TOP_P_RANGE: RangeInclusive<f64> = 0.0..=1.0;
pub const MAX_TOKENS_RANGE: RangeInclusive<i64> = 1..=4096;

/// `stop` as sent on the wire: a single string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    fn into_vec(self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s],
            StopSequences::Many(v) => v,
        }
    }
}

/// Raw, unvalidated sampling fields taken from a request.
#[derive(Debug, Clone, Default)]
pub struct SamplingRequest {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<i64>,
    pub stop: Option<StopSequences>,
}

/// Validated sampling parameters handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SamplingConfig {
    /// Temperature in [0, 2] (0.0 = greedy).
    pub temperature: f64,

    /// Nucleus cutoff in [0, 1].
    pub top_p: f64,

    /// Maximum tokens to generate, in [1, 4096].
    pub max_tokens: u32,

    /// Literal stop sequences, deduplicated in first-seen order. Empty = none.
    pub stop: Vec<String>,
}

/// Fills omitted fields from configured defaults, then validates bounds.
#[derive(Debug, Clone, Default)]
pub struct SamplingPolicy {
    defaults: SamplingDefaults,
}

impl SamplingPolicy {
    pub fn new(defaults: SamplingDefaults) -> Self {
        Self { defaults }
    }

    pub fn validate(&self, raw: SamplingRequest) -> Result<SamplingConfig, InvalidParameter> {
        let temperature = raw.temperature.unwrap_or(self.defaults.temperature);
        if !TEMPERATURE_RANGE.contains(&temperature) {
            return Err(InvalidParameter::new(
                "temperature",
                format!("{temperature} is outside [0, 2]"),
            ));
        }

        let top_p = raw.top_p.unwrap_or(self.defaults.top_p);
        if !TOP_P_RANGE.contains(&top_p) {
            return Err(InvalidParameter::new(
                "top_p",
                format!("{top_p} is outside [0, 1]"),
            ));
        }

        let max_tokens = raw.max_tokens.unwrap_or(self.defaults.max_tokens);
        if !MAX_TOKENS_RANGE.contains(&max_tokens) {
            return Err(InvalidParameter::new(
                "max_tokens",
                format!("{max_tokens} is outside [1, 4096]"),
            ));
        }

        let mut stop: Vec<String> = Vec::new();
        for seq in raw.stop.map(StopSequences::into_vec).unwrap_or_default() {
            if seq.is_empty() {
                return Err(InvalidParameter::new("stop", "stop sequences must be non-empty"));
            }
            if !stop.contains(&seq) {
                stop.push(seq);
            }
        }

        Ok(SamplingConfig {
            temperature,
            top_p,
            max_tokens: max_tokens as u32,
            stop,
        })
    }
}
