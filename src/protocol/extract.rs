//! Best-effort structured extraction from free-text model output.
//!
//! Parsing never fails past this module: text that is not JSON degrades to
//! `structured: None` plus whatever list-style action steps can be found.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

static FENCED_JSON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```json\r?\n([\s\S]*?)\r?\n```").expect("valid regex"));

static ACTION_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+\.\s*|-\s*|\*\s*)").expect("valid regex"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionStep {
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredOutput {
    /// The model output, untouched.
    pub raw: String,

    /// Parsed JSON, when the output contained any.
    pub structured: Option<Value>,

    /// List items found in the text; empty when `structured` is present.
    pub actions: Vec<ActionStep>,
}

/// Extract JSON (fenced block first, then the whole text) or list-style steps.
pub fn extract_structured(text: &str) -> StructuredOutput {
    let candidate = FENCED_JSON
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(text);

    match serde_json::from_str::<Value>(candidate.trim()) {
        Ok(value) => StructuredOutput {
            raw: text.to_string(),
            structured: Some(value),
            actions: Vec::new(),
        },
        Err(e) => {
            debug!("Model output is not JSON, falling back to text: {e}");
            StructuredOutput {
                raw: text.to_string(),
                structured: None,
                actions: extract_actions(text),
            }
        }
    }
}

/// Lines starting with `N.`, `-` or `*`, prefix stripped.
pub fn extract_actions(text: &str) -> Vec<ActionStep> {
    text.lines()
        .filter(|line| ACTION_PREFIX.is_match(line))
        .map(|line| ACTION_PREFIX.replace(line, "").trim().to_string())
        .filter(|d| !d.is_empty())
        .map(|description| ActionStep { description })
        .collect()
}
