//! Inference backend boundary.
//!
//! The engine itself is opaque: it accepts a prompt plus sampling parameters
//! and eventually yields generated text and a finish signal. Batching and
//! scheduling of concurrent submissions are the backend's business.
//!
//! [`EchoBackend`] is a deterministic development engine used when no real
//! model runtime is linked in. It honours `max_tokens`, stop sequences and the
//! `max_num_seqs` concurrency limit so the gateway can be exercised end to end.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::inference::engine::RequestHandle;
use crate::inference::sampling::SamplingConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("failed to construct engine: {0}")]
    Load(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("engine is stopped")]
    Stopped,
}

/// Why the engine ended a generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    Stop,
    Length,
    Error,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::Error => "error",
        }
    }
}

/// Raw output of one generation.
#[derive(Debug, Clone, PartialEq)]
pub struct BackendOutput {
    pub text: String,
    pub finish: FinishReason,
}

/// A constructed inference engine. Must tolerate concurrent `generate` calls.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn generate(
        &self,
        handle: &RequestHandle,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<BackendOutput, BackendError>;

    /// Stop accepting new generations.
    fn stop(&self) {}
}

/// Builds the engine. Called once, on a blocking thread, during initialization.
pub trait BackendFactory: Send + Sync {
    fn build(&self, config: &EngineConfig) -> Result<Arc<dyn InferenceBackend>, BackendError>;
}

/// Reject sizing knobs no engine could start with.
pub fn validate_engine_config(config: &EngineConfig) -> Result<(), BackendError> {
    if config.model.trim().is_empty() {
        return Err(BackendError::Load("model identifier is empty".into()));
    }
    if !(config.gpu_memory_utilization > 0.0 && config.gpu_memory_utilization <= 1.0) {
        return Err(BackendError::Load(format!(
            "gpu_memory_utilization {} is outside (0, 1]",
            config.gpu_memory_utilization
        )));
    }
    if config.max_num_seqs == 0 {
        return Err(BackendError::Load("max_num_seqs must be at least 1".into()));
    }
    if config.tensor_parallel_size == 0 || config.pipeline_parallel_size == 0 {
        return Err(BackendError::Load("parallel sizes must be at least 1".into()));
    }
    Ok(())
}

/// Factory for [`EchoBackend`].
#[derive(Debug, Default, Clone)]
pub struct EchoBackendFactory;

impl BackendFactory for EchoBackendFactory {
    fn build(&self, config: &EngineConfig) -> Result<Arc<dyn InferenceBackend>, BackendError> {
        validate_engine_config(config)?;

        if config.load_delay_ms > 0 {
            // Stands in for weight loading; runs on a blocking thread.
            std::thread::sleep(Duration::from_millis(config.load_delay_ms));
        }

        info!(
            model = config.model,
            max_num_seqs = config.max_num_seqs,
            tensor_parallel = config.tensor_parallel_size,
            pipeline_parallel = config.pipeline_parallel_size,
            gpu_memory_utilization = config.gpu_memory_utilization,
            "Echo engine constructed"
        );

        Ok(Arc::new(EchoBackend::new(config.max_num_seqs)))
    }
}

/// Deterministic engine that echoes the last user line of the prompt.
pub struct EchoBackend {
    slots: Semaphore,
}

impl EchoBackend {
    pub fn new(max_num_seqs: usize) -> Self {
        Self {
            slots: Semaphore::new(max_num_seqs),
        }
    }

    /// Text the echo engine would produce for `prompt`.
    pub fn render(prompt: &str, sampling: &SamplingConfig) -> BackendOutput {
        let source = prompt
            .lines()
            .rev()
            .find_map(|line| line.strip_prefix("User:"))
            .unwrap_or(prompt)
            .trim();

        let mut text = source.to_string();
        let mut finish = FinishReason::Stop;

        if let Some(cut) = sampling
            .stop
            .iter()
            .filter_map(|s| text.find(s.as_str()))
            .min()
        {
            text.truncate(cut);
        }

        let words: Vec<&str> = text.split_whitespace().collect();
        let limit = sampling.max_tokens as usize;
        if words.len() > limit {
            text = words[..limit].join(" ");
            finish = FinishReason::Length;
        } else {
            text = words.join(" ");
        }

        BackendOutput { text, finish }
    }
}

#[async_trait]
impl InferenceBackend for EchoBackend {
    async fn generate(
        &self,
        handle: &RequestHandle,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<BackendOutput, BackendError> {
        let _slot = self
            .slots
            .acquire()
            .await
            .map_err(|_| BackendError::Stopped)?;

        let output = Self::render(prompt, sampling);
        debug!(
            request_id = %handle,
            finish = output.finish.as_str(),
            chars = output.text.len(),
            "Echo generation finished"
        );
        Ok(output)
    }

    fn stop(&self) {
        self.slots.close();
    }
}
