//! Engine adapter: sole owner of the inference backend and its lifecycle.
//!
//! The adapter:
//! 1. Constructs the backend once (`initialize`) before traffic is admitted
//! 2. Allocates a process-unique [`RequestHandle`] per submission
//! 3. Forwards prompt + sampling to the backend and awaits exactly one result
//! 4. Stops the backend and drains (best effort) on `shutdown`
//!
//! Concurrent `submit` calls never wait on each other here; the backend lock
//! is only held long enough to clone the handle out of it.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::inference::backend::{BackendError, BackendFactory, FinishReason, InferenceBackend};
use crate::inference::lifecycle::{EngineLifecycle, LifecyclePhase};
use crate::inference::sampling::SamplingConfig;
use crate::unix_now;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("engine is not ready (phase: {0})")]
    Unavailable(LifecyclePhase),

    #[error("{0}")]
    Failure(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("engine construction failed: {0}")]
    FatalInit(String),

    #[error("cannot move engine from {from} to {to}")]
    InvalidTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },
}

/// Correlates one submission with its engine computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestHandle {
    id: String,
    seq: u64,
}

impl RequestHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Monotonic sequence number; never reused within a process.
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Hands out handles of the form `<prefix>-<unix millis>-<seq>`.
#[derive(Debug)]
pub struct HandleAllocator {
    prefix: String,
    next: AtomicU64,
}

impl HandleAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(0),
        }
    }

    pub fn allocate(&self) -> RequestHandle {
        let seq = self.next.fetch_add(1, Ordering::Relaxed);
        let millis = unix_now().as_millis();
        RequestHandle {
            id: format!("{}-{millis}-{seq}", self.prefix),
            seq,
        }
    }

    /// Number of handles issued so far.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

/// Result of one successful submission.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    /// Identifier of the handle that produced this result.
    pub request_id: String,
    pub text: String,
    pub finish_reason: FinishReason,
}

/// Decrements the in-flight count when a submission ends, including when its
/// future is dropped mid-flight.
struct InFlightGuard<'a>(&'a AtomicUsize);

impl<'a> InFlightGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The engine adapter.
pub struct EngineAdapter {
    config: EngineConfig,
    factory: Arc<dyn BackendFactory>,
    lifecycle: EngineLifecycle,
    backend: RwLock<Option<Arc<dyn InferenceBackend>>>,
    handles: HandleAllocator,
    in_flight: AtomicUsize,
    submit_timeout: Option<Duration>,
    created: u64,
}

impl EngineAdapter {
    pub fn new(config: EngineConfig, factory: Arc<dyn BackendFactory>) -> Self {
        let handles = HandleAllocator::new(config.request_id_prefix.clone());
        Self {
            config,
            factory,
            lifecycle: EngineLifecycle::new(),
            backend: RwLock::new(None),
            handles,
            in_flight: AtomicUsize::new(0),
            submit_timeout: None,
            created: unix_now().as_secs(),
        }
    }

    /// Bound every submission by `timeout`. `None` waits indefinitely.
    pub fn with_submit_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.current()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn handles_issued(&self) -> u64 {
        self.handles.issued()
    }

    /// Unix timestamp (seconds) at which the adapter was created.
    pub fn created(&self) -> u64 {
        self.created
    }

    /// Construct the backend: Uninitialized → Initializing → Ready.
    ///
    /// Construction runs on a blocking thread and is not cancelable. On
    /// failure the adapter ends in `Stopped` and never reports `Ready`. If
    /// `shutdown` lands while construction is running, the finished backend
    /// is stopped and dropped and the adapter stays `Stopped`.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.lifecycle
            .transition(LifecyclePhase::Uninitialized, LifecyclePhase::Initializing)
            .map_err(|from| EngineError::InvalidTransition {
                from,
                to: LifecyclePhase::Initializing,
            })?;

        info!(model = self.config.model, "Initializing engine");
        let started = Instant::now();

        let factory = self.factory.clone();
        let config = self.config.clone();
        let built = tokio::task::spawn_blocking(move || factory.build(&config))
            .await
            .map_err(|e| BackendError::Load(format!("engine construction task failed: {e}")))
            .and_then(|r| r);

        match built {
            Ok(backend) => {
                // Publish the backend and the phase together so a submit that
                // sees Ready always finds it.
                let mut slot = self.backend.write().await;
                if let Err(phase) = self
                    .lifecycle
                    .transition(LifecyclePhase::Initializing, LifecyclePhase::Ready)
                {
                    drop(slot);
                    backend.stop();
                    warn!(
                        model = self.config.model,
                        phase = %phase,
                        "Engine constructed after shutdown; discarding it"
                    );
                    return Err(EngineError::Unavailable(phase));
                }
                *slot = Some(backend);
                drop(slot);
                info!(
                    model = self.config.model,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Engine ready"
                );
                Ok(())
            }
            Err(e) => {
                self.lifecycle.force(LifecyclePhase::Stopped);
                error!(model = self.config.model, "Engine initialization failed: {e}");
                Err(EngineError::FatalInit(e.to_string()))
            }
        }
    }

    /// Submit a prompt and wait for its single result.
    pub async fn submit(
        &self,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<GenerationResult, EngineError> {
        let phase = self.lifecycle.current();
        if !phase.accepts_requests() {
            return Err(EngineError::Unavailable(phase));
        }

        let backend = match self.backend.read().await.as_ref() {
            Some(b) => b.clone(),
            None => return Err(EngineError::Unavailable(self.lifecycle.current())),
        };

        let _guard = InFlightGuard::enter(&self.in_flight);
        let handle = self.handles.allocate();

        debug!(
            request_id = %handle,
            prompt_chars = prompt.len(),
            temperature = sampling.temperature,
            top_p = sampling.top_p,
            max_tokens = sampling.max_tokens,
            stop = sampling.stop.len(),
            "Submitting to engine"
        );

        let generation = backend.generate(&handle, prompt, sampling);
        let outcome = match self.submit_timeout {
            Some(limit) => match tokio::time::timeout(limit, generation).await {
                Ok(r) => r,
                Err(_) => {
                    warn!(request_id = %handle, ?limit, "Generation timed out");
                    return Err(EngineError::Timeout(limit));
                }
            },
            None => generation.await,
        };

        let output = match outcome {
            Ok(output) => output,
            Err(BackendError::Stopped) => {
                return Err(EngineError::Unavailable(self.lifecycle.current()))
            }
            Err(e) => {
                warn!(request_id = %handle, "Generation failed: {e}");
                return Err(EngineError::Failure(e.to_string()));
            }
        };

        if output.finish == FinishReason::Error {
            warn!(request_id = %handle, "Engine reported an error finish");
            let msg = if output.text.is_empty() {
                "engine reported an error finish".to_string()
            } else {
                output.text
            };
            return Err(EngineError::Failure(msg));
        }

        debug!(
            request_id = %handle,
            finish = output.finish.as_str(),
            "Generation complete"
        );

        Ok(GenerationResult {
            request_id: handle.id,
            text: output.text,
            finish_reason: output.finish,
        })
    }

    /// Stop admitting work: Ready → Draining → Stopped.
    ///
    /// Waits up to `drain_timeout` for in-flight submissions; anything still
    /// running afterwards is abandoned. Shutting down an adapter that never
    /// became ready moves it straight to `Stopped`.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        if let Err(from) = self
            .lifecycle
            .transition(LifecyclePhase::Ready, LifecyclePhase::Draining)
        {
            if from != LifecyclePhase::Draining && from != LifecyclePhase::Stopped {
                self.lifecycle.force(LifecyclePhase::Stopped);
                info!(from = %from, "Engine stopped before becoming ready");
            }
            return;
        }

        info!(in_flight = self.in_flight(), "Draining engine");
        if let Some(backend) = self.backend.read().await.as_ref() {
            backend.stop();
        }

        let deadline = Instant::now() + drain_timeout;
        while self.in_flight() > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let abandoned = self.in_flight();
        if abandoned > 0 {
            warn!(abandoned, "Drain timeout reached with generations still in flight");
        }

        self.backend.write().await.take();
        self.lifecycle.force(LifecyclePhase::Stopped);
        info!("Engine stopped");
    }
}
