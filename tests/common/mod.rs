//! Shared fixtures: a scripted backend standing in for the real engine.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;

use inference_gateway::config::{Config, EngineConfig};
use inference_gateway::inference::backend::{
    BackendError, BackendFactory, BackendOutput, FinishReason, InferenceBackend,
};
use inference_gateway::inference::engine::{EngineAdapter, RequestHandle};
use inference_gateway::inference::sampling::SamplingConfig;
use inference_gateway::server::openai_api::{build_router, AppState};

/// What the scripted backend answers.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Fixed text and finish reason.
    Text(String, FinishReason),
    /// Echo the prompt back verbatim.
    EchoPrompt,
    /// Fail the computation.
    Fail(String),
}

pub struct ScriptedBackend {
    reply: Reply,
    delay: Duration,
    gate: Option<Arc<tokio::sync::Semaphore>>,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
    pub handles: Mutex<Vec<String>>,
    pub sampling: Mutex<Vec<SamplingConfig>>,
}

impl ScriptedBackend {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            delay: Duration::ZERO,
            gate: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            sampling: Mutex::new(Vec::new()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(Reply::Text(text.to_string(), FinishReason::Stop))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every generation waits for a permit on `gate` before answering.
    pub fn with_gate(mut self, gate: Arc<tokio::sync::Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn generate(
        &self,
        handle: &RequestHandle,
        prompt: &str,
        sampling: &SamplingConfig,
    ) -> Result<BackendOutput, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.handles.lock().unwrap().push(handle.id().to_string());
        self.sampling.lock().unwrap().push(sampling.clone());

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| BackendError::Stopped)?;
            permit.forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.reply {
            Reply::Text(text, finish) => Ok(BackendOutput {
                text: text.clone(),
                finish: *finish,
            }),
            Reply::EchoPrompt => Ok(BackendOutput {
                text: prompt.to_string(),
                finish: FinishReason::Stop,
            }),
            Reply::Fail(msg) => Err(BackendError::Generation(msg.clone())),
        }
    }
}

/// Factory handing out a pre-built [`ScriptedBackend`].
pub struct ScriptedFactory {
    backend: Arc<ScriptedBackend>,
    fail: Option<String>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl ScriptedFactory {
    pub fn new(backend: Arc<ScriptedBackend>) -> Self {
        Self {
            backend,
            fail: None,
            release: Mutex::new(None),
        }
    }

    pub fn failing(msg: &str) -> Self {
        Self {
            backend: Arc::new(ScriptedBackend::text("")),
            fail: Some(msg.to_string()),
            release: Mutex::new(None),
        }
    }

    /// Construction blocks until the returned sender fires (or is dropped).
    pub fn gated(backend: Arc<ScriptedBackend>) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let factory = Self {
            backend,
            fail: None,
            release: Mutex::new(Some(rx)),
        };
        (factory, tx)
    }
}

impl BackendFactory for ScriptedFactory {
    fn build(&self, _config: &EngineConfig) -> Result<Arc<dyn InferenceBackend>, BackendError> {
        let release = self.release.lock().unwrap().take();
        if let Some(rx) = release {
            let _ = rx.recv();
        }
        if let Some(msg) = &self.fail {
            return Err(BackendError::Load(msg.clone()));
        }
        Ok(self.backend.clone())
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.engine.model = "test-org/test-model".to_string();
    config.engine.request_id_prefix = "test".to_string();
    config.server.cors_permissive = false;
    config
}

pub fn adapter(factory: ScriptedFactory) -> Arc<EngineAdapter> {
    Arc::new(EngineAdapter::new(test_config().engine, Arc::new(factory)))
}

pub fn router_for(engine: Arc<EngineAdapter>) -> Router {
    let state = AppState::new(engine, Arc::new(test_config())).unwrap();
    build_router(Arc::new(state))
}

/// Router over an initialized engine backed by `backend`.
pub async fn ready_app(backend: Arc<ScriptedBackend>) -> (Router, Arc<EngineAdapter>) {
    let engine = adapter(ScriptedFactory::new(backend));
    engine.initialize().await.unwrap();
    (router_for(engine.clone()), engine)
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
