//! OpenAI-compatible HTTP API.
//!
//! Implements the subset of the OpenAI API served by the gateway:
//! - POST /v1/chat/completions
//! - POST /v1/completions
//! - POST /v1/reason
//! - GET /models (also /v1/models)
//! - GET /health, GET /status, GET /metrics
//!
//! Generation requests are admitted only while the engine is `Ready`; any
//! other phase answers 503 without touching the engine.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{GatewayError, InvalidParameter};
use crate::inference::engine::EngineAdapter;
use crate::inference::lifecycle::LifecyclePhase;
use crate::inference::sampling::{SamplingPolicy, SamplingRequest, StopSequences};
use crate::protocol::assembler::{
    ChatCompletionResponse, ResponseAssembler, TextCompletionResponse, Usage,
};
use crate::protocol::extract::{extract_structured, ActionStep};
use crate::protocol::prompt::{format_prompt, ConversationTurn, Role};
use crate::server::metrics::Metrics;
use crate::unix_now;

/// System instruction used by `/v1/reason`.
pub const REASONING_SYSTEM_PROMPT: &str = "You are an AI assistant that plans tasks. \
Analyze the task and provide structured action steps.";

/// Default generation budget for `/v1/reason`.
pub const REASON_MAX_TOKENS: i64 = 1000;

/// Application state shared across handlers.
pub struct AppState {
    pub engine: Arc<EngineAdapter>,
    pub config: Arc<Config>,
    pub sampling: SamplingPolicy,
    pub assembler: ResponseAssembler,
    pub metrics: Metrics,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(engine: Arc<EngineAdapter>, config: Arc<Config>) -> Result<Self, prometheus::Error> {
        Ok(Self {
            sampling: SamplingPolicy::new(config.sampling.clone()),
            assembler: ResponseAssembler::new(&config.response),
            metrics: Metrics::new()?,
            engine,
            config,
            start_time: Instant::now(),
        })
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = state.config.server.cors_permissive;

    let router = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/completions", post(completions))
        .route("/v1/reason", post(reason))
        .route("/models", get(list_models))
        .route("/v1/models", get(list_models))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/metrics", get(metrics))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if cors {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat message as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat completion request (OpenAI-compatible).
#[derive(Debug, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub stream: bool,
    pub stop: Option<StopSequences>,
}

/// Completion request (non-chat).
#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub model: Option<String>,
    pub prompt: String,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<i64>,
    #[serde(default)]
    pub stream: bool,
    pub stop: Option<StopSequences>,
}

/// Task-planning request answered with extracted structure.
#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub model: Option<String>,
    pub task: String,
    pub context: Option<Value>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub max_tokens: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReasonResponse {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub reasoning: String,
    pub structured: Option<Value>,
    pub actions: Vec<ActionStep>,
    pub usage: Usage,
}

/// Model listing response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelList {
    pub object: String,
    pub data: Vec<ModelCard>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModelCard {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub owned_by: String,
    pub permission: Vec<Value>,
    pub root: String,
    pub parent: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: LifecyclePhase,
    pub model: String,
    pub timestamp: f64,
}

/// Detailed status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub phase: LifecyclePhase,
    pub model: String,
    pub uptime_secs: u64,
    pub in_flight: usize,
    pub handles_issued: u64,
    pub timestamp: f64,
}

impl ChatMessage {
    fn to_turn(&self, index: usize) -> Result<ConversationTurn, InvalidParameter> {
        let role: Role = self.role.parse().map_err(|_| {
            InvalidParameter::new(
                format!("messages[{index}].role"),
                format!("unknown role `{}`", self.role),
            )
        })?;
        Ok(ConversationTurn::new(role, self.content.clone()))
    }
}

// ─── Helpers ───────────────────────────────────────────────────────────────

fn decode<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, GatewayError> {
    payload
        .map(|Json(req)| req)
        .map_err(|rejection| InvalidParameter::new("body", rejection.body_text()).into())
}

/// Reject generation traffic unless the engine is ready.
fn admit(state: &AppState) -> Result<(), GatewayError> {
    let phase = state.engine.phase();
    if phase.accepts_requests() {
        Ok(())
    } else {
        Err(GatewayError::EngineUnavailable(phase))
    }
}

fn record<T>(state: &AppState, endpoint: &str, started: Instant, result: &Result<T, GatewayError>) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(e) => e.kind(),
    };
    state.metrics.observe(endpoint, outcome, started.elapsed());
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat_completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Json<ChatCompletionResponse>, GatewayError> {
    let started = Instant::now();
    let result = run_chat(&state, payload).await;
    record(&state, "chat", started, &result);
    result.map(Json)
}

async fn run_chat(
    state: &AppState,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<ChatCompletionResponse, GatewayError> {
    admit(state)?;
    let req = decode(payload)?;

    info!(
        model = req.model.as_deref().unwrap_or(state.engine.model()),
        messages = req.messages.len(),
        stream = req.stream,
        "Chat completion request"
    );

    if req.messages.is_empty() {
        return Err(InvalidParameter::new("messages", "at least one message is required").into());
    }
    let turns = req
        .messages
        .iter()
        .enumerate()
        .map(|(i, m)| m.to_turn(i))
        .collect::<Result<Vec<_>, _>>()?;
    let prompt = format_prompt(&turns);

    let sampling = state.sampling.validate(SamplingRequest {
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_tokens,
        stop: req.stop,
    })?;

    if req.stream {
        debug!("Streaming requested; answering with a single response");
    }

    let result = state.engine.submit(&prompt, &sampling).await?;
    let model = req.model.as_deref().unwrap_or(state.engine.model());
    Ok(state.assembler.chat(model, &prompt, &result))
}

async fn completions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<Json<TextCompletionResponse>, GatewayError> {
    let started = Instant::now();
    let result = run_completion(&state, payload).await;
    record(&state, "completion", started, &result);
    result.map(Json)
}

async fn run_completion(
    state: &AppState,
    payload: Result<Json<CompletionRequest>, JsonRejection>,
) -> Result<TextCompletionResponse, GatewayError> {
    admit(state)?;
    let req = decode(payload)?;

    info!(
        model = req.model.as_deref().unwrap_or(state.engine.model()),
        prompt_chars = req.prompt.len(),
        stream = req.stream,
        "Completion request"
    );

    let sampling = state.sampling.validate(SamplingRequest {
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_tokens,
        stop: req.stop,
    })?;

    let result = state.engine.submit(&req.prompt, &sampling).await?;
    let model = req.model.as_deref().unwrap_or(state.engine.model());
    Ok(state.assembler.text(model, &req.prompt, &result))
}

async fn reason(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<Json<ReasonResponse>, GatewayError> {
    let started = Instant::now();
    let result = run_reason(&state, payload).await;
    record(&state, "reason", started, &result);
    result.map(Json)
}

async fn run_reason(
    state: &AppState,
    payload: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<ReasonResponse, GatewayError> {
    admit(state)?;
    let req = decode(payload)?;

    if req.task.trim().is_empty() {
        return Err(InvalidParameter::new("task", "task must not be empty").into());
    }
    info!(task_chars = req.task.len(), "Reasoning request");

    let context = req.context.unwrap_or_else(|| Value::Object(Default::default()));
    let turns = [
        ConversationTurn::new(Role::System, REASONING_SYSTEM_PROMPT),
        ConversationTurn::new(Role::User, format!("Context: {context}\n\nTask: {}", req.task)),
    ];
    let prompt = format_prompt(&turns);

    let sampling = state.sampling.validate(SamplingRequest {
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens: req.max_tokens.or(Some(REASON_MAX_TOKENS)),
        stop: None,
    })?;

    let result = state.engine.submit(&prompt, &sampling).await?;
    let extracted = extract_structured(&result.text);

    Ok(ReasonResponse {
        id: format!("reason-{}", result.request_id),
        object: "reasoning".to_string(),
        created: unix_now().as_secs(),
        model: req.model.unwrap_or_else(|| state.engine.model().to_string()),
        usage: Usage::count(&prompt, &result.text),
        reasoning: extracted.raw,
        structured: extracted.structured,
        actions: extracted.actions,
    })
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelList> {
    let engine = &state.engine;
    Json(ModelList {
        object: "list".to_string(),
        data: vec![ModelCard {
            id: engine.model().to_string(),
            object: "model".to_string(),
            created: engine.created(),
            owned_by: engine.config().owned_by().to_string(),
            permission: Vec::new(),
            root: engine.model().to_string(),
            parent: None,
        }],
    })
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: state.engine.phase(),
        model: state.engine.model().to_string(),
        timestamp: unix_now().as_secs_f64(),
    })
}

async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let engine = &state.engine;
    Json(StatusResponse {
        phase: engine.phase(),
        model: engine.model().to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        in_flight: engine.in_flight(),
        handles_issued: engine.handles_issued(),
        timestamp: unix_now().as_secs_f64(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .metrics
        .set_engine(state.engine.phase(), state.engine.in_flight());
    match state.metrics.render() {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn not_found(uri: Uri) -> GatewayError {
    GatewayError::NotFound(uri.path().to_string())
}
