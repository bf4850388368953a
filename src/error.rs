//! Gateway error taxonomy and its HTTP rendering.
//!
//! Every failure reaching a handler ends up as a [`GatewayError`], which
//! renders as an OpenAI-style error body:
//! `{"error": {"message", "type", "param", "code"}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::inference::engine::EngineError;
use crate::inference::lifecycle::LifecyclePhase;

/// A request field that failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("invalid value for `{field}`: {message}")]
pub struct InvalidParameter {
    pub field: String,
    pub message: String,
}

impl InvalidParameter {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    InvalidParameter(#[from] InvalidParameter),

    #[error("engine unavailable (phase: {0})")]
    EngineUnavailable(LifecyclePhase),

    #[error("engine failure: {0}")]
    EngineFailure(String),

    #[error("engine initialization failed: {0}")]
    FatalInitFailure(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl From<EngineError> for GatewayError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(phase) => GatewayError::EngineUnavailable(phase),
            EngineError::Failure(msg) => GatewayError::EngineFailure(msg),
            EngineError::Timeout(after) => {
                GatewayError::EngineFailure(format!("generation timed out after {after:?}"))
            }
            EngineError::FatalInit(msg) => GatewayError::FatalInitFailure(msg),
            EngineError::InvalidTransition { from, .. } => GatewayError::EngineUnavailable(from),
        }
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            GatewayError::EngineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::EngineFailure(_) | GatewayError::FatalInitFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    /// Machine-readable error type.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidParameter(_) => "invalid_request_error",
            GatewayError::EngineUnavailable(_) => "engine_unavailable",
            GatewayError::EngineFailure(_) => "engine_error",
            GatewayError::FatalInitFailure(_) => "engine_init_error",
            GatewayError::NotFound(_) => "not_found_error",
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub param: Option<String>,
    pub code: u16,
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), kind = self.kind(), "{}", self);
        } else {
            warn!(status = status.as_u16(), kind = self.kind(), "{}", self);
        }

        let param = match &self {
            GatewayError::InvalidParameter(p) => Some(p.field.clone()),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                message: self.to_string(),
                kind: self.kind().to_string(),
                param,
                code: status.as_u16(),
            },
        };

        (status, Json(body)).into_response()
    }
}
