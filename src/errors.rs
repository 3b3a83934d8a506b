//! Gateway-wide error type.
//!
//! Every component surfaces a [`GatewayError`]; [`crate::routing::frontend`]
//! is the only place that maps it onto an HTTP response, matching the split
//! between domain errors and wire errors the teacher crate draws between
//! `AppError` and its `to_response`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("registry operation failed: {0}")]
    Registry(String),

    #[error("no healthy workers available")]
    NoHealthyWorkers,

    #[error("assignment race exceeded {attempts} attempts for {model}")]
    AssignmentRace { model: String, attempts: u32 },

    #[error("load failed on worker {worker} for {model}: {reason}")]
    WorkerLoadFailed {
        worker: String,
        model: String,
        reason: String,
    },

    #[error("worker {0} is unavailable")]
    WorkerUnavailable(String),

    #[error("model {name}:{version} is not loaded on any worker")]
    ModelNotFound { name: String, version: String },

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("upstream worker call timed out: {0}")]
    Timeout(String),
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Registry(_) => StatusCode::BAD_GATEWAY,
            GatewayError::NoHealthyWorkers => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::AssignmentRace { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::WorkerLoadFailed { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::WorkerUnavailable(_) => StatusCode::BAD_GATEWAY,
            GatewayError::ModelNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string(), "status": status.as_u16() }));
        (status, body).into_response()
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else {
            GatewayError::WorkerUnavailable(err.to_string())
        }
    }
}
