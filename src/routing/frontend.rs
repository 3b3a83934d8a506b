//! Parses the inbound request path, consults the [`Placer`], and hands the
//! request off to the worker it selects (spec §4.8). The actual proxy
//! machinery (raw byte copying, connection pooling policy) is out of scope;
//! this module does the minimal rewrite-and-forward plus the one fallback
//! path the spec still assigns it: round-robin pass-through, grounded in the
//! teacher's `RoundRobinRoute`/`SingleServerRoute`.

use crate::errors::GatewayError;
use crate::placement::Placer;
use crate::worker::WorkerRegistry;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{post, Router};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct RoutingState {
    pub placer: Arc<Placer>,
    pub workers: Arc<WorkerRegistry>,
    pub http: reqwest::Client,
    round_robin_idx: Arc<AtomicUsize>,
}

impl RoutingState {
    pub fn new(placer: Arc<Placer>, workers: Arc<WorkerRegistry>, http: reqwest::Client) -> Self {
        Self {
            placer,
            workers,
            http,
            round_robin_idx: Arc::new(AtomicUsize::new(0)),
        }
    }
}

pub fn router(state: RoutingState) -> Router {
    Router::new()
        .route(
            "/models/{name}/versions/{version}/{action}",
            post(model_action_handler),
        )
        .route("/models/unload", post(unload_handler))
        .fallback(round_robin_fallback)
        .with_state(state)
}

async fn model_action_handler(
    State(state): State<RoutingState>,
    Path((name, version, action)): Path<(String, String, String)>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let worker = state.placer.get_worker_for_model(&name, &version).await?;

    let target = match action.as_str() {
        "predict" => format!(
            "{}/models/{name}/versions/{version}/predict",
            worker.url()
        ),
        "load" => format!("{}/models/load", worker.url()),
        other => format!(
            "{}/models/{name}/versions/{version}/{other}",
            worker.url()
        ),
    };

    forward(&state.http, method, &target, headers, body).await
}

#[derive(Debug, Deserialize)]
struct UnloadRequest {
    model_name: String,
    version: String,
}

#[derive(Debug, Serialize)]
struct UnloadResponse {
    status: &'static str,
    model_name: String,
    version: String,
    workers: Vec<String>,
}

async fn unload_handler(
    State(state): State<RoutingState>,
    Json(request): Json<UnloadRequest>,
) -> Result<Response, GatewayError> {
    if request.model_name.is_empty() || request.version.is_empty() {
        return Err(GatewayError::BadRequest(
            "model_name and version are required".to_string(),
        ));
    }

    let workers = state
        .placer
        .unload_globally(&request.model_name, &request.version)
        .await?;

    let body = UnloadResponse {
        status: "unloaded",
        model_name: request.model_name,
        version: request.version,
        workers: workers.into_iter().map(|w| w.to_string()).collect(),
    };
    Ok((StatusCode::OK, Json(body)).into_response())
}

/// Out-of-scope proxy's one remaining obligation here: pick the next healthy
/// worker round robin and forward verbatim.
async fn round_robin_fallback(
    State(state): State<RoutingState>,
    request: axum::extract::Request,
) -> Result<Response, GatewayError> {
    let healthy = state.workers.healthy();
    if healthy.is_empty() {
        return Err(GatewayError::NoHealthyWorkers);
    }

    let idx = state.round_robin_idx.fetch_add(1, Ordering::Relaxed) % healthy.len();
    let worker = &healthy[idx];
    let path = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let target = format!("{}{}", worker.url(), path);

    let method = request.method().clone();
    let headers = request.headers().clone();
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|err| GatewayError::BadRequest(err.to_string()))?;

    forward(&state.http, method, &target, headers, body).await
}

async fn forward(
    http: &reqwest::Client,
    method: Method,
    target: &str,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let mut outbound_headers = headers;
    outbound_headers.remove(axum::http::header::HOST);

    let response = http
        .request(method, target)
        .headers(outbound_headers)
        .body(body)
        .send()
        .await?;

    let status = response.status();
    let response_headers = response.headers().clone();
    let body = response.bytes().await.map_err(GatewayError::from)?;

    let mut builder = Response::builder().status(status);
    for (name, value) in response_headers.iter() {
        builder = builder.header(name, value);
    }
    builder.body(axum::body::Body::from(body)).map_err(|err| {
        warn!("failed to build forwarded response: {err}");
        GatewayError::WorkerUnavailable(err.to_string())
    })
}
