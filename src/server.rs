//! Wires every collaborator into a single root value and serves HTTP (spec
//! §2 data flow, §9 DESIGN NOTES: "construct a single Gateway root value at
//! startup... avoid process-global state except the root"). Grounded in the
//! teacher's `AppContext`/`build_app`/`startup` split in this same file.

use crate::config::RouterConfig;
use crate::errors::GatewayError;
use crate::metrics::{self, GatewayMetrics, PrometheusConfig};
use crate::placement::{Placer, PlacementCache, Reconciler};
use crate::registry::{RedisRegistryStore, RegistryStore};
use crate::routing::auth::{require_api_key, ApiKeyValidator};
use crate::routing::request_id::stamp_request_id;
use crate::routing::{self, RoutingState};
use crate::worker::client::WorkerClient;
use crate::worker::health::HealthMonitor;
use crate::worker::source::{build_worker_source, DiscoveryLoop};
use crate::worker::{Worker, WorkerId, WorkerRegistry};
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use reqwest::Client;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Owns every long-lived collaborator. Cloning is cheap (everything inside
/// is an `Arc`); cloned for use as axum state and inside background tasks.
#[derive(Clone)]
pub struct Gateway {
    pub config: Arc<RouterConfig>,
    pub workers: Arc<WorkerRegistry>,
    pub placement_cache: Arc<PlacementCache>,
    pub registry: Arc<dyn RegistryStore>,
    pub worker_client: Arc<WorkerClient>,
    pub placer: Arc<Placer>,
}

impl Gateway {
    pub fn new(config: RouterConfig, registry: Arc<dyn RegistryStore>) -> Self {
        let config = Arc::new(config);
        let workers = Arc::new(WorkerRegistry::new());
        let placement_cache = Arc::new(PlacementCache::new());

        let probe_client = Client::builder()
            .build()
            .expect("reqwest client builder never fails for a default config");
        let worker_client = Arc::new(WorkerClient::new(
            probe_client,
            config.probe_timeout(),
            config.load_timeout(),
            config.unload_timeout(),
        ));

        let placer = Arc::new(Placer::new(
            config.clone(),
            registry.clone(),
            workers.clone(),
            placement_cache.clone(),
            worker_client.clone(),
        ));

        Self {
            config,
            workers,
            placement_cache,
            registry,
            worker_client,
            placer,
        }
    }

    /// Spawns the discovery/health/reconcile background loops. Returns a
    /// sender whose drop (or explicit `true` send) asks every loop to stop.
    pub async fn spawn_background_loops(&self) -> anyhow::Result<watch::Sender<bool>> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let source = build_worker_source(&self.config).await?;
        let discovery = Arc::new(DiscoveryLoop::new(source, self.workers.clone()));
        discovery.tick().await;
        tokio::spawn(discovery.run(self.config.discover_interval(), shutdown_rx.clone()));

        let health_monitor = Arc::new(HealthMonitor::new(
            self.workers.clone(),
            self.worker_client.clone(),
            self.config.health_fanout,
        ));
        health_monitor.probe_once().await;
        tokio::spawn(health_monitor.run(self.config.health_interval(), shutdown_rx.clone()));

        let reconciler = Arc::new(Reconciler::new(
            self.config.clone(),
            self.registry.clone(),
            self.workers.clone(),
            self.placement_cache.clone(),
            self.worker_client.clone(),
            self.config.health_fanout,
        ));
        tokio::spawn(reconciler.run(self.config.reconcile_interval(), shutdown_rx.clone()));

        Ok(shutdown_tx)
    }
}

async fn status_handler(State(gateway): State<Gateway>) -> Response {
    let workers = gateway.workers.all();
    let healthy = workers.iter().filter(|w| w.healthy).count();
    GatewayMetrics::set_worker_count(workers.len(), healthy);
    Json(json!({
        "workers_total": workers.len(),
        "workers_healthy": healthy,
        "workers": workers.iter().map(|w| json!({
            "id": w.id.as_str(),
            "healthy": w.healthy,
        })).collect::<Vec<_>>(),
    }))
    .into_response()
}

/// Read-only worker introspection (SPEC_FULL.md §C), grounded in the
/// teacher's `list_workers_rest` / `get_worker` handlers.
async fn list_workers_handler(State(gateway): State<Gateway>) -> Response {
    let workers = gateway
        .workers
        .all()
        .iter()
        .map(|w| worker_json(w, &gateway.placement_cache))
        .collect::<Vec<_>>();
    Json(json!({ "workers": workers })).into_response()
}

async fn get_worker_handler(
    State(gateway): State<Gateway>,
    Path(id): Path<String>,
) -> Result<Response, GatewayError> {
    let worker = gateway
        .workers
        .get(&WorkerId::from(id.clone()))
        .ok_or_else(|| GatewayError::WorkerUnavailable(format!("unknown worker {id}")))?;
    Ok(Json(worker_json(&worker, &gateway.placement_cache)).into_response())
}

fn worker_json(worker: &Worker, cache: &PlacementCache) -> serde_json::Value {
    let resident: Vec<String> = cache
        .resident_set(&worker.id)
        .iter()
        .map(|m| m.to_string())
        .collect();
    json!({
        "id": worker.id.as_str(),
        "host": worker.host,
        "port": worker.port,
        "healthy": worker.healthy,
        "load": worker.clamped_load(),
        "resident_models": resident,
    })
}

pub fn build_app(gateway: Gateway, max_payload_bytes: usize, api_key_validator: ApiKeyValidator) -> Router {
    let http_client = Client::builder()
        .build()
        .expect("reqwest client builder never fails for a default config");
    let routing_state = RoutingState::new(gateway.placer.clone(), gateway.workers.clone(), http_client);

    let status_router = Router::new()
        .route("/status", get(status_handler))
        .route("/workers", get(list_workers_handler))
        .route("/workers/{id}", get(get_worker_handler))
        .with_state(gateway);

    let cors = CorsLayer::permissive();

    let mut app = routing::router(routing_state).merge(status_router);
    if api_key_validator.is_enabled() {
        app = app.layer(axum::middleware::from_fn_with_state(
            api_key_validator,
            require_api_key,
        ));
    }

    app.layer(axum::middleware::from_fn(stamp_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_payload_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(120)))
        .layer(cors)
}

pub async fn startup(config: RouterConfig) -> anyhow::Result<()> {
    let registry = Arc::new(RedisRegistryStore::connect(&config.registry_url)?);
    let gateway = Gateway::new(config.clone(), registry);

    let api_key_client = Client::builder()
        .build()
        .expect("reqwest client builder never fails for a default config");
    let api_key_validator =
        ApiKeyValidator::new(config.api_key_validation_urls.clone(), api_key_client);
    if api_key_validator.is_enabled() {
        info!(
            "api key validation configured against {} url(s)",
            config.api_key_validation_urls.len()
        );
    }

    let _shutdown_tx = gateway.spawn_background_loops().await?;

    let prometheus_addr: SocketAddr = "0.0.0.0:9090".parse().expect("static address parses");
    metrics::start_prometheus(PrometheusConfig {
        addr: prometheus_addr,
    });

    let app = build_app(gateway, 16 * 1024 * 1024, api_key_validator);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("model-gate listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("received terminate signal, starting graceful shutdown");
        },
    }
}
