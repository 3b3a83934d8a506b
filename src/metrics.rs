//! Prometheus metrics, grounded in the teacher's `metrics::RouterMetrics` /
//! `metrics::start_prometheus` wiring.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::info;

pub struct PrometheusConfig {
    pub addr: SocketAddr,
}

/// Installs the Prometheus recorder and starts its scrape server. Returns a
/// handle that can be rendered manually (e.g. from the gateway's own
/// `/metrics` route) in addition to the standalone exporter.
pub fn start_prometheus(config: PrometheusConfig) -> Option<PrometheusHandle> {
    match PrometheusBuilder::new()
        .with_http_listener(config.addr)
        .install_recorder()
    {
        Ok(handle) => {
            info!("Prometheus metrics listening on {}", config.addr);
            Some(handle)
        }
        Err(err) => {
            tracing::warn!("Failed to install Prometheus recorder: {err}");
            None
        }
    }
}

pub struct GatewayMetrics;

impl GatewayMetrics {
    pub fn set_worker_count(total: usize, healthy: usize) {
        gauge!("model_gate_workers_total").set(total as f64);
        gauge!("model_gate_workers_healthy").set(healthy as f64);
    }

    pub fn set_worker_load(worker_id: &str, load: i64) {
        gauge!("model_gate_worker_load", "worker" => worker_id.to_string()).set(load as f64);
    }

    pub fn record_assignment() {
        counter!("model_gate_assignments_total").increment(1);
    }

    pub fn record_assignment_race() {
        counter!("model_gate_assignment_race_total").increment(1);
    }

    pub fn record_load_latency(duration: Duration, success: bool) {
        histogram!("model_gate_load_duration_seconds", "success" => success.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_unload_latency(duration: Duration, success: bool) {
        histogram!("model_gate_unload_duration_seconds", "success" => success.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_reconcile_tick(duration: Duration) {
        histogram!("model_gate_reconcile_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn record_no_healthy_workers() {
        counter!("model_gate_no_healthy_workers_total").increment(1);
    }
}
