//! Worker fleet discovery (spec §4.1): a `WorkerSource` produces the current
//! membership snapshot. The cluster variant is grounded in the `kube`/
//! `k8s-openapi` `Api::namespaced` + `Client::try_default` pattern used
//! throughout the cluster-observer example crate.

use super::{Worker, WorkerId, WorkerRegistry};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Endpoints;
use kube::api::Api;
use kube::Client;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

#[async_trait]
pub trait WorkerSource: Send + Sync {
    /// Current membership snapshot, `(host, port)` pairs.
    async fn discover(&self) -> Vec<(String, u16)>;
}

pub struct StaticWorkerSource {
    workers: Vec<(String, u16)>,
}

impl StaticWorkerSource {
    /// Parses `host:port` entries; malformed entries are dropped with a
    /// warning rather than failing discovery entirely.
    pub fn new(entries: &[String]) -> Self {
        let workers = entries
            .iter()
            .filter_map(|entry| {
                let (host, port) = entry.rsplit_once(':')?;
                let port: u16 = port.parse().ok()?;
                Some((host.to_string(), port))
            })
            .collect();
        Self { workers }
    }
}

#[async_trait]
impl WorkerSource for StaticWorkerSource {
    async fn discover(&self) -> Vec<(String, u16)> {
        self.workers.clone()
    }
}

/// Queries Ready endpoint addresses behind a Kubernetes service. On API
/// failure, returns the previous snapshot rather than an empty or partial
/// list, per spec §4.1 ("never drop healthy workers on a transient error").
pub struct ClusterWorkerSource {
    client: Client,
    namespace: String,
    service: String,
    default_port: u16,
    last_known_good: Mutex<Vec<(String, u16)>>,
}

impl ClusterWorkerSource {
    pub fn new(client: Client, namespace: String, service: String, default_port: u16) -> Self {
        Self {
            client,
            namespace,
            service,
            default_port,
            last_known_good: Mutex::new(Vec::new()),
        }
    }

    async fn fetch(&self) -> Result<Vec<(String, u16)>, kube::Error> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), &self.namespace);
        let endpoints = api.get(&self.service).await?;

        let mut workers = Vec::new();
        for subset in endpoints.subsets.unwrap_or_default() {
            let port = subset
                .ports
                .as_ref()
                .and_then(|ports| ports.first())
                .map(|p| p.port as u16)
                .unwrap_or(self.default_port);

            for address in subset.addresses.unwrap_or_default() {
                workers.push((address.ip, port));
            }
        }
        Ok(workers)
    }
}

#[async_trait]
impl WorkerSource for ClusterWorkerSource {
    async fn discover(&self) -> Vec<(String, u16)> {
        match self.fetch().await {
            Ok(workers) => {
                *self.last_known_good.lock() = workers.clone();
                workers
            }
            Err(err) => {
                warn!(
                    "endpoint discovery for {}/{} failed, keeping last known snapshot: {err}",
                    self.namespace, self.service
                );
                self.last_known_good.lock().clone()
            }
        }
    }
}

/// Polls a `WorkerSource` on an interval and reconciles the membership into
/// `WorkerRegistry`: new hosts enter as unhealthy (per spec §4.1) until the
/// HealthMonitor confirms them, and hosts no longer listed are removed.
pub struct DiscoveryLoop {
    source: Arc<dyn WorkerSource>,
    workers: Arc<WorkerRegistry>,
}

impl DiscoveryLoop {
    pub fn new(source: Arc<dyn WorkerSource>, workers: Arc<WorkerRegistry>) -> Self {
        Self { source, workers }
    }

    pub async fn tick(&self) {
        let discovered = self.source.discover().await;
        let discovered_ids: HashSet<WorkerId> = discovered
            .iter()
            .map(|(host, port)| WorkerId::new(host, *port))
            .collect();

        for (host, port) in &discovered {
            let id = WorkerId::new(host, *port);
            if self.workers.get(&id).is_none() {
                debug!("discovered new worker {id}");
                self.workers.upsert(Worker::new(host.clone(), *port));
            }
        }

        for known in self.workers.known_ids() {
            if !discovered_ids.contains(&known) {
                debug!("worker {known} no longer listed by discovery, removing");
                self.workers.remove(&known);
            }
        }
    }

    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    debug!("discovery loop shutting down");
                    break;
                }
            }
        }
    }
}

/// Builds the configured `WorkerSource` at startup, failing fast if cluster
/// mode is selected without a reachable Kubernetes API.
pub async fn build_worker_source(
    config: &crate::config::RouterConfig,
) -> anyhow::Result<Arc<dyn WorkerSource>> {
    match config.discovery_mode {
        crate::config::DiscoveryMode::Static => {
            Ok(Arc::new(StaticWorkerSource::new(&config.static_workers)))
        }
        crate::config::DiscoveryMode::Cluster => {
            let namespace = config
                .cluster_namespace
                .clone()
                .ok_or_else(|| anyhow::anyhow!("cluster discovery requires --cluster-namespace"))?;
            let service = config
                .cluster_service
                .clone()
                .ok_or_else(|| anyhow::anyhow!("cluster discovery requires --cluster-service"))?;
            let client = Client::try_default().await.map_err(|err| {
                error!("failed to build Kubernetes client: {err}");
                anyhow::anyhow!("failed to build Kubernetes client: {err}")
            })?;
            Ok(Arc::new(ClusterWorkerSource::new(
                client,
                namespace,
                service,
                config.cluster_port,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_source_parses_host_port_pairs() {
        let source = StaticWorkerSource::new(&["w1:8000".to_string(), "w2:9000".to_string()]);
        let workers = source.discover().await;
        assert_eq!(
            workers,
            vec![("w1".to_string(), 8000), ("w2".to_string(), 9000)]
        );
    }

    #[tokio::test]
    async fn static_source_drops_malformed_entries() {
        let source = StaticWorkerSource::new(&["not-a-worker".to_string(), "w1:8000".to_string()]);
        let workers = source.discover().await;
        assert_eq!(workers, vec![("w1".to_string(), 8000)]);
    }

    #[tokio::test]
    async fn discovery_loop_adds_new_workers_as_unhealthy() {
        let registry = Arc::new(WorkerRegistry::new());
        let source: Arc<dyn WorkerSource> =
            Arc::new(StaticWorkerSource::new(&["w1:8000".to_string()]));
        let loop_ = DiscoveryLoop::new(source, registry.clone());
        loop_.tick().await;

        let worker = registry.get(&WorkerId::new("w1", 8000)).unwrap();
        assert!(!worker.healthy);
    }

    #[tokio::test]
    async fn discovery_loop_removes_delisted_workers() {
        let registry = Arc::new(WorkerRegistry::new());
        registry.upsert(Worker::new("stale", 8000).with_health(true));
        let source: Arc<dyn WorkerSource> = Arc::new(StaticWorkerSource::new(&[]));
        let loop_ = DiscoveryLoop::new(source, registry.clone());
        loop_.tick().await;

        assert!(registry.get(&WorkerId::new("stale", 8000)).is_none());
    }

    #[tokio::test]
    async fn discovery_loop_leaves_known_workers_untouched() {
        let registry = Arc::new(WorkerRegistry::new());
        registry.upsert(Worker::new("w1", 8000).with_health(true).with_load(3));
        let source: Arc<dyn WorkerSource> =
            Arc::new(StaticWorkerSource::new(&["w1:8000".to_string()]));
        let loop_ = DiscoveryLoop::new(source, registry.clone());
        loop_.tick().await;

        let worker = registry.get(&WorkerId::new("w1", 8000)).unwrap();
        assert!(worker.healthy);
        assert_eq!(worker.load, 3);
    }
}
