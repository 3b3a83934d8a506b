//! Periodic repair of drift between the registry, the placement cache, and
//! worker ground truth (spec §4.7). Shares `fetch_resident_sets` with the
//! Placer rather than duplicating the fan-out probe (spec §9 DESIGN NOTES:
//! "Factor a shared `fetchResidentSets(workers)` primitive").

use super::cache::PlacementCache;
use super::ModelKey;
use crate::config::RouterConfig;
use crate::errors::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::registry::RegistryStore;
use crate::worker::client::WorkerClient;
use crate::worker::health::fetch_resident_sets;
use crate::worker::{Worker, WorkerId, WorkerRegistry};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

pub struct Reconciler {
    config: Arc<RouterConfig>,
    registry: Arc<dyn RegistryStore>,
    workers: Arc<WorkerRegistry>,
    cache: Arc<PlacementCache>,
    client: Arc<WorkerClient>,
    fanout: Arc<Semaphore>,
}

impl Reconciler {
    pub fn new(
        config: Arc<RouterConfig>,
        registry: Arc<dyn RegistryStore>,
        workers: Arc<WorkerRegistry>,
        cache: Arc<PlacementCache>,
        client: Arc<WorkerClient>,
        health_fanout: usize,
    ) -> Self {
        Self {
            config,
            registry,
            workers,
            cache,
            client,
            fanout: Arc::new(Semaphore::new(health_fanout.max(1))),
        }
    }

    /// One reconcile pass. Any single error is logged and the pass continues
    /// on a best-effort basis; the next tick retries.
    pub async fn tick(&self) {
        let started = Instant::now();
        let healthy = self.workers.healthy();
        let healthy_ids: HashSet<WorkerId> = healthy.iter().map(|w| w.id.clone()).collect();

        let mut resident_sets: HashMap<WorkerId, HashSet<ModelKey>> =
            fetch_resident_sets(&healthy, &self.client, &self.fanout).await;
        for worker in &healthy {
            resident_sets.entry(worker.id.clone()).or_default();
        }

        self.cache.replace_all(resident_sets.clone());

        if let Err(err) = self.repair_assignments(&healthy_ids, &resident_sets).await {
            warn!("reconcile: repairing assignments failed: {err}");
        }

        for (worker_id, models) in &resident_sets {
            let load = models.len() as i64;
            let load_key = self.config.load_key(worker_id.as_str());
            if let Err(err) = self.registry.set(&load_key, &load.to_string()).await {
                warn!("reconcile: repairing load counter for {worker_id} failed: {err}");
                continue;
            }
            GatewayMetrics::set_worker_load(worker_id.as_str(), load);
            if let Some(worker) = self.workers.get(worker_id) {
                self.workers.upsert(Worker {
                    load,
                    ..(*worker).clone()
                });
            }
        }

        GatewayMetrics::record_reconcile_tick(started.elapsed());
        debug!(
            "reconcile tick complete: {} healthy workers, {} ms",
            healthy.len(),
            started.elapsed().as_millis()
        );
    }

    async fn repair_assignments(
        &self,
        healthy_ids: &HashSet<WorkerId>,
        resident_sets: &HashMap<WorkerId, HashSet<ModelKey>>,
    ) -> Result<(), GatewayError> {
        let keys = self.registry.scan(&self.config.model_key_prefix).await?;
        let mut assigned_models: HashSet<ModelKey> = HashSet::new();

        for key in keys {
            let Some(raw_model) = key.strip_prefix(&self.config.model_key_prefix) else {
                continue;
            };
            let Some(model) = ModelKey::parse(raw_model) else {
                continue;
            };
            let Some(worker_id_raw) = self.registry.get(&key).await? else {
                continue;
            };
            let worker_id = WorkerId::from(worker_id_raw);

            let still_resident = resident_sets
                .get(&worker_id)
                .is_some_and(|models| models.contains(&model));

            if !healthy_ids.contains(&worker_id) || !still_resident {
                self.registry.delete(&key).await.ok();
            } else {
                assigned_models.insert(model);
            }
        }

        for (worker_id, models) in resident_sets {
            for model in models {
                if assigned_models.contains(model) {
                    continue;
                }
                let key = self.config.model_key(&model.name, &model.version);
                match self
                    .registry
                    .set_if_absent(&key, worker_id.as_str(), self.config.assignment_ttl())
                    .await
                {
                    Ok(_) => {
                        assigned_models.insert(model.clone());
                    }
                    Err(err) => {
                        error!("reconcile: failed to ensure assignment for {model}: {err}");
                    }
                }
            }
        }

        Ok(())
    }

    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    debug!("reconciler shutting down");
                    break;
                }
            }
        }
    }
}
