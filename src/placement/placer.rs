//! The core placement decision engine (spec §4.6): `get_worker_for_model`,
//! `assign`, `find_workers_with_model`, `unload_globally`, `unassign`.

use super::cache::PlacementCache;
use super::ModelKey;
use crate::config::RouterConfig;
use crate::errors::GatewayError;
use crate::metrics::GatewayMetrics;
use crate::registry::RegistryStore;
use crate::worker::client::WorkerClient;
use crate::worker::health::fetch_resident_sets;
use crate::worker::{Worker, WorkerId, WorkerRegistry};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

const MAX_ASSIGNMENT_ATTEMPTS: u32 = 3;

pub struct Placer {
    config: Arc<RouterConfig>,
    registry: Arc<dyn RegistryStore>,
    workers: Arc<WorkerRegistry>,
    cache: Arc<PlacementCache>,
    client: Arc<WorkerClient>,
    load_fanout: Arc<Semaphore>,
    health_fanout: Arc<Semaphore>,
}

impl Placer {
    pub fn new(
        config: Arc<RouterConfig>,
        registry: Arc<dyn RegistryStore>,
        workers: Arc<WorkerRegistry>,
        cache: Arc<PlacementCache>,
        client: Arc<WorkerClient>,
    ) -> Self {
        let load_fanout = Arc::new(Semaphore::new(config.load_fanout.max(1)));
        let health_fanout = Arc::new(Semaphore::new(config.health_fanout.max(1)));
        Self {
            config,
            registry,
            workers,
            cache,
            client,
            load_fanout,
            health_fanout,
        }
    }

    /// spec §4.6.1: the primary routing decision.
    pub async fn get_worker_for_model(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Arc<Worker>, GatewayError> {
        let model = ModelKey::new(name, version);
        let model_key = self.config.model_key(name, version);

        // Step 2: read the current assignment, if any.
        let assigned = match self.registry.get(&model_key).await {
            Ok(value) => value,
            Err(err) => {
                // Transient registry read failure: treat as "no assignment".
                warn!("registry read failed for {model_key}, treating as unassigned: {err}");
                None
            }
        };

        if let Some(worker_id_raw) = assigned {
            let worker_id = WorkerId::from(worker_id_raw);

            // 3a: resolve and health-check the assigned worker.
            let worker = self.workers.get(&worker_id);
            let healthy_worker = worker.filter(|w| w.healthy);

            match healthy_worker {
                None => {
                    self.registry.delete(&model_key).await.ok();
                }
                Some(worker) => {
                    // 3b: fresh cache hit short-circuits straight to routing.
                    if self
                        .cache
                        .contains_fresh(&worker_id, &model, self.config.verify_ttl())
                    {
                        return Ok(worker);
                    }

                    // 3c: cache miss/stale -> (re)load, then trust it.
                    let started = Instant::now();
                    let load_result = self.load_on_worker(&worker, name, version).await;
                    match load_result {
                        Ok(()) => {
                            GatewayMetrics::record_load_latency(started.elapsed(), true);
                            self.cache.record(&worker_id, model);
                            return Ok(worker);
                        }
                        Err(err) => {
                            GatewayMetrics::record_load_latency(started.elapsed(), false);
                            warn!("load failed on assigned worker {worker_id}: {err}");
                            self.registry.delete(&model_key).await.ok();
                        }
                    }
                }
            }
        }

        // Step 4: no usable assignment. Reassign from scratch.
        self.assign(name, version).await
    }

    /// spec §4.6.2: least-loaded selection among healthy workers. The load
    /// counter lives in the registry (not the local `Worker` snapshot), so
    /// each candidate's count is read fresh; an absent counter reads as 0.
    /// Ties break on lexicographic `WorkerId` order for determinism.
    pub async fn select_least_loaded(&self) -> Result<Arc<Worker>, GatewayError> {
        let healthy = self.workers.healthy();
        if healthy.is_empty() {
            GatewayMetrics::record_no_healthy_workers();
            return Err(GatewayError::NoHealthyWorkers);
        }

        let mut futures = FuturesUnordered::new();
        for worker in healthy {
            let registry = self.registry.clone();
            let load_key = self.config.load_key(worker.id.as_str());
            futures.push(async move {
                let load = registry
                    .get(&load_key)
                    .await
                    .ok()
                    .flatten()
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0)
                    .max(0);
                (worker, load)
            });
        }

        let mut candidates = Vec::new();
        while let Some(candidate) = futures.next().await {
            candidates.push(candidate);
        }
        candidates.sort_by(|(a, a_load), (b, b_load)| {
            a_load
                .cmp(b_load)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
        Ok(candidates.into_iter().next().map(|(w, _)| w).unwrap())
    }

    /// spec §4.6.3: claim a worker for `(name, version)`, bounded to 3
    /// attempts against setIfAbsent races (spec §9 Open Questions).
    pub async fn assign(&self, name: &str, version: &str) -> Result<Arc<Worker>, GatewayError> {
        let model = ModelKey::new(name, version);
        let model_key = self.config.model_key(name, version);

        for _attempt in 0..MAX_ASSIGNMENT_ATTEMPTS {
            let candidate = self.select_least_loaded().await?;

            let placed = self
                .registry
                .set_if_absent(&model_key, candidate.id.as_str(), self.config.assignment_ttl())
                .await?;

            let winner = if placed {
                candidate.clone()
            } else {
                // Someone else won the race; adopt their winner if healthy.
                match self.registry.get(&model_key).await? {
                    Some(winner_id) => {
                        let winner_id = WorkerId::from(winner_id);
                        match self.workers.get(&winner_id) {
                            Some(w) if w.healthy => w,
                            _ => continue,
                        }
                    }
                    None => continue,
                }
            };

            if !placed {
                // Adopted someone else's assignment; trust it without loading
                // again (the original caller owns the load side effect).
                return Ok(winner);
            }

            self.registry
                .incr_by(&self.config.load_key(winner.id.as_str()), 1)
                .await?;

            let started = Instant::now();
            match self.load_on_worker(&winner, name, version).await {
                Ok(()) => {
                    GatewayMetrics::record_load_latency(started.elapsed(), true);
                    GatewayMetrics::record_assignment();
                    self.cache.record(&winner.id, model);
                    return Ok(winner);
                }
                Err(err) => {
                    GatewayMetrics::record_load_latency(started.elapsed(), false);
                    self.registry.delete(&model_key).await.ok();
                    self.registry
                        .incr_by(&self.config.load_key(winner.id.as_str()), -1)
                        .await
                        .ok();
                    return Err(err);
                }
            }
        }

        GatewayMetrics::record_assignment_race();
        Err(GatewayError::AssignmentRace {
            model: model.canonical(),
            attempts: MAX_ASSIGNMENT_ATTEMPTS,
        })
    }

    async fn load_on_worker(
        &self,
        worker: &Worker,
        name: &str,
        version: &str,
    ) -> Result<(), GatewayError> {
        let _permit = self
            .load_fanout
            .acquire()
            .await
            .expect("semaphore never closed");
        self.client
            .load(
                &worker.url(),
                name,
                version,
                self.config.default_batch_size,
                self.config.default_batch_wait_ms,
            )
            .await
    }

    /// spec §4.6.4: ground-truth query across all healthy workers, bypassing
    /// the registry (which may be stale after a crash).
    pub async fn find_workers_with_model(
        &self,
        name: &str,
        version: &str,
    ) -> Vec<Arc<Worker>> {
        let model = ModelKey::new(name, version);
        let healthy = self.workers.healthy();
        let resident_sets = fetch_resident_sets(&healthy, &self.client, &self.health_fanout).await;

        healthy
            .into_iter()
            .filter(|w| {
                resident_sets
                    .get(&w.id)
                    .is_some_and(|models| models.contains(&model))
            })
            .collect()
    }

    /// spec §4.6.5: the global-unload transaction.
    pub async fn unload_globally(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Vec<WorkerId>, GatewayError> {
        let model = ModelKey::new(name, version);
        let model_key = self.config.model_key(name, version);

        let residents = self.find_workers_with_model(name, version).await;
        if residents.is_empty() {
            return Err(GatewayError::ModelNotFound {
                name: name.to_string(),
                version: version.to_string(),
            });
        }

        let mut futures = FuturesUnordered::new();
        for worker in &residents {
            let client = self.client.clone();
            let worker = worker.clone();
            let name = name.to_string();
            let version = version.to_string();
            futures.push(async move {
                let started = Instant::now();
                let result = client.unload(&worker.url(), &name, &version).await;
                GatewayMetrics::record_unload_latency(started.elapsed(), result.is_ok());
                (worker, result)
            });
        }

        let mut unloaded = Vec::new();
        while let Some((worker, result)) = futures.next().await {
            match result {
                Ok(()) => unloaded.push(worker),
                Err(err) => {
                    warn!("unload failed on {}: {err} (reconciler will repair)", worker.id);
                }
            }
        }

        // Delete the assignment once, unconditionally, regardless of
        // per-worker unload outcomes.
        self.registry.delete(&model_key).await.ok();

        for worker in &unloaded {
            self.registry
                .incr_by(&self.config.load_key(worker.id.as_str()), -1)
                .await
                .ok();
            self.cache.remove(&worker.id, &model);
        }

        info!(
            "unloaded {}:{} from {} of {} resident workers",
            name,
            version,
            unloaded.len(),
            residents.len()
        );

        Ok(unloaded.into_iter().map(|w| w.id.clone()).collect())
    }

    /// spec §4.6.6: idempotent per-worker unassign.
    pub async fn unassign(
        &self,
        name: &str,
        version: &str,
        worker_id: &WorkerId,
    ) -> Result<(), GatewayError> {
        let model = ModelKey::new(name, version);
        let model_key = self.config.model_key(name, version);

        self.registry.delete(&model_key).await?;
        self.registry
            .incr_by(&self.config.load_key(worker_id.as_str()), -1)
            .await?;
        self.cache.remove(worker_id, &model);
        debug!("unassigned {name}:{version} from {worker_id}");
        Ok(())
    }
}
