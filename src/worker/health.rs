//! Background health probing (spec §4.2). The routine tick only flips the
//! `healthy` flag; the models observed along the way are returned so the
//! Reconciler can reuse them instead of re-probing (spec §4.7, and the same
//! `fetch_resident_sets` primitive backs `Placer::find_workers_with_model`).

use super::client::WorkerClient;
use super::{Worker, WorkerId, WorkerRegistry};
use crate::metrics::GatewayMetrics;
use crate::placement::ModelKey;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

/// Probes `workers` concurrently (bounded by `fanout`), returning each
/// worker's resident model set. Workers that fail to respond are simply
/// absent from the result, never mapped to an empty set.
pub async fn fetch_resident_sets(
    workers: &[Arc<Worker>],
    client: &WorkerClient,
    fanout: &Semaphore,
) -> HashMap<WorkerId, HashSet<ModelKey>> {
    let mut futures = FuturesUnordered::new();
    for worker in workers {
        let worker = worker.clone();
        let client = client.clone();
        futures.push(async move {
            let _permit = fanout.acquire().await.expect("semaphore never closed");
            let result = client.resident_models(&worker.url()).await;
            (worker.id.clone(), result)
        });
    }

    let mut out = HashMap::new();
    while let Some((id, result)) = futures.next().await {
        match result {
            Ok(models) => {
                out.insert(id, models.into_iter().collect::<HashSet<_>>());
            }
            Err(err) => {
                debug!("resident-model probe failed for {id}: {err}");
            }
        }
    }
    out
}

pub struct HealthMonitor {
    workers: Arc<WorkerRegistry>,
    client: Arc<WorkerClient>,
    fanout: Arc<Semaphore>,
}

impl HealthMonitor {
    pub fn new(workers: Arc<WorkerRegistry>, client: Arc<WorkerClient>, fanout: usize) -> Self {
        Self {
            workers,
            client,
            fanout: Arc::new(Semaphore::new(fanout.max(1))),
        }
    }

    /// One probing pass over every known worker (healthy or not, so
    /// recoveries are detected). Updates `healthy` in place via whole-value
    /// replacement and returns the resident sets observed for workers that
    /// answered, for the Reconciler to fold into the placement cache.
    pub async fn probe_once(&self) -> HashMap<WorkerId, HashSet<ModelKey>> {
        let known = self.workers.all();
        let mut futures = FuturesUnordered::new();

        for worker in known {
            let client = self.client.clone();
            let fanout = self.fanout.clone();
            futures.push(async move {
                let _permit = fanout.acquire().await.expect("semaphore never closed");
                let result = client.resident_models(&worker.url()).await;
                (worker, result)
            });
        }

        let mut resident_sets = HashMap::new();
        let mut healthy_count = 0usize;
        let mut total_count = 0usize;

        while let Some((worker, result)) = futures.next().await {
            total_count += 1;
            let healthy = result.is_ok();
            if healthy {
                healthy_count += 1;
            }
            if let Ok(models) = result {
                resident_sets.insert(worker.id.clone(), models.into_iter().collect::<HashSet<_>>());
            }

            let updated = Worker {
                healthy,
                ..(*worker).clone()
            };
            self.workers.upsert(updated);
        }

        GatewayMetrics::set_worker_count(total_count, healthy_count);
        resident_sets
    }

    /// Runs `probe_once` on `interval` until `shutdown` resolves.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
                _ = shutdown.changed() => {
                    debug!("health monitor shutting down");
                    break;
                }
            }
        }
    }
}
