//! In-process cache of "which models each worker currently holds" (spec
//! §4.4). Per-worker entries are swapped as whole immutable `Arc` values so
//! concurrent readers never observe a torn set (DESIGN NOTES §9: "Do not
//! expose references to internal sets").

use super::ModelKey;
use crate::worker::WorkerId;
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
struct WorkerCacheEntry {
    resident: HashSet<ModelKey>,
    verified_at: HashMap<ModelKey, Instant>,
}

#[derive(Debug, Default)]
pub struct PlacementCache {
    entries: DashMap<WorkerId, Arc<WorkerCacheEntry>>,
}

impl PlacementCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// `contains(W, M) ∧ fresh(W, M)`.
    pub fn contains_fresh(&self, worker: &WorkerId, model: &ModelKey, ttl: Duration) -> bool {
        let Some(entry) = self.entries.get(worker) else {
            return false;
        };
        match entry.verified_at.get(model) {
            Some(verified_at) => verified_at.elapsed() < ttl,
            None => false,
        }
    }

    /// Adds `model` to `worker`'s resident set and stamps it with `now`.
    pub fn record(&self, worker: &WorkerId, model: ModelKey) {
        let mut next = self
            .entries
            .get(worker)
            .map(|e| (**e).clone())
            .unwrap_or_default();
        next.resident.insert(model.clone());
        next.verified_at.insert(model, Instant::now());
        self.entries.insert(worker.clone(), Arc::new(next));
    }

    /// Removes `model` from `worker`'s resident set and clears its stamp.
    pub fn remove(&self, worker: &WorkerId, model: &ModelKey) {
        let Some(current) = self.entries.get(worker) else {
            return;
        };
        let mut next = (**current).clone();
        drop(current);
        next.resident.remove(model);
        next.verified_at.remove(model);
        self.entries.insert(worker.clone(), Arc::new(next));
    }

    /// Wholesale replacement used by the Reconciler: every entry in
    /// `mapping` is stamped with `now`, and workers absent from `mapping`
    /// are cleared entirely (they are no longer known-healthy).
    pub fn replace_all(&self, mapping: HashMap<WorkerId, HashSet<ModelKey>>) {
        self.entries.clear();
        let now = Instant::now();
        for (worker, models) in mapping {
            let verified_at = models.iter().cloned().map(|m| (m, now)).collect();
            self.entries.insert(
                worker,
                Arc::new(WorkerCacheEntry {
                    resident: models,
                    verified_at,
                }),
            );
        }
    }

    pub fn resident_set(&self, worker: &WorkerId) -> HashSet<ModelKey> {
        self.entries
            .get(worker)
            .map(|e| e.resident.clone())
            .unwrap_or_default()
    }
}
