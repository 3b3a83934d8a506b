//! Worker identity and the process-wide worker registry.
//!
//! Workers are represented as immutable snapshots (per DESIGN NOTES: "Worker
//! state as value, not object") and published atomically through a
//! [`dashmap::DashMap`], mirroring the teacher's `WorkerRegistry` /
//! `BasicWorker` split but without a mutable `healthy` flag patched in
//! place.

pub mod client;
pub mod health;
pub mod source;

use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(String);

impl WorkerId {
    pub fn new(host: &str, port: u16) -> Self {
        WorkerId(format!("{host}:{port}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for WorkerId {
    fn from(value: String) -> Self {
        WorkerId(value)
    }
}

impl From<&str> for WorkerId {
    fn from(value: &str) -> Self {
        WorkerId(value.to_string())
    }
}

/// An immutable snapshot of a worker's known state. Replacing a worker's
/// entry in the registry is how health transitions are published; nothing
/// ever mutates a `Worker` value in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Worker {
    pub id: WorkerId,
    pub host: String,
    pub port: u16,
    pub healthy: bool,
    /// Advisory, repaired by the Reconciler. May be negative transiently;
    /// callers must clamp with `load.max(0)` when comparing.
    pub load: i64,
}

impl Worker {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let id = WorkerId::new(&host, port);
        Self {
            id,
            host,
            port,
            healthy: false,
            load: 0,
        }
    }

    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    pub fn with_load(mut self, load: i64) -> Self {
        self.load = load;
        self
    }

    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn clamped_load(&self) -> i64 {
        self.load.max(0)
    }
}

/// Process-wide, single-writer (WorkerSource + HealthMonitor), many-reader
/// map of known workers. Readers get owned snapshots (`Arc<Worker>`), never
/// a reference into the map, per DESIGN NOTES §9.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: DashMap<WorkerId, Arc<Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: DashMap::new(),
        }
    }

    /// Insert or wholesale-replace a worker's snapshot.
    pub fn upsert(&self, worker: Worker) {
        self.workers.insert(worker.id.clone(), Arc::new(worker));
    }

    pub fn remove(&self, id: &WorkerId) {
        self.workers.remove(id);
    }

    pub fn get(&self, id: &WorkerId) -> Option<Arc<Worker>> {
        self.workers.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of every known worker, healthy or not.
    pub fn all(&self) -> Vec<Arc<Worker>> {
        self.workers.iter().map(|e| e.value().clone()).collect()
    }

    /// Snapshot of the currently healthy workers. Does not coordinate with
    /// in-flight health probes (spec ordering guarantee).
    pub fn healthy(&self) -> Vec<Arc<Worker>> {
        self.workers
            .iter()
            .filter(|e| e.value().healthy)
            .map(|e| e.value().clone())
            .collect()
    }

    /// Worker ids currently known, used by the discovery loop to detect
    /// removals and by the reconciler to detect staleness.
    pub fn known_ids(&self) -> Vec<WorkerId> {
        self.workers.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
