//! In-memory fake registry for tests, honoring TTL expiry.

use super::RegistryStore;
use crate::errors::GatewayError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() < deadline,
            None => true,
        }
    }
}

#[derive(Default)]
pub struct InMemoryRegistryStore {
    data: Mutex<HashMap<String, Entry>>,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let mut data = self.data.lock();
        if let Some(entry) = data.get(key) {
            if entry.is_live() {
                return Ok(Some(entry.value.clone()));
            }
            data.remove(key);
        }
        Ok(None)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, GatewayError> {
        let mut data = self.data.lock();
        if let Some(entry) = data.get(key) {
            if entry.is_live() {
                return Ok(false);
            }
        }
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let mut data = self.data.lock();
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        self.data.lock().remove(key);
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, GatewayError> {
        let mut data = self.data.lock();
        let current = data
            .get(key)
            .filter(|e| e.is_live())
            .and_then(|e| e.value.parse::<i64>().ok())
            .unwrap_or(0);
        let next = current + delta;
        data.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        let mut data = self.data.lock();
        let expired: Vec<String> = data
            .iter()
            .filter(|(_, e)| !e.is_live())
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            data.remove(&key);
        }
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
