//! The external assignment/load-counter store (spec §4.3): a thin,
//! swappable abstraction over Redis, grounded in the teacher's pattern of
//! trait-backed storage (`SharedResponseStorage` with `Memory`/`NoOp`
//! implementations in `server.rs`).

pub mod memory_store;
pub mod redis_store;

use crate::errors::GatewayError;
use async_trait::async_trait;
use std::time::Duration;

pub use memory_store::InMemoryRegistryStore;
pub use redis_store::RedisRegistryStore;

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError>;

    /// Atomic create-only set. Returns `true` if this call created the key.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, GatewayError>;

    /// Unconditional set, no TTL.
    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError>;

    /// Idempotent delete.
    async fn delete(&self, key: &str) -> Result<(), GatewayError>;

    /// Atomic integer increment (may go negative). Creates the key at
    /// `delta` if absent.
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, GatewayError>;

    /// All keys currently matching `prefix*`.
    async fn scan(&self, prefix: &str) -> Result<Vec<String>, GatewayError>;
}
