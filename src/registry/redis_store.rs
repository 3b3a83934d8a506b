//! Redis-backed `RegistryStore`, built on `deadpool-redis` the way the
//! teacher crate already leans on `deadpool` for pooled async resources.

use super::RegistryStore;
use crate::errors::GatewayError;
use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisRegistryStore {
    pool: Pool,
}

impl RedisRegistryStore {
    pub fn connect(url: &str) -> Result<Self, GatewayError> {
        let cfg = Config::from_url(url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| GatewayError::Registry(format!("failed to build redis pool: {e}")))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, GatewayError> {
        self.pool
            .get()
            .await
            .map_err(|e| GatewayError::Registry(format!("failed to get redis connection: {e}")))
    }
}

#[async_trait]
impl RegistryStore for RedisRegistryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, GatewayError> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| GatewayError::Registry(format!("GET {key} failed: {e}")))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, GatewayError> {
        let mut conn = self.conn().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| GatewayError::Registry(format!("SET NX {key} failed: {e}")))?;
        Ok(result.is_some())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn().await?;
        conn.set(key, value)
            .await
            .map_err(|e| GatewayError::Registry(format!("SET {key} failed: {e}")))
    }

    async fn delete(&self, key: &str) -> Result<(), GatewayError> {
        let mut conn = self.conn().await?;
        let _: i64 = conn
            .del(key)
            .await
            .map_err(|e| GatewayError::Registry(format!("DEL {key} failed: {e}")))?;
        Ok(())
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, GatewayError> {
        let mut conn = self.conn().await?;
        conn.incr(key, delta)
            .await
            .map_err(|e| GatewayError::Registry(format!("INCRBY {key} failed: {e}")))
    }

    async fn scan(&self, prefix: &str) -> Result<Vec<String>, GatewayError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await
                .map_err(|e| GatewayError::Registry(format!("SCAN {prefix} failed: {e}")))?;
            keys.extend(batch);
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(keys)
    }
}
