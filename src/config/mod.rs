//! Gateway configuration, recognized options per the routing/placement spec.

use clap::{Parser, ValueEnum};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DiscoveryMode {
    Cluster,
    Static,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "model-gate", about = "Model-placement and routing gateway")]
pub struct RouterConfig {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    #[arg(long, value_enum, default_value = "static")]
    pub discovery_mode: DiscoveryMode,

    /// `host:port` entries, used when `discovery_mode = static`.
    #[arg(long, value_delimiter = ',')]
    pub static_workers: Vec<String>,

    #[arg(long)]
    pub cluster_namespace: Option<String>,
    #[arg(long)]
    pub cluster_service: Option<String>,
    #[arg(long, default_value_t = 80)]
    pub cluster_port: u16,

    #[arg(long, default_value = "redis://127.0.0.1:6379")]
    pub registry_url: String,
    #[arg(long, default_value = "model:")]
    pub model_key_prefix: String,
    #[arg(long, default_value = "worker:load:")]
    pub worker_load_key_prefix: String,
    #[arg(long, default_value_t = 300)]
    pub registry_ttl_seconds: u64,

    #[arg(long, default_value_t = 30_000)]
    pub discover_ms: u64,
    #[arg(long, default_value_t = 10_000)]
    pub health_ms: u64,
    #[arg(long, default_value_t = 60_000)]
    pub reconcile_ms: u64,
    #[arg(long, default_value_t = 30_000)]
    pub verify_ttl_ms: u64,

    #[arg(long, default_value_t = 2_000)]
    pub probe_timeout_ms: u64,
    #[arg(long, default_value_t = 60_000)]
    pub load_timeout_ms: u64,
    #[arg(long, default_value_t = 10_000)]
    pub unload_timeout_ms: u64,
    #[arg(long, default_value_t = 2_000)]
    pub registry_timeout_ms: u64,

    #[arg(long, default_value_t = 16)]
    pub health_fanout: usize,
    #[arg(long, default_value_t = 4)]
    pub load_fanout: usize,

    #[arg(long, default_value_t = 32)]
    pub default_batch_size: u32,
    #[arg(long, default_value_t = 50)]
    pub default_batch_wait_ms: u32,

    #[arg(long)]
    pub log_level: Option<String>,
    #[arg(long)]
    pub log_json: bool,

    /// Bearer tokens are validated against each url in turn (first 200
    /// response wins); empty disables the check entirely.
    #[arg(long, value_delimiter = ',')]
    pub api_key_validation_urls: Vec<String>,
}

impl RouterConfig {
    pub fn assignment_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_ttl_seconds)
    }
    pub fn discover_interval(&self) -> Duration {
        Duration::from_millis(self.discover_ms)
    }
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_ms)
    }
    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_millis(self.reconcile_ms)
    }
    pub fn verify_ttl(&self) -> Duration {
        Duration::from_millis(self.verify_ttl_ms)
    }
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
    pub fn unload_timeout(&self) -> Duration {
        Duration::from_millis(self.unload_timeout_ms)
    }
    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn model_key(&self, name: &str, version: &str) -> String {
        format!("{}{}:{}", self.model_key_prefix, name, version)
    }

    pub fn load_key(&self, worker_id: &str) -> String {
        format!("{}{}", self.worker_load_key_prefix, worker_id)
    }
}
