//! Typed HTTP client against a single worker (spec §4.5), modeled on the
//! teacher's `routes::SingleServerRoute` / `reqwest::Client` usage.

use crate::errors::GatewayError;
use crate::placement::ModelKey;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Only the fields the gateway actually consumes; unknown fields are
/// tolerated for forward compatibility (spec DESIGN NOTES, "Dynamic JSON").
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerHealthResponse {
    #[serde(default)]
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
struct LoadRequestBody<'a> {
    model_name: &'a str,
    version: &'a str,
    batch_size: u32,
    batch_wait_ms: u32,
}

#[derive(Debug, Clone, Serialize)]
struct UnloadRequestBody<'a> {
    model_name: &'a str,
    version: &'a str,
}

#[derive(Debug, Clone)]
pub struct WorkerClient {
    client: Client,
    probe_timeout: Duration,
    load_timeout: Duration,
    unload_timeout: Duration,
}

impl WorkerClient {
    pub fn new(
        client: Client,
        probe_timeout: Duration,
        load_timeout: Duration,
        unload_timeout: Duration,
    ) -> Self {
        Self {
            client,
            probe_timeout,
            load_timeout,
            unload_timeout,
        }
    }

    /// `GET {worker}/health`. Only `models` is consumed from the response.
    pub async fn health(&self, worker_url: &str) -> Result<WorkerHealthResponse, GatewayError> {
        let response = self
            .client
            .get(format!("{worker_url}/health"))
            .timeout(self.probe_timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::WorkerUnavailable(format!(
                "{worker_url} returned {}",
                response.status()
            )));
        }

        response
            .json::<WorkerHealthResponse>()
            .await
            .map_err(GatewayError::from)
    }

    /// Resident models parsed into [`ModelKey`]s, skipping entries that
    /// don't parse as `name:version`.
    pub async fn resident_models(&self, worker_url: &str) -> Result<Vec<ModelKey>, GatewayError> {
        let health = self.health(worker_url).await?;
        Ok(health
            .models
            .iter()
            .filter_map(|raw| ModelKey::parse(raw))
            .collect())
    }

    /// `POST {worker}/models/load`. Tolerates HTTP 200 with an
    /// "already loaded" body as success.
    pub async fn load(
        &self,
        worker_url: &str,
        name: &str,
        version: &str,
        batch_size: u32,
        batch_wait_ms: u32,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(format!("{worker_url}/models/load"))
            .timeout(self.load_timeout)
            .json(&LoadRequestBody {
                model_name: name,
                version,
                batch_size,
                batch_wait_ms,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.is_success() {
            return Ok(());
        }

        if body.to_lowercase().contains("already loaded") {
            return Ok(());
        }

        Err(GatewayError::WorkerLoadFailed {
            worker: worker_url.to_string(),
            model: format!("{name}:{version}"),
            reason: format!("status={status} body={body}"),
        })
    }

    /// `POST {worker}/models/unload`.
    pub async fn unload(
        &self,
        worker_url: &str,
        name: &str,
        version: &str,
    ) -> Result<(), GatewayError> {
        let response = self
            .client
            .post(format!("{worker_url}/models/unload"))
            .timeout(self.unload_timeout)
            .json(&UnloadRequestBody {
                model_name: name,
                version,
            })
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GatewayError::WorkerUnavailable(format!(
                "unload on {worker_url} returned {}",
                response.status()
            )))
        }
    }
}
