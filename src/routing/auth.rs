//! Optional bearer-token gate, grounded directly on the teacher's
//! `authorize_request` in `server.rs`: when no validation urls are
//! configured this is a no-op, otherwise the token is checked against each
//! configured validation endpoint and the result cached.

use axum::extract::{Request, State};
use axum::http::{self, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

const AUTH_FAILURE_MESSAGE: &str = "a valid bearer token is required";

#[derive(Clone)]
pub struct ApiKeyValidator {
    validation_urls: Arc<Vec<String>>,
    cache: Arc<RwLock<HashMap<String, bool>>>,
    client: reqwest::Client,
}

impl ApiKeyValidator {
    pub fn new(validation_urls: Vec<String>, client: reqwest::Client) -> Self {
        Self {
            validation_urls: Arc::new(validation_urls),
            cache: Arc::new(RwLock::new(HashMap::new())),
            client,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.validation_urls.is_empty()
    }

    async fn authorize(&self, headers: &http::HeaderMap) -> Result<(), Response> {
        if self.validation_urls.is_empty() {
            return Ok(());
        }

        let auth_header = headers
            .get(http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| (StatusCode::UNAUTHORIZED, AUTH_FAILURE_MESSAGE).into_response())?;

        if let Some(valid) = self.cache.read().await.get(token).copied() {
            return if valid {
                Ok(())
            } else {
                Err((StatusCode::UNAUTHORIZED, AUTH_FAILURE_MESSAGE).into_response())
            };
        }

        let mut validated = false;
        for url in self.validation_urls.iter() {
            match self
                .client
                .get(url)
                .header(http::header::AUTHORIZATION, format!("Bearer {token}"))
                .send()
                .await
            {
                Ok(response) if response.status() == StatusCode::OK => {
                    validated = true;
                    break;
                }
                Ok(_) => continue,
                Err(err) => warn!("failed to validate API key against {url}: {err}"),
            }
        }

        self.cache.write().await.insert(token.to_string(), validated);

        if validated {
            Ok(())
        } else {
            Err((StatusCode::UNAUTHORIZED, AUTH_FAILURE_MESSAGE).into_response())
        }
    }
}

pub async fn require_api_key(
    State(validator): State<ApiKeyValidator>,
    request: Request,
    next: Next,
) -> Response {
    if let Err(response) = validator.authorize(request.headers()).await {
        return response;
    }
    next.run(request).await
}
