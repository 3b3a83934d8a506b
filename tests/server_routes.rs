//! Exercises the HTTP surface built by `server::build_app`: worker
//! introspection and the optional bearer-token gate.

#[cfg(test)]
mod server_routes_tests {
    use clap::Parser;
    use http_body_util::BodyExt;
    use model_gate::config::RouterConfig;
    use model_gate::registry::{InMemoryRegistryStore, RegistryStore};
    use model_gate::routing::auth::ApiKeyValidator;
    use model_gate::server::{build_app, Gateway};
    use model_gate::worker::{Worker, WorkerId};
    use reqwest::Client;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_config() -> RouterConfig {
        RouterConfig::parse_from(["model-gate"])
    }

    fn gateway_with_one_worker() -> Gateway {
        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let gateway = Gateway::new(test_config(), registry);
        gateway
            .workers
            .upsert(Worker::new("127.0.0.1", 9001).with_health(true).with_load(2));
        gateway
    }

    fn disabled_validator() -> ApiKeyValidator {
        ApiKeyValidator::new(Vec::new(), Client::new())
    }

    #[tokio::test]
    async fn list_workers_returns_known_workers() {
        let gateway = gateway_with_one_worker();
        let app = build_app(gateway, 1024 * 1024, disabled_validator());

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/workers")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["workers"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_worker_returns_its_resident_models_and_load() {
        let gateway = gateway_with_one_worker();
        let app = build_app(gateway, 1024 * 1024, disabled_validator());
        let id = WorkerId::new("127.0.0.1", 9001);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(format!("/workers/{}", id.as_str()))
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["healthy"], true);
        assert_eq!(json["load"], 2);
    }

    #[tokio::test]
    async fn get_unknown_worker_is_an_error() {
        let gateway = gateway_with_one_worker();
        let app = build_app(gateway, 1024 * 1024, disabled_validator());

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/workers/nobody:1")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn auth_gate_rejects_requests_without_a_bearer_token_when_enabled() {
        let gateway = gateway_with_one_worker();
        let validator =
            ApiKeyValidator::new(vec!["http://127.0.0.1:1/validate".to_string()], Client::new());
        let app = build_app(gateway, 1024 * 1024, validator);

        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/workers")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::UNAUTHORIZED);
    }
}
