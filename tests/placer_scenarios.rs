//! End-to-end placement scenarios (S1-S6) against real HTTP fake workers,
//! exercising the full `Placer` with an in-memory registry.

#[cfg(test)]
mod placer_scenarios_tests {
    use axum::extract::State;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use model_gate::config::RouterConfig;
    use model_gate::errors::GatewayError;
    use model_gate::placement::{Placer, PlacementCache};
    use model_gate::registry::{InMemoryRegistryStore, RegistryStore};
    use model_gate::worker::client::WorkerClient;
    use model_gate::worker::{Worker, WorkerId, WorkerRegistry};
    use reqwest::Client;
    use serde::Serialize;
    use serde_json::Value;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct FakeWorkerState {
        models: Mutex<HashSet<String>>,
        load_calls: AtomicUsize,
        unload_calls: AtomicUsize,
        healthy: std::sync::atomic::AtomicBool,
    }

    #[derive(Serialize)]
    struct HealthBody {
        status: &'static str,
        models: Vec<String>,
    }

    async fn health_handler(State(state): State<Arc<FakeWorkerState>>) -> axum::response::Response {
        if !state.healthy.load(Ordering::SeqCst) {
            return axum::http::StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        let models: Vec<String> = state.models.lock().unwrap().iter().cloned().collect();
        Json(HealthBody {
            status: "ok",
            models,
        })
        .into_response()
    }

    async fn load_handler(
        State(state): State<Arc<FakeWorkerState>>,
        Json(body): Json<Value>,
    ) -> axum::response::Response {
        state.load_calls.fetch_add(1, Ordering::SeqCst);
        let name = body["model_name"].as_str().unwrap_or_default();
        let version = body["version"].as_str().unwrap_or_default();
        state
            .models
            .lock()
            .unwrap()
            .insert(format!("{name}:{version}"));
        Json(serde_json::json!({"status": "loaded"})).into_response()
    }

    async fn unload_handler(
        State(state): State<Arc<FakeWorkerState>>,
        Json(body): Json<Value>,
    ) -> axum::response::Response {
        state.unload_calls.fetch_add(1, Ordering::SeqCst);
        let name = body["model_name"].as_str().unwrap_or_default();
        let version = body["version"].as_str().unwrap_or_default();
        state
            .models
            .lock()
            .unwrap()
            .remove(&format!("{name}:{version}"));
        Json(serde_json::json!({"status": "unloaded"})).into_response()
    }

    use axum::response::IntoResponse;

    async fn spawn_fake_worker(initial_models: &[&str]) -> (WorkerId, Arc<FakeWorkerState>) {
        let state = Arc::new(FakeWorkerState {
            models: Mutex::new(initial_models.iter().map(|s| s.to_string()).collect()),
            load_calls: AtomicUsize::new(0),
            unload_calls: AtomicUsize::new(0),
            healthy: std::sync::atomic::AtomicBool::new(true),
        });

        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/models/load", post(load_handler))
            .route("/models/unload", post(unload_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (WorkerId::new("127.0.0.1", addr.port()), state)
    }

    fn test_config() -> Arc<RouterConfig> {
        Arc::new(RouterConfig::parse_from(["model-gate"]))
    }

    fn placer_for(
        config: Arc<RouterConfig>,
        registry: Arc<dyn RegistryStore>,
        workers: Arc<WorkerRegistry>,
        cache: Arc<PlacementCache>,
    ) -> Placer {
        let client = Arc::new(WorkerClient::new(
            Client::new(),
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        Placer::new(config, registry, workers, cache, client)
    }

    use clap::Parser;

    #[tokio::test]
    async fn s1_cold_predict_auto_loads() {
        let (id1, state1) = spawn_fake_worker(&[]).await;
        let (id2, state2) = spawn_fake_worker(&[]).await;
        let (host1, port1) = split(&id1);
        let (host2, port2) = split(&id2);

        let workers = Arc::new(WorkerRegistry::new());
        workers.upsert(Worker::new(host1, port1).with_health(true));
        workers.upsert(Worker::new(host2, port2).with_health(true));

        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();
        let placer = placer_for(config.clone(), registry.clone(), workers.clone(), cache);

        let expected_first = if id1.as_str() < id2.as_str() { &id1 } else { &id2 };
        let expected_state = if expected_first == &id1 { &state1 } else { &state2 };

        let worker = placer.get_worker_for_model("iris", "v1").await.unwrap();
        assert_eq!(&worker.id, expected_first);
        assert_eq!(expected_state.load_calls.load(Ordering::SeqCst), 1);

        let model_key = config.model_key("iris", "v1");
        assert_eq!(
            registry.get(&model_key).await.unwrap(),
            Some(expected_first.as_str().to_string())
        );
        let load_key = config.load_key(expected_first.as_str());
        assert_eq!(registry.get(&load_key).await.unwrap(), Some("1".to_string()));
    }

    #[tokio::test]
    async fn s2_warm_predict_hits_cache() {
        let (id, state) = spawn_fake_worker(&[]).await;
        let (host, port) = split(&id);

        let workers = Arc::new(WorkerRegistry::new());
        workers.upsert(Worker::new(host, port).with_health(true));

        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();
        let placer = placer_for(config, registry, workers, cache);

        placer.get_worker_for_model("iris", "v1").await.unwrap();
        assert_eq!(state.load_calls.load(Ordering::SeqCst), 1);

        let worker = placer.get_worker_for_model("iris", "v1").await.unwrap();
        assert_eq!(worker.id, id);
        assert_eq!(state.load_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn s3_owner_unhealthy_reassigns() {
        let (id1, state1) = spawn_fake_worker(&[]).await;
        let (id2, state2) = spawn_fake_worker(&[]).await;
        let (host1, port1) = split(&id1);
        let (host2, port2) = split(&id2);

        let workers = Arc::new(WorkerRegistry::new());
        workers.upsert(Worker::new(host1.clone(), port1).with_health(true));
        workers.upsert(Worker::new(host2.clone(), port2).with_health(true));

        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();
        let placer = placer_for(config.clone(), registry.clone(), workers.clone(), cache);

        let first = placer.get_worker_for_model("iris", "v1").await.unwrap();
        let _ = (&state1, &state2);

        let dead_id = first.id.clone();
        let (dead_host, dead_port) = if dead_id == id1 {
            (host1.clone(), port1)
        } else {
            (host2.clone(), port2)
        };
        workers.upsert(Worker::new(dead_host, dead_port).with_health(false));

        let worker = placer.get_worker_for_model("iris", "v1").await.unwrap();
        assert_ne!(worker.id, dead_id);
    }

    #[tokio::test]
    async fn s4_global_unload() {
        let (id1, state1) = spawn_fake_worker(&["iris:v1"]).await;
        let (id2, state2) = spawn_fake_worker(&["iris:v1"]).await;
        let (host1, port1) = split(&id1);
        let (host2, port2) = split(&id2);

        let workers = Arc::new(WorkerRegistry::new());
        workers.upsert(Worker::new(host1, port1).with_health(true));
        workers.upsert(Worker::new(host2, port2).with_health(true));

        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();
        let placer = placer_for(config.clone(), registry.clone(), workers, cache);

        let unloaded = placer.unload_globally("iris", "v1").await.unwrap();
        assert_eq!(unloaded.len(), 2);
        assert_eq!(state1.unload_calls.load(Ordering::SeqCst), 1);
        assert_eq!(state2.unload_calls.load(Ordering::SeqCst), 1);

        let model_key = config.model_key("iris", "v1");
        assert_eq!(registry.get(&model_key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn s5_unload_with_no_resident_fails_with_model_not_found() {
        let (id, _state) = spawn_fake_worker(&[]).await;
        let (host, port) = split(&id);

        let workers = Arc::new(WorkerRegistry::new());
        workers.upsert(Worker::new(host, port).with_health(true));

        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();
        let placer = placer_for(config, registry, workers, cache);

        let err = placer.unload_globally("ghost", "v1").await.unwrap_err();
        assert!(matches!(err, GatewayError::ModelNotFound { .. }));
    }

    #[tokio::test]
    async fn no_healthy_workers_fails_without_registry_mutation() {
        let workers = Arc::new(WorkerRegistry::new());
        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();
        let placer = placer_for(config.clone(), registry.clone(), workers, cache);

        let err = placer.get_worker_for_model("iris", "v1").await.unwrap_err();
        assert!(matches!(err, GatewayError::NoHealthyWorkers));
        assert_eq!(
            registry.get(&config.model_key("iris", "v1")).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn s6_reconcile_repairs_stale_assignment() {
        use model_gate::placement::Reconciler;
        use model_gate::worker::client::WorkerClient as Client2;

        let (id1, _state1) = spawn_fake_worker(&[]).await;
        let (id2, _state2) = spawn_fake_worker(&["iris:v1"]).await;
        let (host1, port1) = split(&id1);
        let (host2, port2) = split(&id2);

        let workers = Arc::new(WorkerRegistry::new());
        workers.upsert(Worker::new(host1, port1).with_health(true));
        workers.upsert(Worker::new(host2, port2).with_health(true));

        let registry: Arc<dyn RegistryStore> = Arc::new(InMemoryRegistryStore::new());
        let cache = Arc::new(PlacementCache::new());
        let config = test_config();

        registry
            .set_if_absent(
                &config.model_key("iris", "v1"),
                id1.as_str(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        registry.set(&config.load_key(id1.as_str()), "1").await.unwrap();

        let client: Arc<Client2> = Arc::new(Client2::new(
            Client::new(),
            Duration::from_secs(2),
            Duration::from_secs(5),
            Duration::from_secs(5),
        ));
        let reconciler = Reconciler::new(
            config.clone(),
            registry.clone(),
            workers.clone(),
            cache.clone(),
            client,
            4,
        );

        reconciler.tick().await;

        assert_eq!(
            registry.get(&config.model_key("iris", "v1")).await.unwrap(),
            Some(id2.as_str().to_string())
        );
        assert_eq!(
            registry.get(&config.load_key(id1.as_str())).await.unwrap(),
            Some("0".to_string())
        );
        assert_eq!(
            registry.get(&config.load_key(id2.as_str())).await.unwrap(),
            Some("1".to_string())
        );

        // The repaired count is also published into the in-memory registry,
        // not only written out to the external store.
        assert_eq!(workers.get(&id1).unwrap().load, 0);
        assert_eq!(workers.get(&id2).unwrap().load, 1);
    }

    fn split(id: &WorkerId) -> (String, u16) {
        let (host, port) = id.as_str().rsplit_once(':').unwrap();
        (host.to_string(), port.parse().unwrap())
    }
}
