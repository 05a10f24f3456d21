//! Integration tests for the engine API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use engine_lib::backend::ScoringBackend;
use engine_lib::ensemble::{EngineConfig, FraudScoringEngine};
use engine_lib::error::InvokeError;
use engine_lib::health::{components, ComponentHealth, ComponentStatus, HealthRegistry};
use engine_lib::models::FeatureVector;
use engine_lib::observability::EngineMetrics;
use engine_lib::version::{Release, ReleaseIndex};
use prometheus::{Encoder, TextEncoder};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower::ServiceExt;

/// Backend stub: always down, never invoked.
struct OfflineBackend;

#[async_trait]
impl ScoringBackend for OfflineBackend {
    async fn is_healthy(&self) -> bool {
        false
    }

    async fn invoke(&self, _model: &str, _features: &FeatureVector) -> Result<f64, InvokeError> {
        Err(InvokeError::Upstream("offline".to_string()))
    }

    async fn loaded_version(&self) -> Option<String> {
        None
    }

    async fn request_reload(
        &self,
        _version: &str,
        _model_urls: &BTreeMap<String, String>,
    ) -> bool {
        false
    }
}

/// Release index stub with no published releases.
struct EmptyIndex;

#[async_trait]
impl ReleaseIndex for EmptyIndex {
    async fn releases(&self) -> anyhow::Result<Vec<Release>> {
        Ok(Vec::new())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: EngineMetrics,
    pub engine: Arc<FraudScoringEngine>,
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health();
    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness();
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

async fn version(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.engine.current_version().await)
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

fn create_test_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/version", get(version))
        .route("/metrics", get(metrics))
        .with_state(state)
}

fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCORING_BACKEND);
    health_registry.register(components::RELEASE_INDEX);

    let engine = Arc::new(FraudScoringEngine::new(
        Arc::new(OfflineBackend),
        Arc::new(EmptyIndex),
        EngineConfig {
            default_version: "v1.0.0".to_string(),
            ..EngineConfig::default()
        },
    ));

    let metrics = EngineMetrics::new();
    let state = Arc::new(AppState {
        health_registry,
        metrics,
        engine,
    });
    let router = create_test_router(state.clone());

    (router, state)
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["scoring_backend"].is_object());
    assert!(health["components"]["release_index"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_backend_degraded() {
    let (app, state) = setup_test_app();

    state.health_registry.update(
        components::SCORING_BACKEND,
        ComponentHealth::degraded("liveness probe failed"),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Degraded still returns 200 (the simulator keeps serving)
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app();

    state.health_registry.update(
        components::SCORING_BACKEND,
        ComponentHealth::unhealthy("engine wedged"),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_readyz_returns_503_when_not_ready() {
    let (app, _state) = setup_test_app();

    // Not ready until initialization marks it so
    let response = app
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(readiness["ready"], false);
}

#[tokio::test]
async fn test_readyz_returns_ok_when_ready() {
    let (app, state) = setup_test_app();

    state.health_registry.set_ready(true);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_readyz_stays_ready_when_backend_degraded() {
    let (app, state) = setup_test_app();

    state.health_registry.set_ready(true);
    state.health_registry.update(
        components::SCORING_BACKEND,
        ComponentHealth::degraded("probe failed"),
    );

    let response = app
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_version_resolves_default_for_offline_backend() {
    let (app, _state) = setup_test_app();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/version")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let version: serde_json::Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(version["version"], "v1.0.0");
    assert_eq!(version["source"], "unknown");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app();

    // Score once so engine metric families exist
    state.engine.score(&FeatureVector::new()).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("fraud_engine_scoring_latency_seconds"));
    assert!(metrics_text.contains("fraud_engine_scores_total"));
    assert!(metrics_text.contains("fraud_engine_degradations_total"));
}

#[tokio::test]
async fn test_offline_backend_scores_simulated() {
    let (_app, state) = setup_test_app();

    let features = FeatureVector::new()
        .with_text("transaction_id", "txn-9001")
        .with_number("amount", 120.0);
    let result = state.engine.score(&features).await;

    assert_eq!(
        serde_json::to_value(result.source).unwrap(),
        serde_json::json!("simulated")
    );
    assert!((0.0..=1.0).contains(&result.final_score));
    assert_eq!(result.model_version, "v1.0.0");
}
