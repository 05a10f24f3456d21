//! Scoring Engine - ensemble fraud scoring service
//!
//! Routes transaction feature vectors to three hosted models, aggregates
//! their scores under configurable weights, and keeps answering with
//! simulated scores whenever the backend is down.

use anyhow::Result;
use engine_lib::backend::{HttpScoringBackend, ScoringBackend};
use engine_lib::ensemble::FraudScoringEngine;
use engine_lib::health::{components, ComponentHealth, HealthRegistry};
use engine_lib::models::VersionSource;
use engine_lib::observability::{EngineMetrics, StructuredLogger};
use engine_lib::version::GithubReleaseIndex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting scoring-engine");

    // Load configuration
    let config = config::ServiceConfig::load()?;
    info!(
        backend_url = %config.backend_url,
        backend_enabled = config.backend_enabled,
        release_repo = %config.release_repo,
        "Engine configured"
    );

    let backend = Arc::new(HttpScoringBackend::new(config.backend_config())?);
    let index = Arc::new(GithubReleaseIndex::new(&config.release_repo)?);
    let engine = Arc::new(FraudScoringEngine::new(
        backend.clone() as Arc<dyn ScoringBackend>,
        index,
        config.engine_config(),
    ));

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SCORING_BACKEND);
    health_registry.register(components::RELEASE_INDEX);

    // Initialize metrics with the version in effect at startup
    let metrics = EngineMetrics::new();
    let version = engine.current_version().await;
    metrics.set_model_version(&version);
    if version.source == VersionSource::Unknown {
        health_registry.update(
            components::RELEASE_INDEX,
            ComponentHealth::degraded("version resolution fell back to default tag"),
        );
    }

    let logger = StructuredLogger::new("scoring-engine");
    logger.log_startup(SERVICE_VERSION, &version.version);

    // Create shared application state
    let state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        engine.clone(),
    ));

    // Mark engine as ready after initialization
    health_registry.set_ready(true);

    // Start health and metrics server
    tokio::spawn(api::serve(config.api_port, state));

    // Background liveness probing keeps the health report current
    if config.backend_enabled {
        tokio::spawn(probe_loop(
            backend,
            health_registry.clone(),
            logger.clone(),
            Duration::from_secs(config.probe_interval_secs),
        ));
    } else {
        health_registry.update(
            components::SCORING_BACKEND,
            ComponentHealth::degraded("backend disabled, all scores simulated"),
        );
    }

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    info!("Shutting down");

    Ok(())
}

/// Periodically probe the scoring backend and reflect the result in the
/// health registry. A failed probe degrades the service, it never takes it
/// down: scoring keeps working through the simulator.
async fn probe_loop(
    backend: Arc<HttpScoringBackend>,
    health_registry: HealthRegistry,
    logger: StructuredLogger,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut was_healthy = true;

    loop {
        ticker.tick().await;

        let healthy = backend.is_healthy().await;
        if healthy {
            health_registry.update(components::SCORING_BACKEND, ComponentHealth::healthy());
        } else {
            health_registry.update(
                components::SCORING_BACKEND,
                ComponentHealth::degraded("liveness probe failed, scores served by simulator"),
            );
        }

        if healthy != was_healthy {
            logger.log_backend_transition(healthy);
            was_healthy = healthy;
        }
    }
}
