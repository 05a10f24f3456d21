//! Component health tracking for the scoring service
//!
//! A down scoring backend does not make the service unhealthy: the
//! simulator keeps answering, so the service reports degraded instead.
//! Serves the `/healthz` and `/readyz` endpoints of the ops API.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Component names tracked by the engine service.
pub mod components {
    pub const SCORING_BACKEND: &str = "scoring_backend";
    pub const RELEASE_INDEX: &str = "release_index";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Still serving, but in a reduced mode (e.g. simulated scores)
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }

    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Tracks per-component health and overall readiness.
#[derive(Clone, Default)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, initially healthy.
    pub fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy());
    }

    pub fn update(&self, name: &str, health: ComponentHealth) {
        self.components.write().insert(name.to_string(), health);
    }

    pub fn set_ready(&self, ready: bool) {
        *self.ready.write() = ready;
    }

    pub fn health(&self) -> HealthResponse {
        let components = self.components.read().clone();

        let mut status = ComponentStatus::Healthy;
        for health in components.values() {
            match health.status {
                ComponentStatus::Unhealthy => {
                    status = ComponentStatus::Unhealthy;
                    break;
                }
                ComponentStatus::Degraded => status = ComponentStatus::Degraded,
                ComponentStatus::Healthy => {}
            }
        }

        HealthResponse { status, components }
    }

    pub fn readiness(&self) -> ReadinessResponse {
        if !*self.ready.read() {
            return ReadinessResponse {
                ready: false,
                reason: Some("Engine not yet initialized".to_string()),
            };
        }

        // degraded still serves (simulated scores); only unhealthy blocks
        if self.health().status == ComponentStatus::Unhealthy {
            return ReadinessResponse {
                ready: false,
                reason: Some("Critical component unhealthy".to_string()),
            };
        }

        ReadinessResponse {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry_is_healthy() {
        let registry = HealthRegistry::new();
        assert_eq!(registry.health().status, ComponentStatus::Healthy);
    }

    #[test]
    fn test_degraded_backend_degrades_service() {
        let registry = HealthRegistry::new();
        registry.register(components::SCORING_BACKEND);
        registry.register(components::RELEASE_INDEX);

        registry.update(
            components::SCORING_BACKEND,
            ComponentHealth::degraded("liveness probe failed"),
        );

        let health = registry.health();
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert_eq!(
            health.components[components::SCORING_BACKEND].status,
            ComponentStatus::Degraded
        );
    }

    #[test]
    fn test_unhealthy_component_dominates() {
        let registry = HealthRegistry::new();
        registry.register(components::SCORING_BACKEND);
        registry.update(
            components::SCORING_BACKEND,
            ComponentHealth::unhealthy("broken"),
        );

        assert_eq!(registry.health().status, ComponentStatus::Unhealthy);
    }

    #[test]
    fn test_readiness_flow() {
        let registry = HealthRegistry::new();
        registry.register(components::SCORING_BACKEND);

        let readiness = registry.readiness();
        assert!(!readiness.ready);
        assert!(readiness.reason.is_some());

        registry.set_ready(true);
        assert!(registry.readiness().ready);

        // degraded keeps serving
        registry.update(
            components::SCORING_BACKEND,
            ComponentHealth::degraded("probe failed"),
        );
        assert!(registry.readiness().ready);

        registry.update(
            components::SCORING_BACKEND,
            ComponentHealth::unhealthy("broken"),
        );
        assert!(!registry.readiness().ready);
    }
}
