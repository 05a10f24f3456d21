//! Service configuration

use anyhow::Result;
use engine_lib::backend::BackendConfig;
use engine_lib::ensemble::EngineConfig;
use serde::Deserialize;
use std::time::Duration;

/// Engine service configuration, loaded from `ENGINE_*` environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Scoring backend base URL
    #[serde(default = "default_backend_url")]
    pub backend_url: String,

    /// When false, every score is served by the simulator
    #[serde(default = "default_backend_enabled")]
    pub backend_enabled: bool,

    /// Per-model-call timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Liveness probe timeout in milliseconds
    #[serde(default = "default_health_timeout_ms")]
    pub health_timeout_ms: u64,

    /// Retry budget advertised to collaborators that wrap scoring; the
    /// engine itself degrades to simulation instead of retrying
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Delay between collaborator retries in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Release-index repository, "owner/name"
    #[serde(default = "default_release_repo")]
    pub release_repo: String,

    /// Version tag reported when resolution fails entirely
    #[serde(default = "default_version_tag")]
    pub default_version: String,

    /// Confidence smoothing amplitude; zero keeps scoring deterministic
    #[serde(default = "default_confidence_jitter")]
    pub confidence_jitter: f64,

    /// Ops API port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Background liveness probe interval in seconds
    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,
}

fn default_backend_url() -> String {
    "http://fraud-models:8000".to_string()
}

fn default_backend_enabled() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_health_timeout_ms() -> u64 {
    2_000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_release_repo() -> String {
    "fraud-platform/fraud-models".to_string()
}

fn default_version_tag() -> String {
    "v1.0.0".to_string()
}

fn default_confidence_jitter() -> f64 {
    0.0
}

fn default_api_port() -> u16 {
    8080
}

fn default_probe_interval() -> u64 {
    30
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            backend_enabled: default_backend_enabled(),
            request_timeout_ms: default_request_timeout_ms(),
            health_timeout_ms: default_health_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            release_repo: default_release_repo(),
            default_version: default_version_tag(),
            confidence_jitter: default_confidence_jitter(),
            api_port: default_api_port(),
            probe_interval_secs: default_probe_interval(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ENGINE"))
            .build()?;

        Ok(config.try_deserialize().unwrap_or_default())
    }

    pub fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            base_url: self.backend_url.clone(),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            health_timeout: Duration::from_millis(self.health_timeout_ms),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            backend_enabled: self.backend_enabled,
            default_version: self.default_version.clone(),
            confidence_jitter: self.confidence_jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.backend_url, "http://fraud-models:8000");
        assert!(config.backend_enabled);
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.backend_config().health_timeout, Duration::from_secs(2));
        assert!(config.engine_config().backend_enabled);
        assert_eq!(config.engine_config().confidence_jitter, 0.0);
    }
}
