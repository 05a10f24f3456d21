//! Scoring backend client
//!
//! The backend hosts the three models behind an HTTP API. Everything the
//! engine needs from it goes through the [`ScoringBackend`] trait so tests
//! can substitute a mock: a liveness probe, per-model invocation, the
//! currently loaded version, and a best-effort reload request.

mod http;

pub use http::HttpScoringBackend;

use crate::error::InvokeError;
use crate::models::FeatureVector;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Connection settings for the scoring backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. "http://fraud-models:8000"
    pub base_url: String,
    /// Per-call timeout for model invocations
    pub request_timeout: Duration,
    /// Timeout for the liveness probe, much shorter than a prediction call
    pub health_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://fraud-models:8000".to_string(),
            request_timeout: Duration::from_secs(10),
            health_timeout: Duration::from_secs(2),
        }
    }
}

/// Client-side view of the scoring backend.
#[async_trait]
pub trait ScoringBackend: Send + Sync {
    /// Lightweight liveness check. Degrades to `false` on any failure,
    /// never errors.
    async fn is_healthy(&self) -> bool;

    /// Score one feature vector against one named model.
    async fn invoke(&self, model: &str, features: &FeatureVector) -> Result<f64, InvokeError>;

    /// The model version the backend currently has loaded, if it answers.
    async fn loaded_version(&self) -> Option<String>;

    /// Ask the backend to reload the given version from the given artifact
    /// URLs. Best-effort: `false` on rejection or unreachability.
    async fn request_reload(&self, version: &str, model_urls: &BTreeMap<String, String>) -> bool;
}
