//! Observability for the scoring engine
//!
//! Prometheus metrics (scoring latency, per-model call latency, score
//! provenance counts, degradations) and structured lifecycle logging.

use crate::models::{ScoreSource, VersionInfo};
use prometheus::{
    register_gauge_vec, register_histogram, register_histogram_vec, register_int_counter,
    register_int_counter_vec, GaugeVec, Histogram, HistogramVec, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<EngineMetricsInner> = OnceLock::new();

struct EngineMetricsInner {
    scoring_latency_seconds: Histogram,
    model_call_latency_seconds: HistogramVec,
    scores_total: IntCounterVec,
    degradations_total: IntCounterVec,
    ensemble_failures_total: IntCounter,
    weight_updates_total: IntCounter,
    reload_requests_total: IntCounterVec,
    model_version_info: GaugeVec,
}

impl EngineMetricsInner {
    fn new() -> Self {
        Self {
            scoring_latency_seconds: register_histogram!(
                "fraud_engine_scoring_latency_seconds",
                "End-to-end latency of scoring requests",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register scoring_latency_seconds"),

            model_call_latency_seconds: register_histogram_vec!(
                "fraud_engine_model_call_latency_seconds",
                "Latency of individual model invocations",
                &["model"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register model_call_latency_seconds"),

            scores_total: register_int_counter_vec!(
                "fraud_engine_scores_total",
                "Scoring requests served, by result provenance",
                &["source"]
            )
            .expect("Failed to register scores_total"),

            degradations_total: register_int_counter_vec!(
                "fraud_engine_degradations_total",
                "Requests degraded to the simulator, by cause",
                &["cause"]
            )
            .expect("Failed to register degradations_total"),

            ensemble_failures_total: register_int_counter!(
                "fraud_engine_ensemble_failures_total",
                "Ensemble attempts discarded because a member failed"
            )
            .expect("Failed to register ensemble_failures_total"),

            weight_updates_total: register_int_counter!(
                "fraud_engine_weight_updates_total",
                "Accepted administrative weight updates"
            )
            .expect("Failed to register weight_updates_total"),

            reload_requests_total: register_int_counter_vec!(
                "fraud_engine_reload_requests_total",
                "Model reload requests sent to the backend, by outcome",
                &["outcome"]
            )
            .expect("Failed to register reload_requests_total"),

            model_version_info: register_gauge_vec!(
                "fraud_engine_model_version_info",
                "Currently resolved model version",
                &["version", "source"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Engine metrics for Prometheus exposition.
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct EngineMetrics {
    _private: (),
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(EngineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &EngineMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_scoring_latency(&self, duration_secs: f64) {
        self.inner().scoring_latency_seconds.observe(duration_secs);
    }

    pub fn observe_model_call(&self, model: &str, duration_secs: f64) {
        self.inner()
            .model_call_latency_seconds
            .with_label_values(&[model])
            .observe(duration_secs);
    }

    pub fn inc_score(&self, source: ScoreSource) {
        let label = source.to_string();
        self.inner()
            .scores_total
            .with_label_values(&[label.as_str()])
            .inc();
    }

    pub fn inc_degradation(&self, cause: &str) {
        self.inner()
            .degradations_total
            .with_label_values(&[cause])
            .inc();
    }

    pub fn inc_ensemble_failure(&self) {
        self.inner().ensemble_failures_total.inc();
    }

    pub fn inc_weight_update(&self) {
        self.inner().weight_updates_total.inc();
    }

    pub fn inc_reload_request(&self, accepted: bool) {
        let outcome = if accepted { "accepted" } else { "declined" };
        self.inner()
            .reload_requests_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn set_model_version(&self, info: &VersionInfo) {
        let source = match info.source {
            crate::models::VersionSource::Backend => "backend",
            crate::models::VersionSource::ReleaseIndex => "release_index",
            crate::models::VersionSource::Unknown => "unknown",
        };
        // only one version is ever current
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[info.version.as_str(), source])
            .set(1.0);
    }
}

/// Structured logger for service lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    service_name: String,
}

impl StructuredLogger {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
        }
    }

    pub fn log_startup(&self, service_version: &str, model_version: &str) {
        info!(
            event = "engine_started",
            service = %self.service_name,
            service_version = %service_version,
            model_version = %model_version,
            "Fraud scoring engine started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "engine_shutdown",
            service = %self.service_name,
            reason = %reason,
            "Fraud scoring engine shutting down"
        );
    }

    /// Record a liveness transition of the scoring backend. Scoring keeps
    /// working either way; this marks the switch between real and
    /// simulated provenance.
    pub fn log_backend_transition(&self, healthy: bool) {
        if healthy {
            info!(
                event = "backend_recovered",
                service = %self.service_name,
                "Scoring backend is reachable, serving real scores"
            );
        } else {
            warn!(
                event = "backend_lost",
                service = %self.service_name,
                "Scoring backend unreachable, scores degrade to simulation"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VersionSource;

    #[test]
    fn test_engine_metrics_observe() {
        let metrics = EngineMetrics::new();

        metrics.observe_scoring_latency(0.012);
        metrics.observe_model_call("xgboost", 0.004);
        metrics.inc_score(ScoreSource::Real);
        metrics.inc_score(ScoreSource::Simulated);
        metrics.inc_degradation("probe_failed");
        metrics.inc_ensemble_failure();
        metrics.inc_weight_update();
        metrics.inc_reload_request(true);
        metrics.set_model_version(&VersionInfo {
            version: "v2.0.0".to_string(),
            source: VersionSource::Backend,
        });
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("scoring-engine");
        assert_eq!(logger.service_name, "scoring-engine");
    }
}
