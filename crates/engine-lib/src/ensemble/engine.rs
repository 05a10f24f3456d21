//! Scoring orchestrator
//!
//! The only component exposed to callers. A scoring request always yields a
//! usable result: probe the backend, try the real ensemble, and degrade to
//! the simulator on any failure, with the provenance flag telling the
//! caller which path answered.

use super::{AggregatorConfig, EnsembleAggregator, FallbackSimulator};
use crate::backend::ScoringBackend;
use crate::error::WeightError;
use crate::models::{
    FeatureVector, ModelWeights, PredictionResult, VersionInfo, WeightUpdate,
};
use crate::observability::EngineMetrics;
use crate::version::{ReleaseIndex, VersionResolver};
use crate::weights::{prepare_weights, WeightRegistry};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// When false the backend is never contacted and every score is simulated
    pub backend_enabled: bool,
    /// Version tag reported when neither backend nor release index answers
    pub default_version: String,
    /// Confidence smoothing amplitude; zero keeps scoring deterministic
    pub confidence_jitter: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend_enabled: true,
            default_version: "v1.0.0".to_string(),
            confidence_jitter: 0.0,
        }
    }
}

/// Ensemble fraud scoring engine.
pub struct FraudScoringEngine {
    backend: Arc<dyn ScoringBackend>,
    registry: WeightRegistry,
    aggregator: EnsembleAggregator,
    simulator: FallbackSimulator,
    resolver: VersionResolver,
    backend_enabled: bool,
    metrics: EngineMetrics,
}

impl FraudScoringEngine {
    pub fn new(
        backend: Arc<dyn ScoringBackend>,
        index: Arc<dyn ReleaseIndex>,
        config: EngineConfig,
    ) -> Self {
        let aggregator = EnsembleAggregator::with_config(
            Arc::clone(&backend),
            AggregatorConfig {
                confidence_jitter: config.confidence_jitter,
            },
        );
        let resolver = VersionResolver::new(
            Arc::clone(&backend),
            index,
            config.default_version.clone(),
        )
        .with_backend_queries(config.backend_enabled);

        Self {
            backend,
            registry: WeightRegistry::new(),
            aggregator,
            simulator: FallbackSimulator::new(),
            resolver,
            backend_enabled: config.backend_enabled,
            metrics: EngineMetrics::new(),
        }
    }

    /// Score one transaction under the current weight snapshot. Never
    /// fails; the result's `source` says whether the backend answered.
    pub async fn score(&self, features: &FeatureVector) -> PredictionResult {
        let weights = self.registry.get();
        self.score_snapshot(features, weights).await
    }

    /// One-shot what-if scoring under caller-supplied weights. The registry
    /// is neither consulted for weights nor mutated; the supplied weights
    /// go through the same validation and normalization as an update.
    pub async fn score_with_weights(
        &self,
        features: &FeatureVector,
        xgboost: f64,
        lightgbm: f64,
        catboost: f64,
        auto_normalize: bool,
    ) -> Result<PredictionResult, WeightError> {
        let threshold = self.registry.get().threshold;
        let weights = prepare_weights(
            WeightUpdate::from_values(xgboost, lightgbm, catboost),
            threshold,
            auto_normalize,
        )?;
        Ok(self.score_snapshot(features, weights).await)
    }

    /// The weight snapshot is taken once per request; a concurrent
    /// administrative update never tears a request in progress.
    async fn score_snapshot(
        &self,
        features: &FeatureVector,
        weights: ModelWeights,
    ) -> PredictionResult {
        let start = Instant::now();
        let version = self.resolver.current_version().await;

        let mut result = if !self.backend_enabled {
            debug!("Scoring backend disabled, serving simulated score");
            self.metrics.inc_degradation("backend_disabled");
            self.simulator.predict(features, weights, &version.version)
        } else if !self.backend.is_healthy().await {
            warn!(
                model_version = %version.version,
                "Liveness probe failed, serving simulated score"
            );
            self.metrics.inc_degradation("probe_failed");
            self.simulator.predict(features, weights, &version.version)
        } else {
            match self
                .aggregator
                .predict(features, weights, &version.version)
                .await
            {
                Ok(result) => result,
                Err(err) => {
                    warn!(error = %err, "Ensemble attempt failed, serving simulated score");
                    self.metrics.inc_ensemble_failure();
                    self.metrics.inc_degradation("ensemble_error");
                    self.simulator.predict(features, weights, &version.version)
                }
            }
        };

        result.processing_ms = start.elapsed().as_millis() as u64;
        self.metrics
            .observe_scoring_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_score(result.source);
        result
    }

    pub fn get_weights(&self) -> ModelWeights {
        self.registry.get()
    }

    pub fn set_weights(
        &self,
        update: WeightUpdate,
        auto_normalize: bool,
    ) -> Result<(), WeightError> {
        self.registry.set(update, auto_normalize)?;
        self.metrics.inc_weight_update();
        Ok(())
    }

    pub fn set_threshold(&self, threshold: f64) -> Result<(), WeightError> {
        self.registry.set_threshold(threshold)?;
        self.metrics.inc_weight_update();
        Ok(())
    }

    pub async fn current_version(&self) -> VersionInfo {
        self.resolver.current_version().await
    }

    /// Best-effort reload of a published model version on the backend.
    pub async fn request_reload(&self, version: &str) -> bool {
        let accepted = self.resolver.request_reload(version).await;
        self.metrics.inc_reload_request(accepted);
        accepted
    }

    /// Version catalog access for collaborators (dashboards, admin API).
    pub fn version_resolver(&self) -> &VersionResolver {
        &self.resolver
    }
}
