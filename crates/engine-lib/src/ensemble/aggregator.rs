//! Parallel fan-out across the ensemble members
//!
//! One concurrent invocation per model against the same feature vector. The
//! join is fail-closed: the first failure aborts the remaining siblings and
//! the whole attempt, because mixing real scores with a missing one would
//! silently shift the effective weights.

use crate::backend::ScoringBackend;
use crate::error::{EnsembleError, InvokeError};
use crate::models::{
    FeatureVector, ModelWeights, PredictionResult, ScoreSource, MODEL_NAMES,
};
use crate::observability::EngineMetrics;
use rand::Rng;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::debug;

/// Reporting confidence: distance of the final score from the midpoint,
/// rescaled to [0, 1], plus an optional smoothing term. Never feeds back
/// into the fraud decision itself.
pub fn confidence_score(final_score: f64, noise: f64) -> f64 {
    ((final_score - 0.5).abs() * 2.0 + noise).clamp(0.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Amplitude of the uncertainty-smoothing term added to confidence.
    /// Zero keeps scoring fully deterministic.
    pub confidence_jitter: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            confidence_jitter: 0.0,
        }
    }
}

/// Fans one request out to every configured model and folds the scores back
/// into a single weighted prediction.
pub struct EnsembleAggregator {
    backend: Arc<dyn ScoringBackend>,
    config: AggregatorConfig,
    metrics: EngineMetrics,
}

impl EnsembleAggregator {
    pub fn new(backend: Arc<dyn ScoringBackend>) -> Self {
        Self::with_config(backend, AggregatorConfig::default())
    }

    pub fn with_config(backend: Arc<dyn ScoringBackend>, config: AggregatorConfig) -> Self {
        Self {
            backend,
            config,
            metrics: EngineMetrics::new(),
        }
    }

    /// Score against all models concurrently and aggregate under the given
    /// weight snapshot. Any member failure discards the whole attempt.
    pub async fn predict(
        &self,
        features: &FeatureVector,
        weights: ModelWeights,
        model_version: &str,
    ) -> Result<PredictionResult, EnsembleError> {
        let start = Instant::now();
        let shared = Arc::new(features.clone());

        let mut tasks = JoinSet::new();
        for (idx, name) in MODEL_NAMES.iter().copied().enumerate() {
            let backend = Arc::clone(&self.backend);
            let features = Arc::clone(&shared);
            let metrics = self.metrics.clone();
            tasks.spawn(async move {
                let call_start = Instant::now();
                let outcome = backend.invoke(name, &features).await;
                metrics.observe_model_call(name, call_start.elapsed().as_secs_f64());
                (idx, outcome)
            });
        }

        let mut scores = [0.0_f64; MODEL_NAMES.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, Ok(score))) => scores[idx] = score,
                Ok((idx, Err(err))) => {
                    tasks.abort_all();
                    return Err(EnsembleError {
                        model: MODEL_NAMES[idx].to_string(),
                        source: err,
                    });
                }
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(EnsembleError {
                        model: "ensemble".to_string(),
                        source: InvokeError::Upstream(format!(
                            "invocation task failed: {join_err}"
                        )),
                    });
                }
            }
        }

        debug!(
            xgboost = scores[0],
            lightgbm = scores[1],
            catboost = scores[2],
            "Ensemble fan-in complete"
        );

        Ok(assemble(
            scores,
            weights,
            model_version,
            ScoreSource::Real,
            None,
            start.elapsed(),
            self.noise(),
        ))
    }

    fn noise(&self) -> f64 {
        let jitter = self.config.confidence_jitter;
        if jitter == 0.0 {
            0.0
        } else {
            rand::thread_rng().gen_range(-jitter..=jitter)
        }
    }
}

/// Fold per-model scores into a final prediction. Shared by the real and
/// simulated paths so both apply the identical threshold and confidence
/// rules.
pub(crate) fn assemble(
    scores: [f64; 3],
    weights: ModelWeights,
    model_version: &str,
    source: ScoreSource,
    feature_importance: Option<BTreeMap<String, f64>>,
    elapsed: Duration,
    noise: f64,
) -> PredictionResult {
    let final_score: f64 = weights
        .as_array()
        .iter()
        .zip(scores.iter())
        .map(|(weight, score)| weight * score)
        .sum();

    PredictionResult {
        model_scores: MODEL_NAMES
            .iter()
            .zip(scores.iter())
            .map(|(name, score)| (name.to_string(), *score))
            .collect(),
        final_score,
        // strict comparison: a score exactly at the threshold is not fraud
        is_fraud: final_score > weights.threshold,
        confidence: confidence_score(final_score, noise),
        model_version: model_version.to_string(),
        processing_ms: elapsed.as_millis() as u64,
        source,
        generated_at: chrono::Utc::now().timestamp(),
        feature_importance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend stub with fixed per-model scores and an invocation counter.
    struct FixedBackend {
        scores: BTreeMap<&'static str, Result<f64, &'static str>>,
        invocations: AtomicUsize,
    }

    impl FixedBackend {
        fn healthy(xgboost: f64, lightgbm: f64, catboost: f64) -> Self {
            let mut scores = BTreeMap::new();
            scores.insert("xgboost", Ok(xgboost));
            scores.insert("lightgbm", Ok(lightgbm));
            scores.insert("catboost", Ok(catboost));
            Self {
                scores,
                invocations: AtomicUsize::new(0),
            }
        }

        fn with_failure(model: &'static str) -> Self {
            let mut backend = Self::healthy(0.2, 0.6, 0.4);
            backend.scores.insert(model, Err("boom"));
            backend
        }
    }

    #[async_trait]
    impl ScoringBackend for FixedBackend {
        async fn is_healthy(&self) -> bool {
            true
        }

        async fn invoke(
            &self,
            model: &str,
            _features: &FeatureVector,
        ) -> Result<f64, InvokeError> {
            self.invocations.fetch_add(1, Ordering::SeqCst);
            match self.scores.get(model) {
                Some(Ok(score)) => Ok(*score),
                Some(Err(msg)) => Err(InvokeError::Upstream(msg.to_string())),
                None => Err(InvokeError::Upstream(format!("unknown model {model}"))),
            }
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

    fn weights(xgboost: f64, lightgbm: f64, catboost: f64, threshold: f64) -> ModelWeights {
        ModelWeights::new(xgboost, lightgbm, catboost, threshold)
    }

    #[tokio::test]
    async fn test_weighted_sum_exact() {
        let backend = Arc::new(FixedBackend::healthy(0.2, 0.6, 0.4));
        let aggregator = EnsembleAggregator::new(backend.clone());

        let result = aggregator
            .predict(
                &FeatureVector::new(),
                weights(0.5, 0.3, 0.2, 0.5),
                "v1.2.0",
            )
            .await
            .unwrap();

        // 0.2*0.5 + 0.6*0.3 + 0.4*0.2 = 0.34
        assert!((result.final_score - 0.34).abs() < 1e-12);
        assert_eq!(result.source, ScoreSource::Real);
        assert_eq!(result.model_version, "v1.2.0");
        assert_eq!(result.model_scores["xgboost"], 0.2);
        assert_eq!(backend.invocations.load(Ordering::SeqCst), 3);
        assert!(result.feature_importance.is_none());
    }

    #[tokio::test]
    async fn test_score_at_threshold_is_not_fraud() {
        let backend = Arc::new(FixedBackend::healthy(0.5, 0.5, 0.5));
        let aggregator = EnsembleAggregator::new(backend);

        // weights sum to 1, so final == 0.5 == threshold exactly
        let result = aggregator
            .predict(
                &FeatureVector::new(),
                weights(0.5, 0.25, 0.25, 0.5),
                "v1.0.0",
            )
            .await
            .unwrap();

        assert_eq!(result.final_score, 0.5);
        assert!(!result.is_fraud);
    }

    #[tokio::test]
    async fn test_score_just_above_threshold_is_fraud() {
        let epsilon = 1e-9;
        let backend = Arc::new(FixedBackend::healthy(
            0.5 + epsilon,
            0.5 + epsilon,
            0.5 + epsilon,
        ));
        let aggregator = EnsembleAggregator::new(backend);

        let result = aggregator
            .predict(
                &FeatureVector::new(),
                weights(0.5, 0.25, 0.25, 0.5),
                "v1.0.0",
            )
            .await
            .unwrap();

        assert!(result.final_score > 0.5);
        assert!(result.is_fraud);
    }

    #[tokio::test]
    async fn test_single_failure_discards_attempt() {
        let backend = Arc::new(FixedBackend::with_failure("lightgbm"));
        let aggregator = EnsembleAggregator::new(backend);

        let err = aggregator
            .predict(&FeatureVector::new(), ModelWeights::default(), "v1.0.0")
            .await
            .unwrap_err();

        assert_eq!(err.model, "lightgbm");
        assert!(matches!(err.source, InvokeError::Upstream(_)));
    }

    #[test]
    fn test_confidence_formula() {
        assert_eq!(confidence_score(0.5, 0.0), 0.0);
        assert_eq!(confidence_score(1.0, 0.0), 1.0);
        assert_eq!(confidence_score(0.0, 0.0), 1.0);
        assert!((confidence_score(0.75, 0.0) - 0.5).abs() < 1e-12);
        // clamped when noise pushes past the bounds
        assert_eq!(confidence_score(0.9, 0.5), 1.0);
        assert_eq!(confidence_score(0.5, -0.3), 0.0);
    }

    #[test]
    fn test_assemble_deterministic_with_zero_noise() {
        let scores = [0.2, 0.6, 0.4];
        let w = weights(0.5, 0.3, 0.2, 0.5);
        let a = assemble(
            scores,
            w,
            "v1",
            ScoreSource::Real,
            None,
            Duration::from_millis(5),
            0.0,
        );
        let b = assemble(
            scores,
            w,
            "v1",
            ScoreSource::Real,
            None,
            Duration::from_millis(9),
            0.0,
        );

        assert_eq!(a.final_score, b.final_score);
        assert_eq!(a.is_fraud, b.is_fraud);
        assert_eq!(a.confidence, b.confidence);
    }
}
