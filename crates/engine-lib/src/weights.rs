//! Shared ensemble weight state
//!
//! A single snapshot of weights and threshold, replaced wholesale on update.
//! Readers copy the snapshot; a scoring request can never observe a
//! half-applied update.

use crate::error::WeightError;
use crate::models::{ModelWeights, WeightUpdate};
use parking_lot::RwLock;
use tracing::info;

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-4;

/// Holds the current weight snapshot for the engine.
pub struct WeightRegistry {
    snapshot: RwLock<ModelWeights>,
}

impl Default for WeightRegistry {
    fn default() -> Self {
        Self {
            snapshot: RwLock::new(ModelWeights::default()),
        }
    }
}

impl WeightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot. Never blocks on a failed writer and never fails.
    pub fn get(&self) -> ModelWeights {
        *self.snapshot.read()
    }

    /// Validate and store a new snapshot. All-or-nothing: on any error the
    /// previous snapshot stays in place untouched.
    pub fn set(&self, update: WeightUpdate, auto_normalize: bool) -> Result<(), WeightError> {
        let current = self.get();
        let next = prepare_weights(update, current.threshold, auto_normalize)?;
        *self.snapshot.write() = next;
        info!(
            xgboost = next.xgboost,
            lightgbm = next.lightgbm,
            catboost = next.catboost,
            threshold = next.threshold,
            "Ensemble weights updated"
        );
        Ok(())
    }

    /// Replace only the decision threshold, keeping the weights.
    pub fn set_threshold(&self, threshold: f64) -> Result<(), WeightError> {
        validate_threshold(threshold)?;
        let mut guard = self.snapshot.write();
        let mut next = *guard;
        next.threshold = threshold;
        *guard = next;
        info!(threshold, "Decision threshold updated");
        Ok(())
    }
}

/// Validate an administrative update and resolve it into a storable
/// snapshot. Also used for one-shot weights that bypass the registry.
///
/// A sum already within tolerance is stored bit-identical; normalization
/// only runs when the sum actually deviates.
pub fn prepare_weights(
    update: WeightUpdate,
    fallback_threshold: f64,
    auto_normalize: bool,
) -> Result<ModelWeights, WeightError> {
    let xgboost = update
        .xgboost
        .ok_or(WeightError::MissingWeight("xgboost"))?;
    let lightgbm = update
        .lightgbm
        .ok_or(WeightError::MissingWeight("lightgbm"))?;
    let catboost = update
        .catboost
        .ok_or(WeightError::MissingWeight("catboost"))?;

    validate_weight("xgboost", xgboost)?;
    validate_weight("lightgbm", lightgbm)?;
    validate_weight("catboost", catboost)?;

    let threshold = update.threshold.unwrap_or(fallback_threshold);
    validate_threshold(threshold)?;

    let weights = ModelWeights::new(xgboost, lightgbm, catboost, threshold);
    let sum = weights.sum();

    if (sum - 1.0).abs() <= WEIGHT_SUM_TOLERANCE {
        return Ok(weights);
    }
    if !auto_normalize || sum <= f64::EPSILON {
        return Err(WeightError::Unnormalized {
            sum,
            tolerance: WEIGHT_SUM_TOLERANCE,
        });
    }
    Ok(normalize(weights))
}

fn validate_weight(model: &'static str, value: f64) -> Result<(), WeightError> {
    // NaN fails both comparisons and is rejected here too
    if !(value >= 0.0 && value <= 1.0) {
        return Err(WeightError::InvalidWeight { model, value });
    }
    Ok(())
}

fn validate_threshold(threshold: f64) -> Result<(), WeightError> {
    if !(threshold > 0.0 && threshold < 1.0) {
        return Err(WeightError::InvalidThreshold(threshold));
    }
    Ok(())
}

/// Rescale proportionally, then fold the floating-point residual into the
/// largest weight so the stored sum is exactly 1.0 and does not drift
/// across repeated reads.
fn normalize(mut weights: ModelWeights) -> ModelWeights {
    let sum = weights.sum();
    weights.xgboost /= sum;
    weights.lightgbm /= sum;
    weights.catboost /= sum;

    let residual = 1.0 - weights.sum();
    if weights.xgboost >= weights.lightgbm && weights.xgboost >= weights.catboost {
        weights.xgboost += residual;
    } else if weights.lightgbm >= weights.catboost {
        weights.lightgbm += residual;
    } else {
        weights.catboost += residual;
    }
    weights
}
