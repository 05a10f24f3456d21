//! Core data models for the scoring engine

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// Names of the three ensemble members, in aggregation order.
pub const MODEL_NAMES: [&str; 3] = ["xgboost", "lightgbm", "catboost"];

/// Well-known feature keys consumed by the fallback scorer.
///
/// Callers may attach any keys they like; these are the ones the heuristic
/// path knows how to interpret.
pub mod feature_keys {
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const AMOUNT: &str = "amount";
    pub const MERCHANT_CATEGORY: &str = "merchant_category";
    pub const EMAIL_DOMAIN: &str = "email_domain";
    pub const CARD_PREFIX: &str = "card_prefix";
    pub const SECONDS_SINCE_LAST_TXN: &str = "seconds_since_last_txn";
    pub const TXN_COUNT_1H: &str = "txn_count_1h";
    pub const TXN_COUNT_24H: &str = "txn_count_24h";
    pub const DISTANCE_FROM_HOME_KM: &str = "distance_from_home_km";
    pub const DEVICE_TYPE: &str = "device_type";
    /// Prefix shared by all categorical match flags (address, name, zip, ...).
    pub const MATCH_PREFIX: &str = "match_";
}

/// A single feature value: numeric or categorical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
}

/// Transaction feature vector sent to the scoring models.
///
/// Append-only once built: features can be added but never removed or
/// replaced through the public API. The engine only ever borrows it
/// read-only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector {
    features: BTreeMap<String, FeatureValue>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a numeric feature.
    pub fn with_number(mut self, key: impl Into<String>, value: f64) -> Self {
        self.features.insert(key.into(), FeatureValue::Number(value));
        self
    }

    /// Append a categorical feature.
    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.features
            .insert(key.into(), FeatureValue::Text(value.into()));
        self
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.features.get(key) {
            Some(FeatureValue::Number(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.features.get(key) {
            Some(FeatureValue::Text(value)) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.features.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// A 64-bit seed derived from the feature contents.
    ///
    /// Stable across processes: two identical vectors always yield the same
    /// seed, so heuristic scoring of the same transaction is repeatable.
    pub fn stable_seed(&self) -> u64 {
        let mut hasher = Sha256::new();
        for (key, value) in &self.features {
            hasher.update(key.as_bytes());
            hasher.update([0x00]);
            match value {
                FeatureValue::Number(n) => hasher.update(n.to_bits().to_le_bytes()),
                FeatureValue::Text(t) => hasher.update(t.as_bytes()),
            }
            hasher.update([0xff]);
        }
        let digest = hasher.finalize();
        let mut seed = [0u8; 8];
        seed.copy_from_slice(&digest[..8]);
        u64::from_le_bytes(seed)
    }
}

/// Ensemble weights plus the fraud decision threshold.
///
/// The three weights sum to 1.0; normalization is enforced when a snapshot
/// is stored, never when it is read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelWeights {
    pub xgboost: f64,
    pub lightgbm: f64,
    pub catboost: f64,
    pub threshold: f64,
}

impl ModelWeights {
    pub fn new(xgboost: f64, lightgbm: f64, catboost: f64, threshold: f64) -> Self {
        Self {
            xgboost,
            lightgbm,
            catboost,
            threshold,
        }
    }

    pub fn sum(&self) -> f64 {
        self.xgboost + self.lightgbm + self.catboost
    }

    /// Weights in the same order as [`MODEL_NAMES`].
    pub fn as_array(&self) -> [f64; 3] {
        [self.xgboost, self.lightgbm, self.catboost]
    }
}

impl Default for ModelWeights {
    fn default() -> Self {
        let third = 1.0 / 3.0;
        let mut weights = Self {
            xgboost: third,
            lightgbm: third,
            catboost: third,
            threshold: 0.5,
        };
        // residual lands on the first weight so the stored sum is exactly 1.0
        weights.xgboost += 1.0 - weights.sum();
        weights
    }
}

/// Administrative weight update as submitted by an operator.
///
/// Weights are optional here so that an absent value can be rejected
/// explicitly instead of silently defaulting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeightUpdate {
    pub xgboost: Option<f64>,
    pub lightgbm: Option<f64>,
    pub catboost: Option<f64>,
    #[serde(default)]
    pub threshold: Option<f64>,
}

impl WeightUpdate {
    pub fn from_values(xgboost: f64, lightgbm: f64, catboost: f64) -> Self {
        Self {
            xgboost: Some(xgboost),
            lightgbm: Some(lightgbm),
            catboost: Some(catboost),
            threshold: None,
        }
    }
}

/// Whether a prediction came from the live backend or the local simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreSource {
    Real,
    Simulated,
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreSource::Real => write!(f, "real"),
            ScoreSource::Simulated => write!(f, "simulated"),
        }
    }
}

/// Outcome of a scoring request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Per-model scores, each in [0, 1].
    pub model_scores: BTreeMap<String, f64>,
    /// Weighted ensemble score.
    pub final_score: f64,
    /// `final_score > threshold`; a score exactly at the threshold is not fraud.
    pub is_fraud: bool,
    /// Distance-from-midpoint confidence, a monitoring signal only.
    pub confidence: f64,
    pub model_version: String,
    pub processing_ms: u64,
    pub source: ScoreSource,
    pub generated_at: i64,
    /// Per-signal contributions; populated on the simulated path only, the
    /// backend protocol does not return one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_importance: Option<BTreeMap<String, f64>>,
}

/// Where a resolved model version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionSource {
    /// Reported by the live backend.
    Backend,
    /// Newest published entry in the release index.
    ReleaseIndex,
    /// Both lookups failed; the configured default tag is returned.
    Unknown,
}

/// A resolved model version and how it was resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub source: VersionSource,
}
