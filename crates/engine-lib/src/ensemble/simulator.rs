//! Heuristic fallback scorer
//!
//! Approximates the three hosted models from interpretable transaction
//! signals whenever the real backend is unavailable. Seeded by a stable
//! digest of the feature vector, so the same transaction always simulates
//! to the same scores. Decision and confidence reuse the exact aggregation
//! rules of the real path; only the provenance flag differs.

use super::aggregator::assemble;
use crate::models::{
    feature_keys, FeatureValue, FeatureVector, ModelWeights, PredictionResult, ScoreSource,
    MODEL_NAMES,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Simulated per-model scores never reach the exact bounds.
const SCORE_FLOOR: f64 = 0.001;
const SCORE_CEIL: f64 = 0.999;

/// Multiplicative bias per virtual model, aligned with [`MODEL_NAMES`]:
/// xgboost plays it balanced, lightgbm lenient, catboost conservative.
const MODEL_BIAS: [f64; 3] = [1.0, 0.92, 1.08];

const HIGH_RISK_CATEGORIES: [&str; 5] = ["4829", "6051", "7995", "5967", "5993"];
const MEDIUM_RISK_CATEGORIES: [&str; 4] = ["5122", "5816", "5912", "5944"];

const DISPOSABLE_EMAIL_DOMAINS: [&str; 4] = [
    "tempmail.com",
    "mailinator.com",
    "guerrillamail.com",
    "10minutemail.com",
];
const FREE_EMAIL_DOMAINS: [&str; 4] = ["gmail.com", "yahoo.com", "hotmail.com", "outlook.com"];

const HIGH_RISK_CARD_PREFIXES: [&str; 3] = ["4000", "5100", "6011"];

/// Deterministic-given-seed scorer for the degraded path. Never fails.
pub struct FallbackSimulator {
    seed_override: Option<u64>,
}

impl FallbackSimulator {
    pub fn new() -> Self {
        Self {
            seed_override: None,
        }
    }

    /// Fix the base-draw seed instead of deriving it from the features.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed_override: Some(seed),
        }
    }

    /// Simulate all three model scores and aggregate them under the given
    /// weight snapshot. Works on an entirely empty feature vector.
    pub fn predict(
        &self,
        features: &FeatureVector,
        weights: ModelWeights,
        model_version: &str,
    ) -> PredictionResult {
        let start = Instant::now();
        let seed = self.seed_override.unwrap_or_else(|| features.stable_seed());
        let mut rng = StdRng::seed_from_u64(seed);

        let base: f64 = rng.gen_range(0.30..0.50);
        let (adjustment, contributions) = risk_adjustment(features);
        let raw = base + adjustment;

        let mut scores = [0.0_f64; MODEL_NAMES.len()];
        for (idx, bias) in MODEL_BIAS.iter().enumerate() {
            scores[idx] = round6((raw * bias).clamp(SCORE_FLOOR, SCORE_CEIL));
        }

        debug!(
            base = base,
            adjustment = adjustment,
            signals = contributions.len(),
            "Simulated ensemble scores"
        );

        assemble(
            scores,
            weights,
            model_version,
            ScoreSource::Simulated,
            Some(contributions),
            start.elapsed(),
            0.0,
        )
    }
}

impl Default for FallbackSimulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Sum of all heuristic signals, plus the non-zero contributions keyed by
/// signal name for the explanation map.
fn risk_adjustment(features: &FeatureVector) -> (f64, BTreeMap<String, f64>) {
    let mut contributions = BTreeMap::new();
    let mut total = 0.0;

    let signals: [(&str, f64); 8] = [
        ("amount_band", amount_risk(features.number(feature_keys::AMOUNT))),
        (
            "merchant_category",
            category_risk(features.text(feature_keys::MERCHANT_CATEGORY)),
        ),
        (
            "email_domain",
            email_domain_risk(features.text(feature_keys::EMAIL_DOMAIN)),
        ),
        (
            "card_prefix",
            card_prefix_risk(features.text(feature_keys::CARD_PREFIX)),
        ),
        (
            "recency",
            recency_risk(features.number(feature_keys::SECONDS_SINCE_LAST_TXN)),
        ),
        ("velocity", velocity_risk(features)),
        (
            "distance_from_home",
            distance_risk(features.number(feature_keys::DISTANCE_FROM_HOME_KM)),
        ),
        (
            "device_type",
            device_risk(features.text(feature_keys::DEVICE_TYPE)),
        ),
    ];

    for (name, value) in signals {
        if value != 0.0 {
            contributions.insert(name.to_string(), value);
        }
        total += value;
    }

    let agreement = match_agreement_risk(features);
    if agreement != 0.0 {
        contributions.insert("match_agreement".to_string(), agreement);
    }
    total += agreement;

    (total, contributions)
}

fn amount_risk(amount: Option<f64>) -> f64 {
    match amount {
        Some(amount) if amount > 10_000.0 => 0.25,
        Some(amount) if amount > 5_000.0 => 0.18,
        Some(amount) if amount > 1_000.0 => 0.10,
        Some(amount) if amount > 500.0 => 0.05,
        Some(amount) if amount >= 0.0 && amount < 50.0 => -0.05,
        _ => 0.0,
    }
}

fn category_risk(category: Option<&str>) -> f64 {
    match category {
        Some(code) if HIGH_RISK_CATEGORIES.contains(&code) => 0.15,
        Some(code) if MEDIUM_RISK_CATEGORIES.contains(&code) => 0.08,
        _ => 0.0,
    }
}

fn email_domain_risk(domain: Option<&str>) -> f64 {
    let Some(domain) = domain else { return 0.0 };
    let domain = domain.to_ascii_lowercase();
    if DISPOSABLE_EMAIL_DOMAINS.contains(&domain.as_str()) {
        0.20
    } else if FREE_EMAIL_DOMAINS.contains(&domain.as_str()) {
        0.02
    } else {
        0.0
    }
}

fn card_prefix_risk(prefix: Option<&str>) -> f64 {
    match prefix {
        Some(prefix)
            if HIGH_RISK_CARD_PREFIXES
                .iter()
                .any(|risky| prefix.starts_with(risky)) =>
        {
            0.10
        }
        _ => 0.0,
    }
}

fn recency_risk(seconds_since_last: Option<f64>) -> f64 {
    match seconds_since_last {
        Some(seconds) if seconds < 0.0 => 0.0,
        Some(seconds) if seconds < 60.0 => 0.20,
        Some(seconds) if seconds < 300.0 => 0.10,
        Some(seconds) if seconds < 3_600.0 => 0.04,
        _ => 0.0,
    }
}

fn velocity_risk(features: &FeatureVector) -> f64 {
    let mut risk = 0.0;
    if features
        .number(feature_keys::TXN_COUNT_1H)
        .is_some_and(|count| count > 10.0)
    {
        risk += 0.15;
    }
    if features
        .number(feature_keys::TXN_COUNT_24H)
        .is_some_and(|count| count > 50.0)
    {
        risk += 0.10;
    }
    risk
}

fn distance_risk(km: Option<f64>) -> f64 {
    match km {
        Some(km) if km > 1_000.0 => 0.12,
        Some(km) if km > 100.0 => 0.06,
        _ => 0.0,
    }
}

/// Disagreement among the categorical match flags raises risk: a fully
/// agreeing transaction contributes nothing, a fully disagreeing one 0.15.
fn match_agreement_risk(features: &FeatureVector) -> f64 {
    let mut agreed = 0usize;
    let mut total = 0usize;

    for (key, value) in features.iter() {
        if !key.starts_with(feature_keys::MATCH_PREFIX) {
            continue;
        }
        total += 1;
        let matched = match value {
            FeatureValue::Number(n) => *n > 0.5,
            FeatureValue::Text(t) => t.eq_ignore_ascii_case("true"),
        };
        if matched {
            agreed += 1;
        }
    }

    if total == 0 {
        return 0.0;
    }
    let ratio = agreed as f64 / total as f64;
    (1.0 - ratio) * 0.15
}

fn device_risk(device: Option<&str>) -> f64 {
    match device {
        Some("emulator") => 0.18,
        Some("web") => 0.05,
        Some("mobile") => 0.02,
        Some("pos") => -0.02,
        Some(_) => 0.04,
        None => 0.0,
    }
}

fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
