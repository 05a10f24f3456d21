//! Error taxonomy for the scoring engine
//!
//! Administrative errors (`WeightError`) reject bad input without state
//! change. Invocation errors (`InvokeError`) abort a whole ensemble attempt;
//! they surface as a single `EnsembleError` which the orchestrator always
//! absorbs by degrading to the simulator.

use std::time::Duration;
use thiserror::Error;

/// Rejected administrative weight or threshold input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WeightError {
    #[error("missing weight for model `{0}`")]
    MissingWeight(&'static str),

    #[error("weight {value} for model `{model}` is outside [0, 1]")]
    InvalidWeight { model: &'static str, value: f64 },

    #[error("decision threshold {0} is outside (0, 1)")]
    InvalidThreshold(f64),

    #[error("weights sum to {sum:.6}, expected 1.0 within {tolerance}")]
    Unnormalized { sum: f64, tolerance: f64 },
}

/// A single model invocation failure.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("scoring backend failed: {0}")]
    Upstream(String),

    #[error("malformed scoring response: {0}")]
    MalformedResponse(String),
}

/// Aggregator-level failure: one member failed, the whole attempt is
/// discarded rather than aggregated partially.
#[derive(Debug, Error)]
#[error("ensemble attempt failed at model `{model}`: {source}")]
pub struct EnsembleError {
    pub model: String,
    #[source]
    pub source: InvokeError,
}
