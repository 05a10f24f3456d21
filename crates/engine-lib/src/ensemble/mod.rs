//! Ensemble scoring
//!
//! Fan-out to the three hosted models, weighted fan-in, and the heuristic
//! fallback path that keeps scoring available when the backend is not.

mod aggregator;
mod engine;
mod simulator;

pub use aggregator::{confidence_score, AggregatorConfig, EnsembleAggregator};
pub use engine::{EngineConfig, FraudScoringEngine};
pub use simulator::FallbackSimulator;
