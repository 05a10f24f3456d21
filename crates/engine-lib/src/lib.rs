//! Ensemble fraud scoring library
//!
//! This crate provides the core functionality for:
//! - Routing transaction feature vectors to three hosted scoring models
//! - Weighted ensemble aggregation with a shared weight snapshot
//! - Heuristic simulation whenever the backend is unavailable
//! - Model version resolution against a release index
//! - Health checks and observability

pub mod backend;
pub mod ensemble;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod version;
pub mod weights;

pub use error::{EnsembleError, InvokeError, WeightError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{EngineMetrics, StructuredLogger};
