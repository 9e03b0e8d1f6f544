//! Domain types used throughout the crate.
//!
//! - trip queries and labeled records (`TripInput`, `TripRecord`)
//! - estimator outputs (`Estimate`, `ResolutionPath`, `CaseResult`)
//! - estimator configuration and presets (`EstimatorConfig`, `Preset`)

pub mod config;
pub mod types;

pub use config::*;
pub use types::*;
