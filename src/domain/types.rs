//! Shared domain types.
//!
//! These types are intentionally kept small and `Copy` where possible: the
//! estimator runs thousands of queries per evaluation pass and every one of
//! them is a pure function of `(TripInput, ReferenceIndex, EstimatorConfig)`.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One trip query: duration, distance and total receipts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripInput {
    pub days: u32,
    pub miles: f64,
    pub receipts: f64,
}

impl TripInput {
    /// Build a validated query.
    ///
    /// `days` must be at least 1; `miles` and `receipts` must be finite and
    /// non-negative. Every per-day rate in the estimator divides by `days`.
    pub fn new(days: u32, miles: f64, receipts: f64) -> Result<Self, AppError> {
        if days == 0 {
            return Err(AppError::usage("Trip duration must be at least 1 day."));
        }
        if !(miles.is_finite() && miles >= 0.0) {
            return Err(AppError::usage(format!(
                "Miles traveled must be a finite, non-negative number (got {miles})."
            )));
        }
        if !(receipts.is_finite() && receipts >= 0.0) {
            return Err(AppError::usage(format!(
                "Receipt total must be a finite, non-negative number (got {receipts})."
            )));
        }
        Ok(Self {
            days,
            miles,
            receipts,
        })
    }

    pub fn days_f64(&self) -> f64 {
        f64::from(self.days)
    }

    pub fn miles_per_day(&self) -> f64 {
        self.miles / self.days_f64()
    }

    pub fn receipts_per_day(&self) -> f64 {
        self.receipts / self.days_f64()
    }
}

/// A labeled reference case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    pub input: TripInput,
    pub expected: f64,
}

/// Which stage of the estimator produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionPath {
    Exact,
    Neighbors,
    Formula,
}

impl ResolutionPath {
    pub const ALL: [ResolutionPath; 3] = [
        ResolutionPath::Exact,
        ResolutionPath::Neighbors,
        ResolutionPath::Formula,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ResolutionPath::Exact => "exact",
            ResolutionPath::Neighbors => "neighbors",
            ResolutionPath::Formula => "formula",
        }
    }
}

/// A reference record that contributed to a neighbour-stage estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborMatch {
    /// Position of the record in the reference index.
    pub index: usize,
    pub distance: f64,
    /// Interpolation weight before normalization.
    pub weight: f64,
    /// The record's output after moving it to the query point.
    pub adjusted: f64,
}

/// Estimator output for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    /// Reimbursement in dollars, quantized to cents.
    pub amount: f64,
    pub path: ResolutionPath,
    /// `1 / (1 + nearest distance)`; `1.0` for exact matches, `0.0` when no
    /// similarity search ran.
    pub confidence: f64,
    /// Empty unless `path == Neighbors`.
    pub neighbors: Vec<NeighborMatch>,
}

/// A scored prediction for one labeled case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseResult {
    pub record: TripRecord,
    pub predicted: f64,
    pub path: ResolutionPath,
    pub confidence: f64,
}

impl CaseResult {
    pub fn error(&self) -> f64 {
        self.predicted - self.record.expected
    }

    pub fn abs_error(&self) -> f64 {
        self.error().abs()
    }
}
