//! Calibration search space.
//!
//! The grid is the cartesian product of value lists for the fallback
//! formula's per-trip, per-day and per-mile coefficients and its three receipt
//! rates (first tier, second tier, beyond). Candidates whose receipt rates
//! increase with the tier are skipped so every candidate keeps diminishing
//! returns on receipts.

use serde::{Deserialize, Serialize};

use crate::domain::FormulaConfig;
use crate::error::AppError;

/// Value lists searched for each coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub per_trip: Vec<f64>,
    pub per_day: Vec<f64>,
    pub per_mile: Vec<f64>,
    pub receipt_rate_1: Vec<f64>,
    pub receipt_rate_2: Vec<f64>,
    pub receipt_rate_beyond: Vec<f64>,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            per_trip: vec![300.0, 350.0, 400.0, 450.0, 500.0],
            per_day: vec![30.0, 40.0, 50.0, 60.0, 70.0],
            per_mile: vec![0.25, 0.30, 0.35, 0.40],
            receipt_rate_1: vec![0.40, 0.50, 0.60],
            receipt_rate_2: vec![0.25, 0.35, 0.45],
            receipt_rate_beyond: vec![0.05, 0.10, 0.15],
        }
    }
}

/// One point of the grid. `index` is its position in generation order and
/// breaks ties during selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Candidate {
    pub index: usize,
    pub per_trip: f64,
    pub per_day: f64,
    pub per_mile: f64,
    pub rates: [f64; 3],
}

impl Candidate {
    /// `base` with this candidate's coefficients substituted.
    ///
    /// `base` must have exactly two receipt tiers (see [`check_base`]).
    pub fn apply(&self, base: &FormulaConfig) -> FormulaConfig {
        let mut f = base.clone();
        f.per_trip = self.per_trip;
        f.per_day = self.per_day;
        f.per_mile = self.per_mile;
        for (tier, &rate) in f.receipt_tiers.iter_mut().zip(&self.rates[..2]) {
            tier.rate = rate;
        }
        f.receipt_rate_beyond = self.rates[2];
        f
    }
}

/// The grid searches two tier rates plus the open rate, so the base formula
/// must have exactly two tiers.
pub fn check_base(base: &FormulaConfig) -> Result<(), AppError> {
    if base.receipt_tiers.len() != 2 {
        return Err(AppError::usage(format!(
            "Calibration expects a formula with 2 receipt tiers (got {}).",
            base.receipt_tiers.len()
        )));
    }
    Ok(())
}

impl GridSpec {
    fn validate(&self) -> Result<(), AppError> {
        for (name, values) in [
            ("per_trip", &self.per_trip),
            ("per_day", &self.per_day),
            ("per_mile", &self.per_mile),
            ("receipt_rate_1", &self.receipt_rate_1),
            ("receipt_rate_2", &self.receipt_rate_2),
            ("receipt_rate_beyond", &self.receipt_rate_beyond),
        ] {
            if values.is_empty() {
                return Err(AppError::usage(format!("Calibration grid `{name}` is empty.")));
            }
            if let Some(bad) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
                return Err(AppError::usage(format!(
                    "Calibration grid `{name}` has an invalid value: {bad}."
                )));
            }
        }
        Ok(())
    }

    /// Enumerate candidates in a fixed order.
    pub fn candidates(&self) -> Result<Vec<Candidate>, AppError> {
        self.validate()?;
        let mut out = Vec::new();
        for &per_trip in &self.per_trip {
            for &per_day in &self.per_day {
                for &per_mile in &self.per_mile {
                    for &r1 in &self.receipt_rate_1 {
                        for &r2 in &self.receipt_rate_2 {
                            for &r3 in &self.receipt_rate_beyond {
                                if r1 < r2 || r2 < r3 {
                                    continue;
                                }
                                out.push(Candidate {
                                    index: out.len(),
                                    per_trip,
                                    per_day,
                                    per_mile,
                                    rates: [r1, r2, r3],
                                });
                            }
                        }
                    }
                }
            }
        }
        if out.is_empty() {
            return Err(AppError::usage(
                "Calibration grid has no candidate with non-increasing receipt rates.",
            ));
        }
        Ok(out)
    }
}
