//! Linear baseline fit.
//!
//! ```text
//! output ≈ β0 + β1 * days + β2 * miles + β3 * receipts
//! ```
//!
//! Solved by (weighted) least squares. With `RobustKind::Huber` the fit is
//! repeated with Huber weights computed from the previous pass's residuals
//! (iteratively reweighted least squares), which keeps a handful of odd
//! records from dragging the coefficients.
//!
//! The result is used as the shrinkage baseline and as a reference point in
//! the `fit` report.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{LinearBaseline, TripRecord};
use crate::error::AppError;
use crate::math::{median_mut, solve_weighted_least_squares};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RobustKind {
    None,
    Huber,
}

#[derive(Debug, Clone, Copy)]
pub struct FitOptions {
    pub robust: RobustKind,
    /// Huber tuning constant, in units of the MAD-based residual scale.
    pub robust_k: f64,
    pub max_iter: usize,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            robust: RobustKind::None,
            robust_k: 1.345,
            max_iter: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    pub baseline: LinearBaseline,
    pub n: usize,
    /// Unweighted, over every record.
    pub mae: f64,
    pub rmse: f64,
    pub r_squared: f64,
    pub iterations: usize,
}

/// Fit the linear baseline to labeled records.
pub fn fit_linear_baseline(records: &[TripRecord], opts: &FitOptions) -> Result<LinearFit, AppError> {
    const P: usize = 4;
    if records.len() < P {
        return Err(AppError::data(format!(
            "Need at least {P} records to fit a linear baseline (got {}).",
            records.len()
        )));
    }

    let rows: Vec<Vec<f64>> = records
        .iter()
        .map(|r| vec![1.0, r.input.days_f64(), r.input.miles, r.input.receipts])
        .collect();
    let y: Vec<f64> = records.iter().map(|r| r.expected).collect();
    let w_base = vec![1.0; records.len()];

    let passes = match opts.robust {
        RobustKind::None => 1,
        RobustKind::Huber => opts.max_iter.max(1),
    };

    let mut weights = w_base.clone();
    let mut beta: Option<Vec<f64>> = None;
    let mut iterations = 0;
    for _ in 0..passes {
        let next = solve_weighted_least_squares(&rows, &y, &weights)
            .ok_or_else(|| AppError::internal("Linear baseline system is singular."))?;
        iterations += 1;

        let converged = beta.as_ref().is_some_and(|prev| {
            prev.iter()
                .zip(&next)
                .all(|(a, b)| (a - b).abs() <= 1e-9 * (1.0 + a.abs()))
        });
        let residuals: Vec<f64> = rows.iter().zip(&y).map(|(x, &yi)| yi - dot(x, &next)).collect();
        beta = Some(next);
        if converged {
            break;
        }
        weights = huber_reweight(&w_base, &residuals, opts.robust_k);
    }

    let beta = beta.ok_or_else(|| AppError::internal("Linear baseline fit produced no solution."))?;
    let baseline = LinearBaseline {
        intercept: beta[0],
        per_day: beta[1],
        per_mile: beta[2],
        per_receipt: beta[3],
    };

    let n = records.len() as f64;
    let mean_y = y.iter().sum::<f64>() / n;
    let mut abs_sum = 0.0;
    let mut sse = 0.0;
    let mut sst = 0.0;
    for r in records {
        let e = r.expected - baseline.predict(r.input.days_f64(), r.input.miles, r.input.receipts);
        abs_sum += e.abs();
        sse += e * e;
        sst += (r.expected - mean_y) * (r.expected - mean_y);
    }
    let r_squared = if sst > 0.0 { 1.0 - sse / sst } else { 0.0 };

    debug!(iterations, ?baseline, "fitted linear baseline");

    Ok(LinearFit {
        baseline,
        n: records.len(),
        mae: abs_sum / n,
        rmse: (sse / n).sqrt(),
        r_squared,
        iterations,
    })
}

fn dot(x: &[f64], beta: &[f64]) -> f64 {
    x.iter().zip(beta).map(|(a, b)| a * b).sum()
}

/// Huber weights with a MAD residual scale.
fn huber_reweight(w_base: &[f64], residuals: &[f64], k: f64) -> Vec<f64> {
    let mut abs: Vec<f64> = residuals.iter().map(|r| r.abs()).filter(|v| v.is_finite()).collect();
    let mad = median_mut(&mut abs).unwrap_or(0.0);
    let scale = (mad / 0.6745).max(1e-12);
    let cutoff = k.max(1e-6) * scale;

    let min_factor = 1e-3;
    w_base
        .iter()
        .zip(residuals)
        .map(|(&w0, &r)| {
            let ar = r.abs();
            let factor = if ar <= cutoff || !ar.is_finite() { 1.0 } else { cutoff / ar };
            (w0 * factor).max(w0 * min_factor)
        })
        .collect()
}
