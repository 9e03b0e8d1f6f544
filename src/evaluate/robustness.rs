//! Noise probe: how much do predictions move when miles and receipts are
//! perturbed slightly?
//!
//! A sample of reference records is queried once as-is and then `trials`
//! times with Gaussian noise added to miles and receipts (clamped at zero).
//! Everything is driven by one seeded RNG so reruns print the same numbers.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use tracing::debug;

use crate::domain::{TripInput, TripRecord};
use crate::error::AppError;
use crate::estimator::Estimator;

#[derive(Debug, Clone, Copy)]
pub struct RobustnessOptions {
    /// Number of records probed, spread evenly over the dataset.
    pub samples: usize,
    pub trials: usize,
    pub miles_sd: f64,
    pub receipts_sd: f64,
    pub seed: u64,
}

impl Default for RobustnessOptions {
    fn default() -> Self {
        Self {
            samples: 10,
            trials: 10,
            miles_sd: 0.25,
            receipts_sd: 0.25,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RobustnessReport {
    pub samples: usize,
    pub perturbations: usize,
    pub mean_abs_change: f64,
    pub max_abs_change: f64,
    /// Perturbed queries answered by a different stage than the clean query.
    pub path_changes: usize,
    /// `1 - mean_abs_change / 100`.
    pub resistance: f64,
}

pub fn robustness_probe(
    est: &Estimator<'_>,
    records: &[TripRecord],
    opts: &RobustnessOptions,
) -> Result<RobustnessReport, AppError> {
    if records.is_empty() || opts.samples == 0 || opts.trials == 0 {
        return Err(AppError::data("Robustness probe needs records, samples and trials."));
    }
    let miles_noise = Normal::new(0.0, opts.miles_sd)
        .map_err(|e| AppError::usage(format!("Invalid miles noise: {e}")))?;
    let receipts_noise = Normal::new(0.0, opts.receipts_sd)
        .map_err(|e| AppError::usage(format!("Invalid receipts noise: {e}")))?;
    let mut rng = StdRng::seed_from_u64(opts.seed);

    let samples = opts.samples.min(records.len());
    let stride = records.len() / samples;

    let mut total = 0.0;
    let mut max_change: f64 = 0.0;
    let mut path_changes = 0usize;
    let mut perturbations = 0usize;

    for s in 0..samples {
        let base = records[s * stride].input;
        let clean = est.estimate(&base);

        for _ in 0..opts.trials {
            let miles = (base.miles + miles_noise.sample(&mut rng)).max(0.0);
            let receipts = (base.receipts + receipts_noise.sample(&mut rng)).max(0.0);
            let noisy = est.estimate(&TripInput::new(base.days, miles, receipts)?);

            let change = (noisy.amount - clean.amount).abs();
            total += change;
            max_change = max_change.max(change);
            if noisy.path != clean.path {
                path_changes += 1;
            }
            perturbations += 1;
        }
        debug!(sample = s, path = clean.path.label(), "probed record");
    }

    let mean = total / perturbations as f64;
    Ok(RobustnessReport {
        samples,
        perturbations,
        mean_abs_change: mean,
        max_abs_change: max_change,
        path_changes,
        resistance: 1.0 - mean / 100.0,
    })
}
