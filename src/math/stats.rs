//! Small summary statistics over `f64` slices.
//!
//! Non-finite values are the caller's problem; the dataset ingest rejects
//! them before anything reaches these helpers.

use serde::Serialize;

/// Min / max / mean / median of one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub n: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
}

impl Summary {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        let median = median_mut(&mut sorted)?;
        let mean = mean(values)?;
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
        Some(Self {
            n: values.len(),
            min: sorted[0],
            max: sorted[sorted.len() - 1],
            mean,
            median,
            std_dev: var.sqrt(),
        })
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Median; sorts `values` in place.
pub fn median_mut(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Pearson correlation coefficient. `None` when either side has zero variance
/// or the lengths differ.
pub fn correlation(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (&a, &b) in x.iter().zip(y) {
        cov += (a - mx) * (b - my);
        vx += (a - mx) * (a - mx);
        vy += (b - my) * (b - my);
    }
    let denom = (vx * vy).sqrt();
    if denom > 0.0 && denom.is_finite() {
        Some(cov / denom)
    } else {
        None
    }
}
