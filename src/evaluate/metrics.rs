//! Aggregate error metrics over scored cases.

use serde::Serialize;

use crate::domain::{CaseResult, ResolutionPath};

/// Absolute error below which a prediction counts as exact.
pub const EXACT_TOLERANCE: f64 = 0.01;
pub const CLOSE_TOLERANCE: f64 = 1.0;
pub const VERY_CLOSE_TOLERANCE: f64 = 10.0;
/// Score penalty per non-exact case.
pub const MISS_PENALTY: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathCounts {
    pub exact: usize,
    pub neighbors: usize,
    pub formula: usize,
}

impl PathCounts {
    pub fn get(&self, path: ResolutionPath) -> usize {
        match path {
            ResolutionPath::Exact => self.exact,
            ResolutionPath::Neighbors => self.neighbors,
            ResolutionPath::Formula => self.formula,
        }
    }

    fn bump(&mut self, path: ResolutionPath) {
        match path {
            ResolutionPath::Exact => self.exact += 1,
            ResolutionPath::Neighbors => self.neighbors += 1,
            ResolutionPath::Formula => self.formula += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metrics {
    pub n: usize,
    /// `|err| < 0.01`
    pub exact: usize,
    /// `|err| < 1.00`
    pub close: usize,
    /// `|err| < 10.00`
    pub very_close: usize,
    pub mae: f64,
    pub rmse: f64,
    pub max_error: f64,
    /// `mae + (n - exact) * 10`; lower is better.
    pub score: f64,
    pub paths: PathCounts,
}

impl Metrics {
    /// `None` for an empty slice.
    pub fn from_results(results: &[CaseResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        let mut m = Metrics {
            n: results.len(),
            exact: 0,
            close: 0,
            very_close: 0,
            mae: 0.0,
            rmse: 0.0,
            max_error: 0.0,
            score: 0.0,
            paths: PathCounts::default(),
        };

        let mut abs_sum = 0.0;
        let mut sq_sum = 0.0;
        for r in results {
            let e = r.abs_error();
            abs_sum += e;
            sq_sum += e * e;
            m.max_error = m.max_error.max(e);
            if e < EXACT_TOLERANCE {
                m.exact += 1;
            }
            if e < CLOSE_TOLERANCE {
                m.close += 1;
            }
            if e < VERY_CLOSE_TOLERANCE {
                m.very_close += 1;
            }
            m.paths.bump(r.path);
        }

        let n = results.len() as f64;
        m.mae = abs_sum / n;
        m.rmse = (sq_sum / n).sqrt();
        m.score = m.mae + (m.n - m.exact) as f64 * MISS_PENALTY;
        Some(m)
    }

    pub fn exact_rate(&self) -> f64 {
        self.exact as f64 / self.n as f64
    }
}

/// The `top` cases with the largest absolute error, largest first.
///
/// Ties keep dataset order.
pub fn worst_cases(results: &[CaseResult], top: usize) -> Vec<(usize, &CaseResult)> {
    let mut ranked: Vec<(usize, &CaseResult)> = results.iter().enumerate().collect();
    ranked.sort_by(|a, b| b.1.abs_error().total_cmp(&a.1.abs_error()).then(a.0.cmp(&b.0)));
    ranked.truncate(top);
    ranked
}
