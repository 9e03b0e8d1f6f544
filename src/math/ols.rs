//! Weighted least squares solver.
//!
//! We solve small regression problems of the form:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! Rows are scaled by `sqrt(w_i)` and the resulting ordinary least squares
//! problem is solved with SVD, which handles tall design matrices and
//! tolerates nearly collinear columns (e.g. `days` and `1/days` features).

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Solve the weighted problem for row-major `rows` (each of length `p`).
///
/// Rows with non-positive or non-finite weight are dropped.
pub fn solve_weighted_least_squares(rows: &[Vec<f64>], y: &[f64], w: &[f64]) -> Option<Vec<f64>> {
    let p = rows.first()?.len();
    let kept: Vec<usize> = (0..rows.len())
        .filter(|&i| w[i].is_finite() && w[i] > 0.0 && rows[i].len() == p)
        .collect();
    if kept.len() < p {
        return None;
    }

    let mut xw = DMatrix::<f64>::zeros(kept.len(), p);
    let mut yw = DVector::<f64>::zeros(kept.len());
    for (r, &i) in kept.iter().enumerate() {
        let sw = w[i].sqrt();
        for j in 0..p {
            xw[(r, j)] = rows[i][j] * sw;
        }
        yw[r] = y[i] * sw;
    }

    solve_least_squares(&xw, &yw).map(|beta| beta.iter().copied().collect())
}
