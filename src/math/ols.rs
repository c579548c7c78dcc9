//! Least squares solver used by the convergence smoothers.
//!
//! Both smoothing strategies reduce to a straight-line fit:
//!
//! ```text
//! minimize Σ (y_i - (a + b x_i))^2
//! ```
//!
//! - sliding-window linear smoothing fits `χ²` against iteration index
//! - power-law smoothing fits `ln χ²` against `ln(iteration + 1)`
//!
//! We solve via SVD so that a degenerate window (all `x` equal, or a single point)
//! yields `None` instead of a panic.

use nalgebra::{DMatrix, DVector};

/// Solve a least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);

    // Try progressively looser tolerances if strict solve fails.
    for &tol in &[1e-12, 1e-10, 1e-8] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }

    None
}

/// Fit `y = a + b x` and return `(a, b)`.
///
/// Requires at least two distinct `x` values.
pub fn fit_line(x: &[f64], y: &[f64]) -> Option<(f64, f64)> {
    let n = x.len();
    if n < 2 || y.len() != n {
        return None;
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return None;
    }
    let spread = x.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b))
        - x.iter().fold(f64::INFINITY, |a, &b| a.min(b));
    if spread <= 0.0 {
        return None;
    }

    // Centre x so the intercept column and the slope column stay well conditioned
    // even for large iteration indices.
    let x_mean = x.iter().sum::<f64>() / n as f64;
    let mut design = DMatrix::<f64>::zeros(n, 2);
    for (i, &xi) in x.iter().enumerate() {
        design[(i, 0)] = 1.0;
        design[(i, 1)] = xi - x_mean;
    }
    let rhs = DVector::from_column_slice(y);

    let beta = solve_least_squares(&design, &rhs)?;
    let slope = beta[1];
    let intercept = beta[0] - slope * x_mean;
    Some((intercept, slope))
}
