//! Penalized least squares on a dense design matrix.
//!
//! Solves `(X'X + diag(penalties)) beta = X'y` with a Cholesky factorisation.

use crate::error::{BacktestError, Result};

/// Coefficients of a penalized least-squares fit.
#[derive(Debug, Clone, PartialEq)]
pub struct RidgeFit {
    pub coefficients: Vec<f64>,
}

impl RidgeFit {
    /// Linear prediction for one design row.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(&self.coefficients)
            .map(|(x, b)| x * b)
            .sum()
    }

    /// Predictions for every row of a design matrix.
    pub fn predict(&self, design: &[Vec<f64>]) -> Vec<f64> {
        design.iter().map(|row| self.predict_row(row)).collect()
    }
}

/// Fit `y ~ design` with a per-column L2 penalty.
///
/// `design` holds one row per observation. A zero penalty leaves the column
/// unpenalized; a tiny jitter keeps the normal equations positive definite
/// when columns are collinear.
pub fn ridge_fit(design: &[Vec<f64>], y: &[f64], penalties: &[f64]) -> Result<RidgeFit> {
    if design.len() != y.len() {
        return Err(BacktestError::DimensionMismatch {
            expected: y.len(),
            got: design.len(),
        });
    }
    let cols = penalties.len();
    if cols == 0 {
        return Err(BacktestError::InvalidParameter(
            "design matrix has no columns".to_string(),
        ));
    }
    if let Some(row) = design.iter().find(|row| row.len() != cols) {
        return Err(BacktestError::DimensionMismatch {
            expected: cols,
            got: row.len(),
        });
    }
    if penalties.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(BacktestError::InvalidParameter(
            "penalties must be finite and non-negative".to_string(),
        ));
    }

    let mut xtx = vec![vec![0.0; cols]; cols];
    let mut xty = vec![0.0; cols];
    for (row, &target) in design.iter().zip(y) {
        for i in 0..cols {
            xty[i] += row[i] * target;
            for j in 0..=i {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }
    for i in 0..cols {
        for j in 0..i {
            xtx[j][i] = xtx[i][j];
        }
        xtx[i][i] += penalties[i] + 1e-10;
    }

    solve_symmetric(&xtx, &xty)
        .map(|coefficients| RidgeFit { coefficients })
        .ok_or_else(|| {
            BacktestError::InvalidParameter("normal equations are not positive definite".to_string())
        })
}

/// Solve `A x = b` for symmetric positive definite `A`.
fn solve_symmetric(a: &[Vec<f64>], b: &[f64]) -> Option<Vec<f64>> {
    let n = b.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let sum = a[i][j] - (0..j).map(|k| l[i][k] * l[j][k]).sum::<f64>();
            if i == j {
                if sum <= 0.0 || !sum.is_finite() {
                    return None;
                }
                l[i][i] = sum.sqrt();
            } else {
                l[i][j] = sum / l[j][j];
            }
        }
    }

    let mut z = vec![0.0; n];
    for i in 0..n {
        let sum = b[i] - (0..i).map(|j| l[i][j] * z[j]).sum::<f64>();
        z[i] = sum / l[i][i];
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let sum = z[i] - ((i + 1)..n).map(|j| l[j][i] * x[j]).sum::<f64>();
        x[i] = sum / l[i][i];
    }

    Some(x)
}
