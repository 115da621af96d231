//! Linear least-squares surface fits
//!
//! Every model used for leveling and roughness baselines (plane, paraboloid,
//! bivariate polynomial) is linear in its coefficients, so a single SVD
//! solve of the design matrix covers all of them.

use crate::types::{SicmError, SicmResult};
use nalgebra::{DMatrix, DVector, SVD};
use std::fmt::Write;

/// Highest total degree supported for bivariate polynomial fits
pub const MAX_POLYNOMIAL_DEGREE: usize = 5;

/// Surface model fitted to `(x, y, z)` samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceModel {
    /// `c0 + c1 x + c2 y`
    Plane,
    /// `c0 + a x² + b y²`, reported as `c0 + x²/c1² + y²/c2²`
    Paraboloid,
    /// All monomials `x^i y^j` with `i + j <= degree`
    Polynomial { degree: usize },
}

impl SurfaceModel {
    /// Exponent pairs `(i, j)` of the monomials `x^i y^j`, one per column
    pub fn terms(&self) -> Vec<(i32, i32)> {
        match self {
            SurfaceModel::Plane => vec![(0, 0), (1, 0), (0, 1)],
            SurfaceModel::Paraboloid => vec![(0, 0), (2, 0), (0, 2)],
            SurfaceModel::Polynomial { degree } => {
                let mut terms = Vec::new();
                for total in 0..=*degree as i32 {
                    for i in (0..=total).rev() {
                        terms.push((i, total - i));
                    }
                }
                terms
            }
        }
    }

    pub fn n_terms(&self) -> usize {
        self.terms().len()
    }

    pub fn validate(&self) -> SicmResult<()> {
        if let SurfaceModel::Polynomial { degree } = self {
            if *degree > MAX_POLYNOMIAL_DEGREE {
                return Err(SicmError::Fit(format!(
                    "Polynomial degree {} exceeds the maximum of {}",
                    degree, MAX_POLYNOMIAL_DEGREE
                )));
            }
        }
        Ok(())
    }

    pub fn name(&self) -> String {
        match self {
            SurfaceModel::Plane => "plane".to_string(),
            SurfaceModel::Paraboloid => "paraboloid".to_string(),
            SurfaceModel::Polynomial { degree } => format!("polynomial (degree {})", degree),
        }
    }
}

/// Evaluate a fitted model at one point
pub fn evaluate(terms: &[(i32, i32)], coefficients: &[f64], x: f64, y: f64) -> f64 {
    terms
        .iter()
        .zip(coefficients)
        .map(|(&(i, j), &c)| c * x.powi(i) * y.powi(j))
        .sum()
}

/// Outcome of a surface fit
#[derive(Debug, Clone)]
pub struct FitResult {
    pub model: SurfaceModel,
    /// One coefficient per entry of `model.terms()`
    pub coefficients: Vec<f64>,
    /// Model evaluated at every input sample, including masked ones
    pub fitted: Vec<f64>,
    /// `z - fitted`; NaN where `z` was NaN
    pub residuals: Vec<f64>,
    pub r_squared: f64,
    /// Root mean square of the finite residuals
    pub rms: f64,
    /// Samples that entered the solve
    pub n_samples: usize,
}

impl FitResult {
    pub fn evaluate(&self, x: f64, y: f64) -> f64 {
        evaluate(&self.model.terms(), &self.coefficients, x, y)
    }

    /// Human-readable summary of coefficients and goodness of fit
    pub fn report(&self) -> String {
        let mut report = String::new();
        let _ = writeln!(report, "Fit model: {}", self.model.name());
        let _ = writeln!(report, "Samples: {}", self.n_samples);

        for (&(i, j), c) in self.model.terms().iter().zip(&self.coefficients) {
            let _ = writeln!(report, "  {:<10} {:+.6e}", monomial_label(i, j), c);
        }

        if self.model == SurfaceModel::Paraboloid {
            let c0 = self.coefficients[0];
            let c1 = 1.0 / self.coefficients[1].abs().sqrt();
            let c2 = 1.0 / self.coefficients[2].abs().sqrt();
            let _ = writeln!(
                report,
                "  as z = c0 + x²/c1² + y²/c2²: c0 = {:.6e}, c1 = {:.6e}, c2 = {:.6e}",
                c0, c1, c2
            );
        }

        let _ = writeln!(report, "R²: {:.6}", self.r_squared);
        let _ = write!(report, "RMS residual: {:.6e}", self.rms);
        report
    }
}

fn monomial_label(i: i32, j: i32) -> String {
    match (i, j) {
        (0, 0) => "1".to_string(),
        (i, 0) if i == 1 => "x".to_string(),
        (0, j) if j == 1 => "y".to_string(),
        (i, 0) => format!("x^{}", i),
        (0, j) => format!("y^{}", j),
        (1, 1) => "x·y".to_string(),
        (i, j) => format!("x^{}·y^{}", i, j),
    }
}

/// Design matrix with one row per sample and one column per monomial
pub fn design_matrix(x: &[f64], y: &[f64], terms: &[(i32, i32)]) -> DMatrix<f64> {
    DMatrix::from_fn(x.len(), terms.len(), |row, col| {
        let (i, j) = terms[col];
        x[row].powi(i) * y[row].powi(j)
    })
}

/// Minimum-norm least-squares solution of `a · c ≈ b`.
///
/// Columns are equilibrated before the SVD so high-order monomials of large
/// pixel indices stay well scaled; a rank-deficient design is rejected.
pub fn solve_least_squares(mut a: DMatrix<f64>, b: DVector<f64>) -> SicmResult<DVector<f64>> {
    let (nrows, ncols) = a.shape();
    if nrows < ncols {
        return Err(SicmError::Fit(format!(
            "Underdetermined fit: {} samples for {} coefficients",
            nrows, ncols
        )));
    }
    if a.iter().any(|v| !v.is_finite()) || b.iter().any(|v| !v.is_finite()) {
        return Err(SicmError::Fit("Design matrix or target contains non-finite values".to_string()));
    }

    let mut scales = Vec::with_capacity(ncols);
    for mut column in a.column_iter_mut() {
        let scale = column.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if scale == 0.0 {
            return Err(SicmError::Fit("Singular design matrix: all-zero column".to_string()));
        }
        column /= scale;
        scales.push(scale);
    }

    let svd = SVD::new(a, true, true);
    let max_singular = svd.singular_values.iter().fold(0.0f64, |m, &v| m.max(v));
    let eps = max_singular * nrows.max(ncols) as f64 * f64::EPSILON;
    let rank = svd.rank(eps);
    if rank < ncols {
        return Err(SicmError::Fit(format!(
            "Singular design matrix: rank {} for {} coefficients",
            rank, ncols
        )));
    }

    let mut solution = svd
        .solve(&b, eps)
        .map_err(|e| SicmError::Fit(format!("Least-squares solve failed: {}", e)))?;
    for (value, scale) in solution.iter_mut().zip(&scales) {
        *value /= scale;
    }
    Ok(solution)
}

/// Fit `model` to the samples; NaN heights are left out of the solve
pub fn fit_surface(x: &[f64], y: &[f64], z: &[f64], model: SurfaceModel) -> SicmResult<FitResult> {
    model.validate()?;
    if x.len() != z.len() || y.len() != z.len() {
        return Err(SicmError::Fit(format!(
            "Coordinate lengths ({}, {}) do not match {} heights",
            x.len(),
            y.len(),
            z.len()
        )));
    }

    let terms = model.terms();
    let valid: Vec<usize> = (0..z.len()).filter(|&k| !z[k].is_nan()).collect();
    if valid.len() < z.len() {
        log::warn!("Excluding {} NaN samples from {} fit", z.len() - valid.len(), model.name());
    }
    if valid.len() < terms.len() {
        return Err(SicmError::Fit(format!(
            "{} fit needs at least {} samples, got {}",
            model.name(),
            terms.len(),
            valid.len()
        )));
    }

    let vx: Vec<f64> = valid.iter().map(|&k| x[k]).collect();
    let vy: Vec<f64> = valid.iter().map(|&k| y[k]).collect();
    let vz = DVector::from_iterator(valid.len(), valid.iter().map(|&k| z[k]));

    let a = design_matrix(&vx, &vy, &terms);
    let coefficients: Vec<f64> = solve_least_squares(a, vz)?.iter().copied().collect();

    let fitted: Vec<f64> = x
        .iter()
        .zip(y)
        .map(|(&xi, &yi)| evaluate(&terms, &coefficients, xi, yi))
        .collect();
    let residuals: Vec<f64> = z.iter().zip(&fitted).map(|(&zi, &fi)| zi - fi).collect();

    let n = valid.len() as f64;
    let z_mean = valid.iter().map(|&k| z[k]).sum::<f64>() / n;
    let ss_res: f64 = valid.iter().map(|&k| residuals[k] * residuals[k]).sum();
    let ss_tot: f64 = valid.iter().map(|&k| (z[k] - z_mean).powi(2)).sum();
    let r_squared = if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 1.0 };
    let rms = (ss_res / n).sqrt();

    log::debug!("{} fit on {} samples: R² = {:.6}, RMS = {:.3e}", model.name(), valid.len(), r_squared, rms);

    Ok(FitResult {
        model,
        coefficients,
        fitted,
        residuals,
        r_squared,
        rms,
        n_samples: valid.len(),
    })
}

/// Ordinary polynomial fit `y ≈ Σ c_k x^k`, coefficients in ascending order
pub fn fit_polynomial_1d(x: &[f64], y: &[f64], degree: usize) -> SicmResult<Vec<f64>> {
    if degree > MAX_POLYNOMIAL_DEGREE {
        return Err(SicmError::Fit(format!(
            "Polynomial degree {} exceeds the maximum of {}",
            degree, MAX_POLYNOMIAL_DEGREE
        )));
    }
    if x.len() != y.len() {
        return Err(SicmError::Fit("Mismatched x and y lengths".to_string()));
    }

    let valid: Vec<usize> = (0..y.len()).filter(|&k| !y[k].is_nan()).collect();
    if valid.len() <= degree {
        return Err(SicmError::Fit(format!(
            "Degree {} line fit needs more than {} samples, got {}",
            degree,
            degree,
            valid.len()
        )));
    }

    let a = DMatrix::from_fn(valid.len(), degree + 1, |row, col| x[valid[row]].powi(col as i32));
    let b = DVector::from_iterator(valid.len(), valid.iter().map(|&k| y[k]));
    Ok(solve_least_squares(a, b)?.iter().copied().collect())
}

/// Horner evaluation of ascending coefficients
pub fn evaluate_polynomial_1d(coefficients: &[f64], x: f64) -> f64 {
    coefficients.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}
