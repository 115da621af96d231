use crate::core::fitting::{
    evaluate, evaluate_polynomial_1d, fit_polynomial_1d, fit_surface, SurfaceModel,
    MAX_POLYNOMIAL_DEGREE,
};
use crate::core::statistics::{mean, percentile};
use crate::core::transform::ensure_not_empty;
use crate::types::{RasterScan, Scan, SicmError, SicmResult};
use ndarray::{Array2, ArrayViewMut1, Axis, ShapeBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Leveling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelingMethod {
    #[serde(rename = "plane")]
    Plane,
    #[serde(rename = "paraboloid")]
    Paraboloid,
    #[serde(rename = "2Dpoly")]
    Poly2D,
    /// Per-row polynomial of `degree`
    #[serde(rename = "linewise")]
    Linewise,
    /// Per-row mean
    #[serde(rename = "linewise_mean")]
    LinewiseMean,
    /// Per-column polynomial of `degree`
    #[serde(rename = "linewise_y")]
    LinewiseY,
}

impl LevelingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LevelingMethod::Plane => "plane",
            LevelingMethod::Paraboloid => "paraboloid",
            LevelingMethod::Poly2D => "2Dpoly",
            LevelingMethod::Linewise => "linewise",
            LevelingMethod::LinewiseMean => "linewise_mean",
            LevelingMethod::LinewiseY => "linewise_y",
        }
    }
}

impl fmt::Display for LevelingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LevelingMethod {
    type Err = SicmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plane" => Ok(LevelingMethod::Plane),
            "paraboloid" => Ok(LevelingMethod::Paraboloid),
            "2Dpoly" => Ok(LevelingMethod::Poly2D),
            "linewise" => Ok(LevelingMethod::Linewise),
            "linewise_mean" => Ok(LevelingMethod::LinewiseMean),
            "linewise_y" => Ok(LevelingMethod::LinewiseY),
            other => Err(SicmError::Transform(format!("Unknown leveling method '{}'", other))),
        }
    }
}

/// Leveling parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LevelingParams {
    pub method: LevelingMethod,
    /// Polynomial degree for `2Dpoly`, `linewise` and `linewise_y`
    pub degree: usize,
}

impl Default for LevelingParams {
    fn default() -> Self {
        Self {
            method: LevelingMethod::Plane,
            degree: MAX_POLYNOMIAL_DEGREE,
        }
    }
}

impl LevelingParams {
    pub fn new(method: LevelingMethod, degree: usize) -> Self {
        Self { method, degree }
    }

    pub fn validate(&self) -> SicmResult<()> {
        if self.degree > MAX_POLYNOMIAL_DEGREE {
            return Err(SicmError::Transform(format!(
                "Leveling degree {} exceeds the maximum of {}",
                self.degree, MAX_POLYNOMIAL_DEGREE
            )));
        }
        Ok(())
    }
}

/// Removes low-order geometric trends from raster scans
pub struct Leveler {
    params: LevelingParams,
}

impl Leveler {
    pub fn new(params: LevelingParams) -> Self {
        Self { params }
    }

    /// Plane leveling with default degree
    pub fn standard() -> Self {
        Self::new(LevelingParams::default())
    }

    pub fn apply(&self, scan: &mut Scan) -> SicmResult<()> {
        ensure_not_empty(scan)?;
        self.params.validate()?;
        let raster = scan.as_raster_mut()?;
        log::info!("Leveling {}x{} scan with method {}", raster.y_px, raster.x_px, self.params.method);

        let leveled = match self.params.method {
            LevelingMethod::Plane => level_surface(raster, SurfaceModel::Plane)?,
            LevelingMethod::Paraboloid => level_surface(raster, SurfaceModel::Paraboloid)?,
            LevelingMethod::Poly2D => level_surface(
                raster,
                SurfaceModel::Polynomial {
                    degree: self.params.degree,
                },
            )?,
            LevelingMethod::Linewise => level_lines(&raster.z, Axis(0), Some(self.params.degree))?,
            LevelingMethod::LinewiseMean => level_lines(&raster.z, Axis(0), None)?,
            LevelingMethod::LinewiseY => level_lines(&raster.z, Axis(1), Some(self.params.degree))?,
        };

        raster.z = leveled;
        Ok(())
    }
}

/// Two-stage surface leveling.
///
/// The model is fitted to the whole grid; samples whose residual is at or
/// below the 25th percentile are dropped and the model is refitted to the
/// remaining residuals, which are then leveled by the refined fit.
pub fn level_surface(raster: &RasterScan, model: SurfaceModel) -> SicmResult<Array2<f64>> {
    let (rows, cols) = raster.z.dim();

    // column-major flattening
    let x: Vec<f64> = raster.x.t().iter().copied().collect();
    let y: Vec<f64> = raster.y.t().iter().copied().collect();
    let z: Vec<f64> = raster.z.t().iter().copied().collect();

    let first = fit_surface(&x, &y, &z, model)?;
    let residuals = first.residuals;

    let p25 = percentile(&residuals, 25.0);
    let keep: Vec<usize> = (0..residuals.len()).filter(|&k| residuals[k] > p25).collect();
    log::debug!("Refitting {} on {} of {} samples above p25 = {:.3e}", model.name(), keep.len(), residuals.len(), p25);

    let leveled = if keep.len() < model.n_terms() {
        log::debug!("Too few samples above the lower quartile, keeping first-stage residuals");
        residuals
    } else {
        let kx: Vec<f64> = keep.iter().map(|&k| x[k]).collect();
        let ky: Vec<f64> = keep.iter().map(|&k| y[k]).collect();
        let kr: Vec<f64> = keep.iter().map(|&k| residuals[k]).collect();
        let refined = fit_surface(&kx, &ky, &kr, model)?;
        let terms = model.terms();

        residuals
            .iter()
            .zip(x.iter().zip(&y))
            .map(|(&r, (&xi, &yi))| r - evaluate(&terms, &refined.coefficients, xi, yi))
            .collect()
    };

    let reshaped = Array2::from_shape_vec((rows, cols).f(), leveled)
        .map_err(|e| SicmError::Transform(format!("Failed to reshape leveled data: {}", e)))?;
    Ok(reshaped.as_standard_layout().into_owned())
}

/// Subtract a per-line polynomial (or the line mean when `degree` is None)
/// from every lane along `axis`: `Axis(0)` walks rows, `Axis(1)` columns.
fn level_lines(z: &Array2<f64>, axis: Axis, degree: Option<usize>) -> SicmResult<Array2<f64>> {
    let mut leveled = z.clone();
    for line in leveled.axis_iter_mut(axis) {
        level_line(line, degree)?;
    }
    Ok(leveled)
}

fn level_line(mut line: ArrayViewMut1<f64>, degree: Option<usize>) -> SicmResult<()> {
    let values: Vec<f64> = line.iter().copied().collect();
    match degree {
        None => {
            let finite: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
            let line_mean = mean(&finite);
            line.mapv_inplace(|v| v - line_mean);
        }
        Some(degree) => {
            let positions: Vec<f64> = (0..values.len()).map(|k| k as f64).collect();
            let coefficients = fit_polynomial_1d(&positions, &values, degree)?;
            for (k, v) in line.iter_mut().enumerate() {
                *v -= evaluate_polynomial_1d(&coefficients, k as f64);
            }
        }
    }
    Ok(())
}
