use crate::core::transform::ensure_not_empty;
use crate::types::{Scan, SicmError, SicmResult};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Keys cubic convolution parameter (Catmull-Rom)
const CUBIC_A: f64 = -0.5;

/// Largest interpolated grid, in samples
pub const MAX_INTERPOLATED_SAMPLES: usize = 1 << 26;

/// Interpolation kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    Nearest,
    Cubic,
}

impl InterpolationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterpolationMethod::Nearest => "nearest",
            InterpolationMethod::Cubic => "cubic",
        }
    }
}

/// Interpolation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpolationParams {
    /// Subdivisions per original pixel
    pub num_points: usize,
    pub method: InterpolationMethod,
}

impl Default for InterpolationParams {
    fn default() -> Self {
        Self {
            num_points: 2,
            method: InterpolationMethod::Cubic,
        }
    }
}

impl InterpolationParams {
    pub fn new(num_points: usize, method: InterpolationMethod) -> Self {
        Self { num_points, method }
    }

    pub fn validate(&self) -> SicmResult<()> {
        if self.num_points == 0 {
            return Err(SicmError::Transform(
                "Interpolation needs at least one point per pixel".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resamples raster scans onto a finer grid
pub struct Interpolator {
    params: InterpolationParams,
}

impl Interpolator {
    pub fn new(params: InterpolationParams) -> Self {
        Self { params }
    }

    /// Replace `z` by its resampled version and refresh the grids. The
    /// physical extent is unchanged, so the µm-per-pixel factors shrink.
    pub fn apply(&self, scan: &mut Scan) -> SicmResult<()> {
        ensure_not_empty(scan)?;
        self.params.validate()?;
        let raster = scan.as_raster_mut()?;

        log::info!(
            "Interpolating {}x{} scan ({}, {} points per pixel)",
            raster.y_px,
            raster.x_px,
            self.params.method.as_str(),
            self.params.num_points
        );

        raster.z = self.resample(&raster.z)?;
        raster.update_dimensions();
        Ok(())
    }

    /// Sample `z` at coordinates `k / num_points` along each axis, for
    /// `k < len * num_points`. Cubic sampling yields NaN past the last
    /// original pixel, where the old mesh does not reach.
    pub fn resample(&self, z: &Array2<f64>) -> SicmResult<Array2<f64>> {
        self.params.validate()?;
        let (rows, cols) = z.dim();
        let n = self.params.num_points;
        let (new_rows, new_cols) = match (rows.checked_mul(n), cols.checked_mul(n)) {
            (Some(r), Some(c)) if r.checked_mul(c).map_or(false, |t| t <= MAX_INTERPOLATED_SAMPLES) => (r, c),
            _ => {
                return Err(SicmError::Transform(format!(
                    "Interpolating a {}x{} grid with {} points per pixel exceeds {} samples",
                    rows, cols, n, MAX_INTERPOLATED_SAMPLES
                )))
            }
        };

        let resampled = match self.params.method {
            InterpolationMethod::Nearest => {
                let row_index: Vec<usize> = (0..new_rows).map(|k| nearest_index(k, n, rows)).collect();
                let col_index: Vec<usize> = (0..new_cols).map(|k| nearest_index(k, n, cols)).collect();
                Array2::from_shape_fn((new_rows, new_cols), |(i, j)| z[[row_index[i], col_index[j]]])
            }
            InterpolationMethod::Cubic => {
                let row_weights: Vec<Option<Stencil>> = (0..new_rows).map(|k| cubic_stencil(k, n, rows)).collect();
                let col_weights: Vec<Option<Stencil>> = (0..new_cols).map(|k| cubic_stencil(k, n, cols)).collect();

                Array2::from_shape_fn((new_rows, new_cols), |(i, j)| {
                    match (&row_weights[i], &col_weights[j]) {
                        (Some(rw), Some(cw)) => {
                            let mut value = 0.0;
                            for &(ri, wr) in rw {
                                for &(ci, wc) in cw {
                                    if wr != 0.0 && wc != 0.0 {
                                        value += wr * wc * z[[ri, ci]];
                                    }
                                }
                            }
                            value
                        }
                        _ => f64::NAN,
                    }
                })
            }
        };
        Ok(resampled)
    }
}

/// Four `(index, weight)` taps of the cubic kernel
type Stencil = [(usize, f64); 4];

fn nearest_index(k: usize, n: usize, len: usize) -> usize {
    let position = k as f64 / n as f64;
    (position.round() as usize).min(len - 1)
}

fn cubic_kernel(t: f64) -> f64 {
    let t = t.abs();
    if t <= 1.0 {
        (CUBIC_A + 2.0) * t.powi(3) - (CUBIC_A + 3.0) * t.powi(2) + 1.0
    } else if t < 2.0 {
        CUBIC_A * t.powi(3) - 5.0 * CUBIC_A * t.powi(2) + 8.0 * CUBIC_A * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}

/// Taps for coordinate `k / n` on an axis of `len` samples; edge samples are
/// repeated beyond the border. None outside `[0, len - 1]`.
fn cubic_stencil(k: usize, n: usize, len: usize) -> Option<Stencil> {
    let position = k as f64 / n as f64;
    if position > (len - 1) as f64 {
        return None;
    }

    let base = position.floor() as isize;
    let fraction = position - base as f64;
    let last = len as isize - 1;
    let mut stencil = [(0usize, 0.0f64); 4];
    for (slot, offset) in (-1isize..=2).enumerate() {
        let index = (base + offset).clamp(0, last) as usize;
        stencil[slot] = (index, cubic_kernel(fraction - offset as f64));
    }
    Some(stencil)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, RasterScan};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_single_point_is_identity() {
        let z = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        for method in [InterpolationMethod::Nearest, InterpolationMethod::Cubic] {
            let out = Interpolator::new(InterpolationParams::new(1, method)).resample(&z).unwrap();
            assert_eq!(out, z);
        }
    }

    #[test]
    fn test_nearest_doubles_pixels() {
        let z = array![[1.0, 2.0], [3.0, 4.0]];
        let out = Interpolator::new(InterpolationParams::new(2, InterpolationMethod::Nearest)).resample(&z).unwrap();
        assert_eq!(out.dim(), (4, 4));
        assert_eq!(out[[0, 0]], 1.0);
        assert_eq!(out[[0, 3]], 2.0);
        assert_eq!(out[[3, 3]], 4.0);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_cubic_reproduces_linear_ramp_and_marks_corners() {
        let z = Array2::from_shape_fn((4, 5), |(i, j)| i as f64 + 2.0 * j as f64);
        let out = Interpolator::new(InterpolationParams::new(2, InterpolationMethod::Cubic)).resample(&z).unwrap();
        assert_eq!(out.dim(), (8, 10));

        // interior half-pixel positions sit on the ramp
        assert_abs_diff_eq!(out[[3, 3]], 1.5 + 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(out[[2, 4]], 1.0 + 4.0, epsilon = 1e-12);

        // beyond the last original row/column the mesh is not covered
        assert!(out[[7, 0]].is_nan());
        assert!(out[[0, 9]].is_nan());
        assert!(out[[6, 8]].is_finite());
    }

    #[test]
    fn test_apply_refreshes_dimensions() {
        let mut scan = Scan::raster(
            "t",
            RasterScan::new(Array2::zeros((3, 4)), 8.0, 6.0),
            Metadata::new(),
            Metadata::new(),
        );
        Interpolator::new(InterpolationParams::new(3, InterpolationMethod::Nearest))
            .apply(&mut scan)
            .unwrap();

        let raster = scan.as_raster().unwrap();
        assert_eq!((raster.y_px, raster.x_px), (9, 12));
        assert!(raster.check_invariants().is_ok());
        assert_eq!((raster.x_size, raster.y_size), (8.0, 6.0));
        assert_abs_diff_eq!(raster.micron_to_pixel_factor_x(), 8.0 / 12.0);
    }

    #[test]
    fn test_oversized_grid_rejected() {
        let z = Array2::zeros((4, 4));
        for n in [usize::MAX, usize::MAX / 2, 1 << 20] {
            let result = Interpolator::new(InterpolationParams::new(n, InterpolationMethod::Nearest)).resample(&z);
            assert!(matches!(result, Err(SicmError::Transform(_))));
        }
    }

    #[test]
    fn test_zero_points_rejected() {
        let mut scan = Scan::raster(
            "t",
            RasterScan::new(Array2::zeros((2, 2)), 2.0, 2.0),
            Metadata::new(),
            Metadata::new(),
        );
        let result = Interpolator::new(InterpolationParams::new(0, InterpolationMethod::Cubic)).apply(&mut scan);
        assert!(matches!(result, Err(SicmError::Transform(_))));
    }
}
