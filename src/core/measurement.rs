use crate::core::fitting::{fit_surface, FitResult, SurfaceModel, MAX_POLYNOMIAL_DEGREE};
use crate::core::statistics::{mean, nan_max, nan_min, percentile, std_dev};
use crate::types::{RasterScan, Scan, ScanData, SicmError, SicmResult};
use ndarray::{Array1, Array2};
use std::fmt::{self, Write};

/// Samples taken from each end of a sorted scan line for R_z
const RZ_PEAKS: usize = 5;

fn ensure_samples(scan: &Scan) -> SicmResult<()> {
    if scan.z_len() == 0 {
        return Err(SicmError::Measurement("Scan contains no height samples".to_string()));
    }
    Ok(())
}

fn raster_of(scan: &Scan) -> SicmResult<&RasterScan> {
    match &scan.data {
        ScanData::Raster(raster) => Ok(raster),
        ScanData::Approach(_) => Err(SicmError::Measurement(
            "Measurement requires a backstep raster scan".to_string(),
        )),
    }
}

/// Lowest height, NaNs ignored
pub fn minimum(scan: &Scan) -> SicmResult<f64> {
    ensure_samples(scan)?;
    nan_min(scan.z_view().iter().copied())
        .ok_or_else(|| SicmError::Measurement("Scan contains only NaN samples".to_string()))
}

/// Highest height, NaNs ignored
pub fn maximum(scan: &Scan) -> SicmResult<f64> {
    ensure_samples(scan)?;
    nan_max(scan.z_view().iter().copied())
        .ok_or_else(|| SicmError::Measurement("Scan contains only NaN samples".to_string()))
}

/// Roughness of a raster after degree-5 polynomial leveling
#[derive(Debug, Clone)]
pub struct RoughnessResult {
    /// RMS of the residuals that are not outliers (µm)
    pub rq: f64,
    /// Residual grid with outliers replaced by NaN
    pub residuals: Array2<f64>,
    pub outliers: usize,
    /// Lower and upper outlier fences
    pub fences: (f64, f64),
    pub fit: FitResult,
}

/// R_q of the leveled surface with 1.5·IQR outlier trimming
pub fn roughness(scan: &Scan) -> SicmResult<RoughnessResult> {
    ensure_samples(scan)?;
    let raster = raster_of(scan)?;
    log::info!("Computing roughness of {}x{} scan", raster.y_px, raster.x_px);

    let x: Vec<f64> = raster.x.iter().copied().collect();
    let y: Vec<f64> = raster.y.iter().copied().collect();
    let z: Vec<f64> = raster.z.iter().copied().collect();

    let fit = fit_surface(&x, &y, &z, SurfaceModel::Polynomial { degree: MAX_POLYNOMIAL_DEGREE })?;

    let p25 = percentile(&fit.residuals, 25.0);
    let p75 = percentile(&fit.residuals, 75.0);
    let iqr = p75 - p25;
    let lower = p25 - 1.5 * iqr;
    let upper = p75 + 1.5 * iqr;

    let trimmed: Vec<f64> = fit
        .residuals
        .iter()
        .map(|&r| if r < lower || r > upper { f64::NAN } else { r })
        .collect();
    let kept: Vec<f64> = trimmed.iter().copied().filter(|r| !r.is_nan()).collect();
    let outliers = fit.residuals.iter().filter(|r| !r.is_nan()).count() - kept.len();

    if kept.is_empty() {
        return Err(SicmError::Measurement("No residuals left after outlier trimming".to_string()));
    }
    let rq = (kept.iter().map(|r| r * r).sum::<f64>() / kept.len() as f64).sqrt();

    let residuals = Array2::from_shape_vec(raster.z.dim(), trimmed)
        .map_err(|e| SicmError::Measurement(format!("Failed to reshape residuals: {}", e)))?;

    log::info!("Roughness R_q = {:.6} µm ({} outliers)", rq, outliers);
    Ok(RoughnessResult {
        rq,
        residuals,
        outliers,
        fences: (lower, upper),
        fit,
    })
}

/// Amplitude parameter evaluated per scan line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowParameter {
    /// Arithmetic mean height
    Ra,
    /// Root mean square height
    Rq,
    /// (Σ 5 highest − Σ 5 lowest) / N
    RzIso,
    /// (Σ 5 highest + Σ 5 lowest) / 2N
    RzDin,
    /// max − mean
    Rp,
    /// mean − min
    Rv,
    /// max − min
    Rt,
}

impl RowParameter {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowParameter::Ra => "R_a",
            RowParameter::Rq => "R_q",
            RowParameter::RzIso => "R_z (ISO)",
            RowParameter::RzDin => "R_z (DIN)",
            RowParameter::Rp => "R_p",
            RowParameter::Rv => "R_v",
            RowParameter::Rt => "R_t",
        }
    }
}

impl fmt::Display for RowParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One amplitude parameter of a single line; NaN samples propagate
pub fn row_parameter(row: &[f64], parameter: RowParameter) -> SicmResult<f64> {
    let n = row.len();
    if n == 0 {
        return Err(SicmError::Measurement("Empty scan line".to_string()));
    }
    let nf = n as f64;

    let value = match parameter {
        RowParameter::Ra => mean(row),
        RowParameter::Rq => (row.iter().map(|v| v * v).sum::<f64>() / nf).sqrt(),
        RowParameter::RzIso | RowParameter::RzDin => {
            // ISO takes disjoint peak and valley sets; the DIN sum is defined
            // as soon as five samples exist, even if the two sets overlap
            let required = if parameter == RowParameter::RzIso { 2 * RZ_PEAKS } else { RZ_PEAKS };
            if n < required {
                return Err(SicmError::Measurement(format!(
                    "{} needs at least {} samples per line, got {}",
                    parameter, required, n
                )));
            }
            if row.iter().any(|v| v.is_nan()) {
                return Ok(f64::NAN);
            }
            let mut sorted = row.to_vec();
            sorted.sort_by(|a, b| a.total_cmp(b));
            let lowest: f64 = sorted[..RZ_PEAKS].iter().sum();
            let highest: f64 = sorted[n - RZ_PEAKS..].iter().sum();
            if parameter == RowParameter::RzIso {
                (highest - lowest) / nf
            } else {
                (highest + lowest) / (2.0 * nf)
            }
        }
        RowParameter::Rp | RowParameter::Rv | RowParameter::Rt => {
            if row.iter().any(|v| v.is_nan()) {
                return Ok(f64::NAN);
            }
            let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = row.iter().copied().fold(f64::INFINITY, f64::min);
            match parameter {
                RowParameter::Rp => max - mean(row),
                RowParameter::Rv => mean(row) - min,
                _ => max - min,
            }
        }
    };

    Ok(value)
}

/// Parameter per scan line, one entry per row (a single entry for an
/// approach curve)
pub fn row_parameters(scan: &Scan, parameter: RowParameter) -> SicmResult<Array1<f64>> {
    ensure_samples(scan)?;
    log::debug!("Computing row-wise {}", parameter);

    match &scan.data {
        ScanData::Approach(curve) => {
            let row: Vec<f64> = curve.z.iter().copied().collect();
            Ok(Array1::from(vec![row_parameter(&row, parameter)?]))
        }
        ScanData::Raster(raster) => {
            let mut values = Vec::with_capacity(raster.y_px);
            for row in raster.z.rows() {
                let row: Vec<f64> = row.iter().copied().collect();
                values.push(row_parameter(&row, parameter)?);
            }
            Ok(Array1::from(values))
        }
    }
}

/// Whole-surface summary statistics over finite samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceStatistics {
    pub n_samples: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
    pub std_dev: f64,
    pub peak_to_valley: f64,
}

pub fn surface_statistics(scan: &Scan) -> SicmResult<SurfaceStatistics> {
    ensure_samples(scan)?;
    let values: Vec<f64> = scan.z_values().filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return Err(SicmError::Measurement("Scan contains no finite samples".to_string()));
    }

    let n = values.len() as f64;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = mean(&values);
    let rms = (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt();

    Ok(SurfaceStatistics {
        n_samples: values.len(),
        min,
        max,
        mean,
        rms,
        std_dev: std_dev(&values),
        peak_to_valley: max - min,
    })
}

/// Heights sampled along a path through the grid
#[derive(Debug, Clone, PartialEq)]
pub struct LineProfile {
    /// Distance from the start point in µm
    pub distance: Vec<f64>,
    pub height: Vec<f64>,
}

/// Nearest-pixel profile between two grid points `(x, y)`, one sample per
/// pixel step along the longer axis
pub fn line_profile(scan: &Scan, p1: (usize, usize), p2: (usize, usize)) -> SicmResult<LineProfile> {
    ensure_samples(scan)?;
    let raster = raster_of(scan)?;
    for p in [p1, p2] {
        if p.0 >= raster.x_px || p.1 >= raster.y_px {
            return Err(SicmError::Measurement(format!(
                "Profile point {:?} lies outside the {}x{} grid",
                p, raster.x_px, raster.y_px
            )));
        }
    }

    let dx = p2.0 as f64 - p1.0 as f64;
    let dy = p2.1 as f64 - p1.1 as f64;
    let steps = p1.0.abs_diff(p2.0).max(p1.1.abs_diff(p2.1));
    let fx = raster.micron_to_pixel_factor_x();
    let fy = raster.micron_to_pixel_factor_y();

    let mut profile = LineProfile {
        distance: Vec::with_capacity(steps + 1),
        height: Vec::with_capacity(steps + 1),
    };
    for k in 0..=steps {
        let t = if steps == 0 { 0.0 } else { k as f64 / steps as f64 };
        let xi = (p1.0 as f64 + t * dx).round() as usize;
        let yi = (p1.1 as f64 + t * dy).round() as usize;
        profile.distance.push(((t * dx * fx).powi(2) + (t * dy * fy).powi(2)).sqrt());
        profile.height.push(raster.z[[yi, xi]]);
    }

    Ok(profile)
}

/// Profile along scan line `row`
pub fn row_profile(scan: &Scan, row: usize) -> SicmResult<LineProfile> {
    let raster = raster_of(scan)?;
    if row >= raster.y_px {
        return Err(SicmError::Measurement(format!("Row {} outside grid of {} rows", row, raster.y_px)));
    }
    line_profile(scan, (0, row), (raster.x_px - 1, row))
}

/// Profile along column `col`
pub fn column_profile(scan: &Scan, col: usize) -> SicmResult<LineProfile> {
    let raster = raster_of(scan)?;
    if col >= raster.x_px {
        return Err(SicmError::Measurement(format!("Column {} outside grid of {} columns", col, raster.x_px)));
    }
    line_profile(scan, (col, 0), (col, raster.y_px - 1))
}

fn triangle_area(a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> f64 {
    let u = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let v = [c[0] - a[0], c[1] - a[1], c[2] - a[2]];
    let cross = [
        u[1] * v[2] - u[2] * v[1],
        u[2] * v[0] - u[0] * v[2],
        u[0] * v[1] - u[1] * v[0],
    ];
    0.5 * (cross[0] * cross[0] + cross[1] * cross[1] + cross[2] * cross[2]).sqrt()
}

/// True surface area in µm².
///
/// The `(x, y)` lattice is triangulated by splitting every cell along one
/// diagonal (a Delaunay triangulation of the rectilinear grid) and each
/// triangle is lifted to 3-D by its heights.
pub fn surface_area(scan: &Scan) -> SicmResult<f64> {
    ensure_samples(scan)?;
    let raster = raster_of(scan)?;
    if raster.x_px < 2 || raster.y_px < 2 {
        return Err(SicmError::Measurement("Surface area needs at least a 2x2 grid".to_string()));
    }

    let fx = raster.micron_to_pixel_factor_x();
    let fy = raster.micron_to_pixel_factor_y();
    let vertex = |i: usize, j: usize| [raster.x[[i, j]] * fx, raster.y[[i, j]] * fy, raster.z[[i, j]]];

    let mut area = 0.0;
    for i in 0..raster.y_px - 1 {
        for j in 0..raster.x_px - 1 {
            area += triangle_area(vertex(i, j), vertex(i, j + 1), vertex(i + 1, j));
            area += triangle_area(vertex(i + 1, j + 1), vertex(i + 1, j), vertex(i, j + 1));
        }
    }

    log::debug!("Surface area {:.6} µm²", area);
    Ok(area)
}

/// Plain-text summary of a scan's dimensions and statistics
pub fn measurement_report(scan: &Scan) -> SicmResult<String> {
    let stats = surface_statistics(scan)?;
    let mut report = String::new();

    let _ = writeln!(report, "Scan: {} ({})", scan.name, scan.mode());
    match &scan.data {
        ScanData::Approach(curve) => {
            let _ = writeln!(report, "Samples: {}", curve.z.len());
        }
        ScanData::Raster(raster) => {
            let raw = raster.raw_dimensions();
            let _ = writeln!(
                report,
                "Grid: {} x {} px, {:.3} x {:.3} µm",
                raster.x_px, raster.y_px, raster.x_size, raster.y_size
            );
            let _ = writeln!(
                report,
                "Recorded: {} x {} px, {:.3} x {:.3} µm",
                raw.x_px, raw.y_px, raw.x_size, raw.y_size
            );
        }
    }

    let _ = writeln!(report, "Min: {:.6} µm", stats.min);
    let _ = writeln!(report, "Max: {:.6} µm", stats.max);
    let _ = writeln!(report, "Mean: {:.6} µm", stats.mean);
    let _ = writeln!(report, "RMS: {:.6} µm", stats.rms);
    let _ = writeln!(report, "Std. dev.: {:.6} µm", stats.std_dev);
    let _ = writeln!(report, "Peak to valley: {:.6} µm", stats.peak_to_valley);

    if let ScanData::Raster(_) = scan.data {
        match roughness(scan) {
            Ok(result) => {
                let _ = writeln!(report, "Roughness R_q: {:.6} µm ({} outliers)", result.rq, result.outliers);
            }
            Err(e) => {
                let _ = writeln!(report, "Roughness R_q: n/a ({})", e);
            }
        }
        if let Ok(area) = surface_area(scan) {
            let _ = writeln!(report, "Surface area: {:.6} µm²", area);
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Metadata;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn raster_scan(z: Array2<f64>, x_size: f64, y_size: f64) -> Scan {
        Scan::raster("t", RasterScan::new(z, x_size, y_size), Metadata::new(), Metadata::new())
    }

    #[test]
    fn test_min_max() {
        let scan = raster_scan(array![[3.0, f64::NAN], [-2.0, 7.0]], 2.0, 2.0);
        assert_eq!(minimum(&scan).unwrap(), -2.0);
        assert_eq!(maximum(&scan).unwrap(), 7.0);
    }

    #[test]
    fn test_row_ra_of_constant_rows() {
        let z = Array2::from_shape_fn((4, 6), |(i, _)| (i + 1) as f64 * 0.5);
        let scan = raster_scan(z, 6.0, 4.0);
        let ra = row_parameters(&scan, RowParameter::Ra).unwrap();
        assert_eq!(ra.len(), 4);
        for (k, value) in ra.iter().enumerate() {
            assert_abs_diff_eq!(*value, (k + 1) as f64 * 0.5, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_row_ra_keeps_sign() {
        let z = array![[-2.0, -2.0, -2.0], [3.0, 3.0, 3.0], [1.0, f64::NAN, 1.0]];
        let scan = raster_scan(z, 3.0, 3.0);
        let ra = row_parameters(&scan, RowParameter::Ra).unwrap();
        assert_abs_diff_eq!(ra[0], -2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(ra[1], 3.0, epsilon = 1e-12);
        assert!(ra[2].is_nan());
    }

    #[test]
    fn test_rz_din_on_short_lines() {
        let row = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        // highest five 2..=6 sum to 20, lowest five 1..=5 sum to 15
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::RzDin).unwrap(), 35.0 / 12.0, epsilon = 1e-12);
        assert!(matches!(row_parameter(&row, RowParameter::RzIso), Err(SicmError::Measurement(_))));
        assert!(matches!(row_parameter(&row[..4], RowParameter::RzDin), Err(SicmError::Measurement(_))));
    }

    #[test]
    fn test_row_amplitude_parameters() {
        let row: Vec<f64> = (1..=10).map(|v| v as f64).collect();
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::Rq).unwrap(), (38.5f64).sqrt(), epsilon = 1e-12);
        // (6+7+8+9+10) - (1+2+3+4+5) = 25
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::RzIso).unwrap(), 2.5, epsilon = 1e-12);
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::RzDin).unwrap(), 55.0 / 20.0, epsilon = 1e-12);
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::Rp).unwrap(), 4.5, epsilon = 1e-12);
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::Rv).unwrap(), 4.5, epsilon = 1e-12);
        assert_abs_diff_eq!(row_parameter(&row, RowParameter::Rt).unwrap(), 9.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rz_requires_ten_samples() {
        let scan = raster_scan(Array2::zeros((2, 9)), 9.0, 2.0);
        let result = row_parameters(&scan, RowParameter::RzIso);
        assert!(matches!(result, Err(SicmError::Measurement(_))));
    }

    #[test]
    fn test_roughness_trims_outliers() {
        let mut z = Array2::from_shape_fn((20, 20), |(i, j)| {
            let (x, y) = (j as f64, i as f64);
            0.2 * x - 0.1 * y + if (i + j) % 2 == 0 { 0.01 } else { -0.01 }
        });
        z[[10, 10]] += 3.0;
        let scan = raster_scan(z, 20.0, 20.0);

        let result = roughness(&scan).unwrap();
        assert!(result.outliers >= 1);
        assert!(result.residuals[[10, 10]].is_nan());
        assert!(result.rq > 0.0);
        assert!(result.rq < result.fit.rms, "rq = {}, rms = {}", result.rq, result.fit.rms);
        assert!(result.rq < 0.1, "rq = {}", result.rq);
    }

    #[test]
    fn test_roughness_needs_raster() {
        let scan = Scan::approach("c", Array1::from(vec![1.0; 30]), Metadata::new(), Metadata::new());
        assert!(matches!(roughness(&scan), Err(SicmError::Measurement(_))));
    }

    #[test]
    fn test_surface_area_of_flat_and_tilted() {
        let flat = raster_scan(Array2::zeros((3, 4)), 8.0, 6.0);
        // pitch 2 µm in both directions, 3 x 2 cells
        assert_abs_diff_eq!(surface_area(&flat).unwrap(), 24.0, epsilon = 1e-12);

        let tilted = raster_scan(Array2::from_shape_fn((3, 3), |(_, j)| j as f64), 3.0, 3.0);
        assert_abs_diff_eq!(surface_area(&tilted).unwrap(), 4.0 * 2f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_line_profile() {
        let z = Array2::from_shape_fn((4, 4), |(i, j)| (10 * i + j) as f64);
        let scan = raster_scan(z, 8.0, 8.0);

        let profile = line_profile(&scan, (0, 0), (3, 3)).unwrap();
        assert_eq!(profile.height, vec![0.0, 11.0, 22.0, 33.0]);
        assert_abs_diff_eq!(profile.distance[3], (2.0f64 * 36.0).sqrt(), epsilon = 1e-12);

        let row = row_profile(&scan, 2).unwrap();
        assert_eq!(row.height, vec![20.0, 21.0, 22.0, 23.0]);
        let col = column_profile(&scan, 1).unwrap();
        assert_eq!(col.height, vec![1.0, 11.0, 21.0, 31.0]);

        assert!(line_profile(&scan, (0, 0), (4, 0)).is_err());
    }

    #[test]
    fn test_report_mentions_statistics() {
        let scan = raster_scan(Array2::from_shape_fn((6, 6), |(i, j)| (i * j) as f64 * 0.01), 3.0, 3.0);
        let report = measurement_report(&scan).unwrap();
        assert!(report.contains("Grid: 6 x 6 px"));
        assert!(report.contains("Peak to valley: 0.250000"));
        assert!(report.contains("Roughness R_q"));
    }
}
