use crate::core::statistics::{mean, median};
use crate::core::transform::ensure_not_empty;
use crate::types::{Scan, ScanData, SicmError, SicmResult};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Filter parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterParams {
    /// Window radius in samples (temporal) or pixels (spatial)
    pub radius: usize,
}

impl Default for FilterParams {
    fn default() -> Self {
        Self { radius: 1 }
    }
}

impl FilterParams {
    pub fn new(radius: usize) -> Self {
        Self { radius }
    }

    pub fn validate(&self) -> SicmResult<()> {
        if self.radius == 0 {
            return Err(SicmError::Transform("Filter radius must be positive".to_string()));
        }
        Ok(())
    }
}

/// Statistic taken over each filter window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    Median,
    Mean,
}

impl FilterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKind::Median => "median",
            FilterKind::Mean => "mean",
        }
    }

    fn reduce(&self, window: &[f64]) -> f64 {
        match self {
            FilterKind::Median => median(window),
            FilterKind::Mean => mean(window),
        }
    }
}

/// Median/mean denoising of height data
pub struct ScanFilter {
    params: FilterParams,
}

impl ScanFilter {
    /// Create a new filter with default parameters
    pub fn new() -> Self {
        Self {
            params: FilterParams::default(),
        }
    }

    /// Create a filter with custom parameters
    pub fn with_params(params: FilterParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FilterParams {
        &self.params
    }

    /// Filter along acquisition order: `z` is read as a row-major sequence and
    /// each sample replaced by the statistic of `[i - r, i + r]` clipped to the
    /// sequence. Radius 0 leaves the data unchanged, so unlike the spatial
    /// filter no radius is rejected here.
    pub fn apply_temporal(&self, scan: &mut Scan, kind: FilterKind) -> SicmResult<()> {
        ensure_not_empty(scan)?;
        log::info!("Applying temporal {} filter, radius {}", kind.as_str(), self.params.radius);

        match &mut scan.data {
            ScanData::Approach(curve) => {
                let samples: Vec<f64> = curve.z.iter().copied().collect();
                curve.z = Array1::from(self.temporal(&samples, kind));
            }
            ScanData::Raster(raster) => {
                let samples: Vec<f64> = raster.z.iter().copied().collect();
                let filtered = self.temporal(&samples, kind);
                raster.z = Array2::from_shape_vec(raster.z.dim(), filtered)
                    .map_err(|e| SicmError::Transform(format!("Failed to reshape filtered data: {}", e)))?;
            }
        }

        Ok(())
    }

    /// Filter over a disc of radius `r` around every pixel, clipped to the
    /// grid. A pixel belongs to the disc when its squared integer distance is
    /// below `r²`, so radius 1 is the single centre pixel.
    pub fn apply_spatial(&self, scan: &mut Scan, kind: FilterKind) -> SicmResult<()> {
        ensure_not_empty(scan)?;
        self.params.validate()?;
        let raster = scan.as_raster_mut()?;
        log::info!("Applying spatial {} filter, radius {}", kind.as_str(), self.params.radius);

        raster.z = self.spatial(&raster.z, kind);
        Ok(())
    }

    /// Sliding-window statistic over a flat sequence
    pub fn temporal(&self, samples: &[f64], kind: FilterKind) -> Vec<f64> {
        let n = samples.len();
        // a window of `n` on either side already spans the whole sequence
        let radius = self.params.radius.min(n);
        if radius == 0 {
            return samples.to_vec();
        }

        (0..n)
            .map(|i| {
                let start = i.saturating_sub(radius);
                let end = i.saturating_add(radius).saturating_add(1).min(n);
                kind.reduce(&samples[start..end])
            })
            .collect()
    }

    /// Disc-window statistic over a grid
    pub fn spatial(&self, image: &Array2<f64>, kind: FilterKind) -> Array2<f64> {
        let (height, width) = image.dim();
        let offsets = disc_offsets(self.params.radius, height, width);
        log::debug!("Spatial window holds {} pixels", offsets.len());

        let mut filtered = Array2::zeros((height, width));
        let mut window = Vec::with_capacity(offsets.len());

        for i in 0..height {
            for j in 0..width {
                window.clear();
                for &(di, dj) in &offsets {
                    let ii = i as isize + di;
                    let jj = j as isize + dj;
                    if ii >= 0 && ii < height as isize && jj >= 0 && jj < width as isize {
                        window.push(image[[ii as usize, jj as usize]]);
                    }
                }
                filtered[[i, j]] = kind.reduce(&window);
            }
        }

        filtered
    }
}

impl Default for ScanFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Offsets `(di, dj)` with `di² + dj² < r²`, limited to those that can land
/// inside a `height` x `width` grid
fn disc_offsets(radius: usize, height: usize, width: usize) -> Vec<(isize, isize)> {
    let r2 = (radius as u128) * (radius as u128);
    let max_di = radius.min(height.saturating_sub(1)) as isize;
    let max_dj = radius.min(width.saturating_sub(1)) as isize;
    let mut offsets = Vec::new();
    for di in -max_di..=max_di {
        for dj in -max_dj..=max_dj {
            let d2 = (di * di) as u128 + (dj * dj) as u128;
            if d2 < r2 {
                offsets.push((di, dj));
            }
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, RasterScan};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_temporal_median_removes_spike() {
        let filter = ScanFilter::with_params(FilterParams::new(1));
        let out = filter.temporal(&[10.0, 10.0, 100.0, 10.0, 10.0], FilterKind::Median);
        assert_eq!(out, vec![10.0, 10.0, 10.0, 10.0, 10.0]);
    }

    #[test]
    fn test_temporal_mean_clips_at_edges() {
        let filter = ScanFilter::with_params(FilterParams::new(1));
        let out = filter.temporal(&[0.0, 3.0, 6.0], FilterKind::Mean);
        assert_abs_diff_eq!(out[0], 1.5);
        assert_abs_diff_eq!(out[1], 3.0);
        assert_abs_diff_eq!(out[2], 4.5);
    }

    #[test]
    fn test_temporal_radius_zero_is_identity() {
        let filter = ScanFilter::with_params(FilterParams::new(0));
        let samples = [1.0, 7.0, -2.0, 4.0];
        assert_eq!(filter.temporal(&samples, FilterKind::Median), samples.to_vec());
        assert_eq!(filter.temporal(&samples, FilterKind::Mean), samples.to_vec());
    }

    #[test]
    fn test_temporal_follows_row_major_order() {
        let mut scan = Scan::raster(
            "t",
            RasterScan::new(array![[1.0, 1.0], [9.0, 1.0]], 2.0, 2.0),
            Metadata::new(),
            Metadata::new(),
        );
        ScanFilter::new().apply_temporal(&mut scan, FilterKind::Median).unwrap();
        // sequence [1, 1, 9, 1] -> [1, 1, 1, 5]
        assert_eq!(scan.as_raster().unwrap().z, array![[1.0, 1.0], [1.0, 5.0]]);
    }

    #[test]
    fn test_spatial_radius_one_is_identity() {
        let image = array![[1.0, 2.0, 3.0], [4.0, 50.0, 6.0], [7.0, 8.0, 9.0]];
        let filter = ScanFilter::with_params(FilterParams::new(1));
        assert_eq!(filter.spatial(&image, FilterKind::Median), image);
        assert_eq!(filter.spatial(&image, FilterKind::Mean), image);
    }

    #[test]
    fn test_spatial_median_radius_two() {
        let image = array![[1.0, 1.0, 1.0], [1.0, 50.0, 1.0], [1.0, 1.0, 1.0]];
        let filter = ScanFilter::with_params(FilterParams::new(2));
        let out = filter.spatial(&image, FilterKind::Median);
        assert_eq!(out[[1, 1]], 1.0);
        assert_eq!(out[[0, 0]], 1.0);
    }

    #[test]
    fn test_disc_offsets() {
        assert_eq!(disc_offsets(1, 5, 5), vec![(0, 0)]);
        assert_eq!(disc_offsets(2, 5, 5).len(), 9);
        assert!(!disc_offsets(2, 5, 5).contains(&(0, 2)));
        // offsets never reach further than the grid
        assert_eq!(disc_offsets(10, 2, 3).len(), 3 * 5);
    }

    #[test]
    fn test_huge_radius_covers_whole_input() {
        let filter = ScanFilter::with_params(FilterParams::new(usize::MAX));
        let out = filter.temporal(&[1.0, 2.0, 3.0], FilterKind::Mean);
        assert_eq!(out, vec![2.0, 2.0, 2.0]);

        let image = array![[1.0, 2.0], [3.0, 6.0]];
        let out = filter.spatial(&image, FilterKind::Mean);
        assert!(out.iter().all(|&v| v == 3.0));
    }

    #[test]
    fn test_spatial_requires_raster_and_radius() {
        let mut curve = Scan::approach("c", array![1.0, 2.0], Metadata::new(), Metadata::new());
        let result = ScanFilter::new().apply_spatial(&mut curve, FilterKind::Mean);
        assert!(matches!(result, Err(SicmError::Transform(_))));

        let mut scan = Scan::raster(
            "t",
            RasterScan::new(array![[1.0]], 1.0, 1.0),
            Metadata::new(),
            Metadata::new(),
        );
        let zero = ScanFilter::with_params(FilterParams::new(0)).apply_spatial(&mut scan, FilterKind::Mean);
        assert!(matches!(zero, Err(SicmError::Transform(_))));
    }
}
