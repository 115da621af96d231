use crate::core::statistics::nan_min;
use crate::types::{Scan, ScanData, SicmError, SicmResult};
use ndarray::{s, Array2, ArrayViewMut1};
use serde::{Deserialize, Serialize};

/// Crop rectangle given by two corner points `(x, y)` on the pixel grid.
/// The rectangle spans `[min, min + |Δ|)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropParams {
    pub p1: (usize, usize),
    pub p2: (usize, usize),
}

impl CropParams {
    pub fn new(p1: (usize, usize), p2: (usize, usize)) -> Self {
        Self { p1, p2 }
    }

    /// Normalised `(ox, oy, width, height)`
    pub fn rectangle(&self) -> (usize, usize, usize, usize) {
        let ox = self.p1.0.min(self.p2.0);
        let oy = self.p1.1.min(self.p2.1);
        let width = self.p1.0.abs_diff(self.p2.0);
        let height = self.p1.1.abs_diff(self.p2.1);
        (ox, oy, width, height)
    }
}

pub(crate) fn ensure_not_empty(scan: &Scan) -> SicmResult<()> {
    if scan.z_len() == 0 {
        return Err(SicmError::Transform("Scan contains no height samples".to_string()));
    }
    Ok(())
}

/// `z := z - min(z)`; NaN samples are ignored when searching the minimum
pub fn subtract_minimum(scan: &mut Scan) -> SicmResult<()> {
    ensure_not_empty(scan)?;
    let minimum = nan_min(scan.z_view().iter().copied())
        .ok_or_else(|| SicmError::Transform("Scan contains only NaN samples".to_string()))?;

    log::debug!("Subtracting minimum {:.6} µm", minimum);
    scan.z_view_mut().mapv_inplace(|v| v - minimum);
    Ok(())
}

/// `z := -z`
pub fn invert_z(scan: &mut Scan) -> SicmResult<()> {
    ensure_not_empty(scan)?;
    scan.z_view_mut().mapv_inplace(|v| -v);
    Ok(())
}

/// `z := zᵀ`; pixel counts, grids and physical sizes follow the new orientation
pub fn transpose_z(scan: &mut Scan) -> SicmResult<()> {
    ensure_not_empty(scan)?;
    let raster = scan.as_raster_mut()?;

    raster.z = raster.z.t().as_standard_layout().into_owned();
    std::mem::swap(&mut raster.x_size, &mut raster.y_size);
    raster.update_dimensions();

    log::debug!("Transposed z to {}x{}", raster.y_px, raster.x_px);
    Ok(())
}

fn difference_to_right(mut line: ArrayViewMut1<f64>) {
    let n = line.len();
    if n == 0 {
        return;
    }
    for j in 0..n - 1 {
        let right = line[j + 1];
        line[j] -= right;
    }
    line[n - 1] = 0.0;
}

/// `z[i, j] := z[i, j] - z[i, j + 1]` per scan line; the last column becomes 0.
/// An approach curve is treated as a single scan line.
pub fn height_difference(scan: &mut Scan) -> SicmResult<()> {
    ensure_not_empty(scan)?;
    match &mut scan.data {
        ScanData::Approach(curve) => difference_to_right(curve.z.view_mut()),
        ScanData::Raster(raster) => {
            for row in raster.z.rows_mut() {
                difference_to_right(row);
            }
        }
    }
    Ok(())
}

/// Keep `z[oy..oy + h, ox..ox + w]`; physical sizes shrink with the grid
pub fn crop(scan: &mut Scan, params: &CropParams) -> SicmResult<()> {
    ensure_not_empty(scan)?;
    let raster = scan.as_raster_mut()?;
    let (ox, oy, width, height) = params.rectangle();

    if width == 0 || height == 0 {
        return Err(SicmError::Transform(format!(
            "Crop rectangle between {:?} and {:?} has zero area",
            params.p1, params.p2
        )));
    }
    if ox + width > raster.x_px || oy + height > raster.y_px {
        return Err(SicmError::Transform(format!(
            "Crop rectangle {}x{} at ({}, {}) exceeds the {}x{} grid",
            width, height, ox, oy, raster.x_px, raster.y_px
        )));
    }

    let cropped: Array2<f64> = raster.z.slice(s![oy..oy + height, ox..ox + width]).to_owned();
    raster.x_size *= width as f64 / raster.x_px as f64;
    raster.y_size *= height as f64 / raster.y_px as f64;
    raster.z = cropped;
    raster.update_dimensions();

    log::info!("Cropped scan to {}x{} at ({}, {})", width, height, ox, oy);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Metadata, RasterScan};
    use ndarray::array;

    fn raster(z: Array2<f64>) -> Scan {
        let (rows, cols) = z.dim();
        Scan::raster(
            "test",
            RasterScan::new(z, cols as f64, rows as f64),
            Metadata::new(),
            Metadata::new(),
        )
    }

    #[test]
    fn test_subtract_minimum() {
        let mut scan = raster(array![[3.0, 5.0], [2.0, 7.0]]);
        subtract_minimum(&mut scan).unwrap();
        assert_eq!(scan.as_raster().unwrap().z, array![[1.0, 3.0], [0.0, 5.0]]);

        let before = scan.clone();
        subtract_minimum(&mut scan).unwrap();
        assert_eq!(scan, before);
    }

    #[test]
    fn test_subtract_minimum_skips_nan() {
        let mut scan = Scan::approach("c", array![f64::NAN, 4.0, 2.0], Metadata::new(), Metadata::new());
        subtract_minimum(&mut scan).unwrap();
        let z = &scan.as_approach().unwrap().z;
        assert!(z[0].is_nan());
        assert_eq!(z[1], 2.0);
        assert_eq!(z[2], 0.0);
    }

    #[test]
    fn test_transpose_and_crop() {
        let mut scan = raster(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        transpose_z(&mut scan).unwrap();
        {
            let r = scan.as_raster().unwrap();
            assert_eq!(r.z, array![[1.0, 4.0], [2.0, 5.0], [3.0, 6.0]]);
            assert_eq!((r.y_px, r.x_px), (3, 2));
            assert!(r.check_invariants().is_ok());
        }

        crop(&mut scan, &CropParams::new((0, 0), (1, 2))).unwrap();
        let r = scan.as_raster().unwrap();
        assert_eq!(r.z, array![[1.0], [2.0]]);
        assert_eq!((r.y_px, r.x_px), (2, 1));
        assert!(r.check_invariants().is_ok());
    }

    #[test]
    fn test_transpose_twice_is_identity() {
        let original = raster(array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let mut scan = original.clone();
        transpose_z(&mut scan).unwrap();
        transpose_z(&mut scan).unwrap();
        assert_eq!(scan.as_raster().unwrap().z, original.as_raster().unwrap().z);
    }

    #[test]
    fn test_crop_rejections() {
        let mut scan = raster(Array2::zeros((3, 3)));
        let before = scan.clone();

        let zero_area = crop(&mut scan, &CropParams::new((1, 1), (1, 1)));
        assert!(matches!(zero_area, Err(SicmError::Transform(_))));

        let outside = crop(&mut scan, &CropParams::new((1, 1), (5, 2)));
        assert!(matches!(outside, Err(SicmError::Transform(_))));
        assert_eq!(scan, before);
    }

    #[test]
    fn test_crop_scales_physical_size() {
        let mut scan = raster(Array2::zeros((4, 8)));
        crop(&mut scan, &CropParams::new((6, 3), (2, 1))).unwrap();
        let r = scan.as_raster().unwrap();
        assert_eq!((r.x_px, r.y_px), (4, 2));
        assert_eq!((r.x_size, r.y_size), (4.0, 2.0));
        assert_eq!(r.raw_dimensions().x_px, 8);
    }

    #[test]
    fn test_transpose_requires_raster() {
        let mut scan = Scan::approach("c", array![1.0, 2.0], Metadata::new(), Metadata::new());
        assert!(matches!(transpose_z(&mut scan), Err(SicmError::Transform(_))));
    }

    #[test]
    fn test_height_difference_and_invert() {
        let mut scan = raster(array![[1.0, 4.0, 9.0], [2.0, 2.0, 5.0]]);
        height_difference(&mut scan).unwrap();
        assert_eq!(
            scan.as_raster().unwrap().z,
            array![[-3.0, -5.0, 0.0], [0.0, -3.0, 0.0]]
        );

        invert_z(&mut scan).unwrap();
        assert_eq!(
            scan.as_raster().unwrap().z,
            array![[3.0, 5.0, -0.0], [-0.0, 3.0, -0.0]]
        );
    }

    #[test]
    fn test_empty_scan_rejected() {
        let mut scan = Scan::approach("c", ndarray::Array1::zeros(0), Metadata::new(), Metadata::new());
        assert!(matches!(subtract_minimum(&mut scan), Err(SicmError::Transform(_))));
        assert!(matches!(invert_z(&mut scan), Err(SicmError::Transform(_))));
    }
}
