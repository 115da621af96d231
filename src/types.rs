use ndarray::{Array1, Array2, ArrayViewD, ArrayViewMutD};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Free-form JSON object carried alongside a scan (`settings.json`, `.info`)
pub type Metadata = Map<String, Value>;

/// Recording mode stored in the `.mode` member of a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanMode {
    /// One-dimensional probe descent trace
    Approach,
    /// Two-dimensional backstep raster
    BackstepScan,
}

impl ScanMode {
    /// Exact string written to the `.mode` member
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Approach => "approach",
            ScanMode::BackstepScan => "backstepScan",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ScanMode {
    type Err = SicmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "approach" => Ok(ScanMode::Approach),
            "backstepScan" => Ok(ScanMode::BackstepScan),
            other => Err(SicmError::Decode(format!("Unsupported scan mode: '{}'", other))),
        }
    }
}

/// Pixel counts and physical extent (µm) of a raster grid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterDimensions {
    pub x_px: usize,
    pub y_px: usize,
    pub x_size: f64,
    pub y_size: f64,
}

/// Integer pixel-index meshgrids of shape `(y_px, x_px)`
pub fn meshgrid(x_px: usize, y_px: usize) -> (Array2<f64>, Array2<f64>) {
    let x = Array2::from_shape_fn((y_px, x_px), |(_, j)| j as f64);
    let y = Array2::from_shape_fn((y_px, x_px), |(i, _)| i as f64);
    (x, y)
}

/// Probe descent trace: heights in µm against sample index
#[derive(Debug, Clone, PartialEq)]
pub struct ApproachCurve {
    pub x: Array1<f64>,
    pub z: Array1<f64>,
}

impl ApproachCurve {
    pub fn new(z: Array1<f64>) -> Self {
        let x = Array1::from_shape_fn(z.len(), |i| i as f64);
        Self { x, z }
    }

    /// Rebuild the implicit abscissa after `z` changed length
    pub fn update_dimensions(&mut self) {
        self.x = Array1::from_shape_fn(self.z.len(), |i| i as f64);
    }
}

/// Backstep raster: height grid (rows x columns) with derived coordinate grids
#[derive(Debug, Clone, PartialEq)]
pub struct RasterScan {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
    pub z: Array2<f64>,
    pub x_px: usize,
    pub y_px: usize,
    /// Physical width of the current grid in µm
    pub x_size: f64,
    /// Physical height of the current grid in µm
    pub y_size: f64,
    raw: RasterDimensions,
}

impl RasterScan {
    /// Build a raster from a height grid as recorded; the raw dimensions are
    /// fixed to the grid passed here.
    pub fn new(z: Array2<f64>, x_size: f64, y_size: f64) -> Self {
        let (y_px, x_px) = z.dim();
        let (x, y) = meshgrid(x_px, y_px);
        Self {
            x,
            y,
            z,
            x_px,
            y_px,
            x_size,
            y_size,
            raw: RasterDimensions { x_px, y_px, x_size, y_size },
        }
    }

    /// Re-read `z.shape`, reset the pixel counts and rebuild the meshgrids.
    /// Must follow any change of shape of `z`.
    pub fn update_dimensions(&mut self) {
        let (y_px, x_px) = self.z.dim();
        self.y_px = y_px;
        self.x_px = x_px;
        let (x, y) = meshgrid(x_px, y_px);
        self.x = x;
        self.y = y;
    }

    /// µm per pixel along x
    pub fn micron_to_pixel_factor_x(&self) -> f64 {
        self.x_size / self.x_px as f64
    }

    /// µm per pixel along y
    pub fn micron_to_pixel_factor_y(&self) -> f64 {
        self.y_size / self.y_px as f64
    }

    pub fn dimensions(&self) -> RasterDimensions {
        RasterDimensions {
            x_px: self.x_px,
            y_px: self.y_px,
            x_size: self.x_size,
            y_size: self.y_size,
        }
    }

    /// Dimensions as originally decoded; never altered by transforms
    pub fn raw_dimensions(&self) -> RasterDimensions {
        self.raw
    }

    /// `z`, `x` and `y` must all have shape `(y_px, x_px)`
    pub fn check_invariants(&self) -> SicmResult<()> {
        let expected = (self.y_px, self.x_px);
        if self.z.dim() != expected || self.x.dim() != expected || self.y.dim() != expected {
            return Err(SicmError::Transform(format!(
                "Inconsistent raster shapes: z {:?}, x {:?}, y {:?}, expected {:?}",
                self.z.dim(),
                self.x.dim(),
                self.y.dim(),
                expected
            )));
        }
        Ok(())
    }
}

/// The two recording shapes a scan can take
#[derive(Debug, Clone, PartialEq)]
pub enum ScanData {
    Approach(ApproachCurve),
    Raster(RasterScan),
}

/// Borrowed coordinate/height arrays of a scan
#[derive(Debug, Clone, Copy)]
pub enum DataView<'a> {
    Approach {
        x: &'a Array1<f64>,
        z: &'a Array1<f64>,
    },
    Raster {
        x: &'a Array2<f64>,
        y: &'a Array2<f64>,
        z: &'a Array2<f64>,
    },
}

/// A decoded SICM recording
#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    /// Name of the sample payload member inside the container
    pub name: String,
    /// Scan timing metadata from `<name>.info`
    pub info: Metadata,
    /// Contents of `settings.json`
    pub settings: Metadata,
    pub data: ScanData,
}

impl Scan {
    pub fn approach(name: impl Into<String>, z: Array1<f64>, info: Metadata, settings: Metadata) -> Self {
        Self {
            name: name.into(),
            info,
            settings,
            data: ScanData::Approach(ApproachCurve::new(z)),
        }
    }

    pub fn raster(name: impl Into<String>, raster: RasterScan, info: Metadata, settings: Metadata) -> Self {
        Self {
            name: name.into(),
            info,
            settings,
            data: ScanData::Raster(raster),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> ScanMode {
        match self.data {
            ScanData::Approach(_) => ScanMode::Approach,
            ScanData::Raster(_) => ScanMode::BackstepScan,
        }
    }

    /// `(x, z)` for an approach curve, `(x, y, z)` for a raster
    pub fn get_data(&self) -> DataView<'_> {
        match &self.data {
            ScanData::Approach(curve) => DataView::Approach { x: &curve.x, z: &curve.z },
            ScanData::Raster(raster) => DataView::Raster {
                x: &raster.x,
                y: &raster.y,
                z: &raster.z,
            },
        }
    }

    pub fn as_raster(&self) -> SicmResult<&RasterScan> {
        match &self.data {
            ScanData::Raster(raster) => Ok(raster),
            ScanData::Approach(_) => Err(SicmError::Transform(
                "Operation requires a backstep raster scan, got an approach curve".to_string(),
            )),
        }
    }

    pub fn as_raster_mut(&mut self) -> SicmResult<&mut RasterScan> {
        match &mut self.data {
            ScanData::Raster(raster) => Ok(raster),
            ScanData::Approach(_) => Err(SicmError::Transform(
                "Operation requires a backstep raster scan, got an approach curve".to_string(),
            )),
        }
    }

    pub fn as_approach(&self) -> SicmResult<&ApproachCurve> {
        match &self.data {
            ScanData::Approach(curve) => Ok(curve),
            ScanData::Raster(_) => Err(SicmError::Transform(
                "Operation requires an approach curve, got a raster scan".to_string(),
            )),
        }
    }

    /// Heights of either variant as a dynamic-dimensional view
    pub fn z_view(&self) -> ArrayViewD<'_, f64> {
        match &self.data {
            ScanData::Approach(curve) => curve.z.view().into_dyn(),
            ScanData::Raster(raster) => raster.z.view().into_dyn(),
        }
    }

    pub fn z_view_mut(&mut self) -> ArrayViewMutD<'_, f64> {
        match &mut self.data {
            ScanData::Approach(curve) => curve.z.view_mut().into_dyn(),
            ScanData::Raster(raster) => raster.z.view_mut().into_dyn(),
        }
    }

    /// Number of height samples
    pub fn z_len(&self) -> usize {
        self.z_view().len()
    }

    /// Heights in logical (row-major) order
    pub fn z_values(&self) -> impl Iterator<Item = f64> + '_ {
        let values: Box<dyn Iterator<Item = &f64> + '_> = match &self.data {
            ScanData::Approach(curve) => Box::new(curve.z.iter()),
            ScanData::Raster(raster) => Box::new(raster.z.iter()),
        };
        values.copied()
    }
}

/// Error types for SICM processing
#[derive(Debug, thiserror::Error)]
pub enum SicmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transform error: {0}")]
    Transform(String),

    #[error("Fit error: {0}")]
    Fit(String),

    #[error("Measurement error: {0}")]
    Measurement(String),

    #[error("State error: {0}")]
    State(String),
}

/// Result type for SICM operations
pub type SicmResult<T> = Result<T, SicmError>;
