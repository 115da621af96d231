use crate::core::filter::{FilterKind, FilterParams, ScanFilter};
use crate::core::interpolation::{InterpolationParams, Interpolator};
use crate::core::leveling::{Leveler, LevelingParams};
use crate::core::transform::{self, CropParams};
use crate::types::{Scan, SicmResult};
use serde::{Deserialize, Serialize};

/// A scan transformation together with its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum Manipulation {
    SubtractMinimum,
    TransposeZ,
    InvertZ,
    HeightDifference,
    Crop(CropParams),
    TemporalFilter { kind: FilterKind, params: FilterParams },
    SpatialFilter { kind: FilterKind, params: FilterParams },
    Level(LevelingParams),
    Interpolate(InterpolationParams),
}

impl Manipulation {
    /// Name recorded in the undo history
    pub fn action_name(&self) -> String {
        match self {
            Manipulation::SubtractMinimum => "subtract_minimum".to_string(),
            Manipulation::TransposeZ => "transpose_z".to_string(),
            Manipulation::InvertZ => "invert_z".to_string(),
            Manipulation::HeightDifference => "height_difference".to_string(),
            Manipulation::Crop(_) => "crop".to_string(),
            Manipulation::TemporalFilter { kind, .. } => format!("filter_temporal_{}", kind.as_str()),
            Manipulation::SpatialFilter { kind, .. } => format!("filter_spatial_{}", kind.as_str()),
            Manipulation::Level(params) => format!("level_{}", params.method.as_str()),
            Manipulation::Interpolate(params) => format!("interpolate_{}", params.method.as_str()),
        }
    }

    /// Apply to `scan` in place; on error the scan is left as it was
    pub fn apply(&self, scan: &mut Scan) -> SicmResult<()> {
        match self {
            Manipulation::SubtractMinimum => transform::subtract_minimum(scan),
            Manipulation::TransposeZ => transform::transpose_z(scan),
            Manipulation::InvertZ => transform::invert_z(scan),
            Manipulation::HeightDifference => transform::height_difference(scan),
            Manipulation::Crop(params) => transform::crop(scan, params),
            Manipulation::TemporalFilter { kind, params } => {
                ScanFilter::with_params(params.clone()).apply_temporal(scan, *kind)
            }
            Manipulation::SpatialFilter { kind, params } => {
                ScanFilter::with_params(params.clone()).apply_spatial(scan, *kind)
            }
            Manipulation::Level(params) => Leveler::new(params.clone()).apply(scan),
            Manipulation::Interpolate(params) => Interpolator::new(params.clone()).apply(scan),
        }
    }
}
