//! Processing defaults shared by every dataset

use crate::core::filter::{FilterKind, FilterParams};
use crate::core::interpolation::{InterpolationMethod, InterpolationParams};
use crate::core::leveling::{LevelingMethod, LevelingParams};
use crate::core::manipulation::Manipulation;
use crate::types::{SicmError, SicmResult};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

/// Default parameters for each operation family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    pub filter: FilterParams,
    pub leveling: LevelingParams,
    pub interpolation: InterpolationParams,
}

impl ProcessingConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> SicmResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        log::debug!("Loaded processing config from {}", path.display());
        Ok(config)
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, path: P) -> SicmResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn validate(&self) -> SicmResult<()> {
        self.filter.validate()?;
        self.leveling.validate()?;
        self.interpolation.validate()
    }

    /// Resolve an action name such as `"filter_spatial_mean"` or
    /// `"level_linewise"` into a manipulation using the configured
    /// parameters. Crop needs explicit corners and is not resolvable here.
    pub fn manipulation(&self, action_name: &str) -> SicmResult<Manipulation> {
        let manipulation = match action_name {
            "subtract_minimum" => Manipulation::SubtractMinimum,
            "transpose_z" => Manipulation::TransposeZ,
            "invert_z" => Manipulation::InvertZ,
            "height_difference" => Manipulation::HeightDifference,
            "level" => Manipulation::Level(self.leveling.clone()),
            "interpolate" => Manipulation::Interpolate(self.interpolation.clone()),
            name => {
                if let Some(kind) = name.strip_prefix("filter_temporal_") {
                    Manipulation::TemporalFilter {
                        kind: parse_filter_kind(kind)?,
                        params: self.filter.clone(),
                    }
                } else if let Some(kind) = name.strip_prefix("filter_spatial_") {
                    Manipulation::SpatialFilter {
                        kind: parse_filter_kind(kind)?,
                        params: self.filter.clone(),
                    }
                } else if let Some(method) = name.strip_prefix("level_") {
                    Manipulation::Level(LevelingParams {
                        method: LevelingMethod::from_str(method)?,
                        ..self.leveling.clone()
                    })
                } else if let Some(method) = name.strip_prefix("interpolate_") {
                    let method = match method {
                        "nearest" => InterpolationMethod::Nearest,
                        "cubic" => InterpolationMethod::Cubic,
                        other => {
                            return Err(SicmError::Transform(format!(
                                "Unknown interpolation method '{}'",
                                other
                            )))
                        }
                    };
                    Manipulation::Interpolate(InterpolationParams {
                        method,
                        ..self.interpolation.clone()
                    })
                } else {
                    return Err(SicmError::Transform(format!("Unknown operation '{}'", name)));
                }
            }
        };
        Ok(manipulation)
    }
}

fn parse_filter_kind(kind: &str) -> SicmResult<FilterKind> {
    match kind {
        "median" => Ok(FilterKind::Median),
        "mean" => Ok(FilterKind::Mean),
        other => Err(SicmError::Transform(format!("Unknown filter kind '{}'", other))),
    }
}
