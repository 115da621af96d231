//! Core SICM processing modules

pub mod statistics;
pub mod fitting;
pub mod transform;
pub mod filter;
pub mod leveling;
pub mod interpolation;
pub mod measurement;
pub mod manipulation;
pub mod data_manager;

// Re-export main types
pub use transform::CropParams;
pub use filter::{ScanFilter, FilterParams, FilterKind};
pub use fitting::{SurfaceModel, FitResult, fit_surface};
pub use leveling::{Leveler, LevelingParams, LevelingMethod};
pub use interpolation::{Interpolator, InterpolationParams, InterpolationMethod};
pub use measurement::{RoughnessResult, RowParameter, SurfaceStatistics, LineProfile};
pub use manipulation::Manipulation;
pub use data_manager::{DataManager, UndoRedoRecord, ImportReport};
