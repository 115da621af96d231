//! sicmkit: decoding, processing and measuring Scanning Ion Conductance
//! Microscopy recordings.
//!
//! `.sicm` containers are decoded into [`Scan`] values (approach curves or
//! backstep raster scans), manipulated through a per-dataset undo/redo
//! history in [`DataManager`], and measured for height and roughness.

pub mod types;
pub mod config;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod bindings;

// Re-export main types and functions for easier access
pub use types::{
    Scan, ScanData, ScanMode, RasterScan, ApproachCurve, DataView, Metadata,
    SicmError, SicmResult,
};

pub use config::ProcessingConfig;
pub use io::{SicmReader, SicmWriter};
pub use crate::core::{DataManager, Manipulation, UndoRedoRecord};
