//! I/O modules for reading and writing `.sicm` containers

pub mod sicm_reader;
pub mod sicm_writer;

pub use sicm_reader::{decode_bytes, SicmReader};
pub use sicm_writer::{export_scan, SicmWriter};
