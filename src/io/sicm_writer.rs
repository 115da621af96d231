use crate::io::sicm_reader::{INFO_EXTENSION, MODE_MEMBER, SETTINGS_MEMBER, Z_SCALE};
use crate::types::{Scan, ScanData, SicmResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Payload member name used when a scan carries none
const DEFAULT_PAYLOAD_NAME: &str = "data";

/// Writer producing `.sicm` containers from a scan snapshot
pub struct SicmWriter {
    compression: Compression,
}

impl SicmWriter {
    pub fn new() -> Self {
        Self {
            compression: Compression::default(),
        }
    }

    pub fn with_compression(compression: Compression) -> Self {
        Self { compression }
    }

    /// Write the scan to `path`, replacing any existing file
    pub fn write<P: AsRef<Path>>(&self, scan: &Scan, path: P) -> SicmResult<()> {
        let path = path.as_ref();
        log::info!("Exporting {} scan '{}' to {}", scan.mode(), scan.name(), path.display());

        let bytes = self.encode(scan)?;
        let mut file = File::create(path)?;
        file.write_all(&bytes)?;
        file.flush()?;

        log::info!("Export complete ({} bytes)", bytes.len());
        Ok(())
    }

    /// Encode the scan as an in-memory gzipped tarball
    pub fn encode(&self, scan: &Scan) -> SicmResult<Vec<u8>> {
        let payload_name = if scan.name().is_empty() {
            DEFAULT_PAYLOAD_NAME
        } else {
            scan.name()
        };

        let settings = serde_json::to_vec(&Value::Object(current_settings(scan)))?;
        let info = serde_json::to_vec(&Value::Object(scan.info.clone()))?;
        let payload = encode_payload(scan);

        let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), self.compression));
        append_member(&mut builder, MODE_MEMBER, scan.mode().as_str().as_bytes())?;
        append_member(&mut builder, SETTINGS_MEMBER, &settings)?;
        append_member(&mut builder, &format!("{}{}", payload_name, INFO_EXTENSION), &info)?;
        append_member(&mut builder, payload_name, &payload)?;

        let encoder = builder.into_inner()?;
        Ok(encoder.finish()?)
    }
}

impl Default for SicmWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Export a scan snapshot as a `.sicm` container
pub fn export_scan<P: AsRef<Path>>(scan: &Scan, path: P) -> SicmResult<()> {
    SicmWriter::new().write(scan, path)
}

fn append_member<W: Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) -> SicmResult<()> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    builder.append_data(&mut header, name, data)?;
    Ok(())
}

/// Source settings with the pixel counts and sizes of the current grid
fn current_settings(scan: &Scan) -> serde_json::Map<String, Value> {
    let mut settings = scan.settings.clone();
    if let ScanData::Raster(raster) = &scan.data {
        settings.insert("x-px".to_string(), Value::String(raster.x_px.to_string()));
        settings.insert("y-px".to_string(), Value::String(raster.y_px.to_string()));
        settings.insert("x-Size".to_string(), Value::String(raster.x_size.to_string()));
        settings.insert("y-Size".to_string(), Value::String(raster.y_size.to_string()));
    }
    settings
}

/// Heights (µm) back to little-endian u16 nm samples, row-major
fn encode_payload(scan: &Scan) -> Vec<u8> {
    let z = scan.z_view();
    let mut payload = Vec::with_capacity(z.len() * 2);
    let mut clamped = 0usize;

    for &value in z.iter() {
        let scaled = (value * Z_SCALE).round();
        let sample = if scaled.is_nan() {
            clamped += 1;
            0
        } else if scaled < 0.0 {
            clamped += 1;
            0
        } else if scaled > u16::MAX as f64 {
            clamped += 1;
            u16::MAX
        } else {
            scaled as u16
        };
        payload.extend_from_slice(&sample.to_le_bytes());
    }

    if clamped > 0 {
        log::warn!(
            "{} of {} samples were NaN or outside the u16 range and have been clamped",
            clamped,
            z.len()
        );
    }

    payload
}
