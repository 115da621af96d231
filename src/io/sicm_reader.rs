use crate::types::{Metadata, RasterScan, Scan, ScanMode, SicmError, SicmResult};
use flate2::read::GzDecoder;
use ndarray::{Array1, Array2};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Member holding the recording mode
pub const MODE_MEMBER: &str = ".mode";
/// Member holding pixel counts and physical sizes
pub const SETTINGS_MEMBER: &str = "settings.json";
/// Extension of the scan timing metadata member
pub const INFO_EXTENSION: &str = ".info";
/// Raw samples are stored in nm; heights are kept in µm
pub const Z_SCALE: f64 = 1000.0;

/// Kind of archive member, decided from its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MemberKind {
    Mode,
    Settings,
    Info,
    Ignored,
    Payload,
}

fn classify_member(name: &str) -> MemberKind {
    let base = name.rsplit('/').next().unwrap_or(name);
    if base == MODE_MEMBER {
        MemberKind::Mode
    } else if base == SETTINGS_MEMBER {
        MemberKind::Settings
    } else if base.ends_with(INFO_EXTENSION) {
        MemberKind::Info
    } else if base.ends_with(".json") || base.ends_with(MODE_MEMBER) {
        MemberKind::Ignored
    } else {
        MemberKind::Payload
    }
}

/// Reader for `.sicm` containers (gzipped tar archives)
pub struct SicmReader {
    path: PathBuf,
}

impl SicmReader {
    /// Create a reader for a container on disk
    pub fn new<P: AsRef<Path>>(path: P) -> SicmResult<Self> {
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(SicmError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("File not found: {}", path.display()),
            )));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// List all regular members of the archive
    pub fn list_files(&self) -> SicmResult<Vec<String>> {
        let file = File::open(&self.path)?;
        Ok(read_members(file)?.into_keys().collect())
    }

    /// Decode the container into a scan
    pub fn read_scan(&self) -> SicmResult<Scan> {
        log::info!("Reading SICM container: {}", self.path.display());
        let file = File::open(&self.path)?;
        let members = read_members(file)?;
        decode_members(members)
    }
}

/// Decode an in-memory `.sicm` container
pub fn decode_bytes(bytes: &[u8]) -> SicmResult<Scan> {
    let members = read_members(bytes)?;
    decode_members(members)
}

/// Unpack every regular file of a gzipped tarball into memory
fn read_members<R: Read>(reader: R) -> SicmResult<BTreeMap<String, Vec<u8>>> {
    let mut archive = tar::Archive::new(GzDecoder::new(reader));
    let entries = archive
        .entries()
        .map_err(|e| SicmError::Decode(format!("Not a gzipped tar archive: {}", e)))?;

    let mut members = BTreeMap::new();
    for entry in entries {
        let mut entry =
            entry.map_err(|e| SicmError::Decode(format!("Not a gzipped tar archive: {}", e)))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry
            .path()
            .map_err(|e| SicmError::Decode(format!("Invalid member name: {}", e)))?
            .to_string_lossy()
            .trim_start_matches("./")
            .to_string();

        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| SicmError::Decode(format!("Failed to read member {}: {}", name, e)))?;

        log::debug!("Archive member {} ({} bytes)", name, data.len());
        members.insert(name, data);
    }

    if members.is_empty() {
        return Err(SicmError::Decode("Archive contains no members".to_string()));
    }

    Ok(members)
}

fn parse_json_object(name: &str, bytes: &[u8]) -> SicmResult<Metadata> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| SicmError::Decode(format!("Failed to parse {}: {}", name, e)))?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SicmError::Decode(format!("{} is not a JSON object", name))),
    }
}

/// Settings values are usually strings ("128") but plain numbers are accepted
fn setting_number(settings: &Metadata, key: &str) -> Option<f64> {
    let number = match settings.get(key)? {
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    };
    number.filter(|v| v.is_finite())
}

fn setting_pixels(settings: &Metadata, key: &str) -> SicmResult<usize> {
    match setting_number(settings, key) {
        Some(v) if v >= 1.0 && v.fract() == 0.0 => Ok(v as usize),
        Some(v) => Err(SicmError::Decode(format!(
            "Setting {} must be a positive integer, got {}",
            key, v
        ))),
        None => Err(SicmError::Decode(format!("Missing or invalid setting {}", key))),
    }
}

fn setting_size(settings: &Metadata, key: &str, pixels: usize) -> f64 {
    match setting_number(settings, key) {
        Some(v) if v > 0.0 => v,
        _ => {
            log::warn!("Setting {} absent or not a positive number, using pixel count {}", key, pixels);
            pixels as f64
        }
    }
}

fn decode_samples(bytes: &[u8]) -> SicmResult<Vec<f64>> {
    if bytes.len() % 2 != 0 {
        return Err(SicmError::Decode(format!(
            "Payload length {} is not a multiple of 2",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]) as f64 / Z_SCALE)
        .collect())
}

fn decode_members(members: BTreeMap<String, Vec<u8>>) -> SicmResult<Scan> {
    let mut mode_bytes = None;
    let mut settings_bytes = None;
    let mut info_member = None;
    let mut payloads = Vec::new();

    for (name, data) in &members {
        match classify_member(name) {
            MemberKind::Mode => mode_bytes = Some(data),
            MemberKind::Settings => settings_bytes = Some(data),
            MemberKind::Info => info_member = Some((name, data)),
            MemberKind::Ignored => log::debug!("Ignoring archive member {}", name),
            MemberKind::Payload => payloads.push((name, data)),
        }
    }

    let mode_bytes = mode_bytes
        .ok_or_else(|| SicmError::Decode(format!("Missing {} member", MODE_MEMBER)))?;
    let mode_text = std::str::from_utf8(mode_bytes)
        .map_err(|e| SicmError::Decode(format!("{} is not UTF-8: {}", MODE_MEMBER, e)))?;
    let mode: ScanMode = mode_text.lines().next().unwrap_or("").parse()?;

    let settings_bytes = settings_bytes
        .ok_or_else(|| SicmError::Decode(format!("Missing {} member", SETTINGS_MEMBER)))?;
    let settings = parse_json_object(SETTINGS_MEMBER, settings_bytes)?;

    let info = match info_member {
        Some((name, data)) => parse_json_object(name, data)?,
        None => {
            log::warn!("Container has no {} member, scan info left empty", INFO_EXTENSION);
            Metadata::new()
        }
    };

    let (payload_name, payload) = match payloads.as_slice() {
        [single] => *single,
        [] => return Err(SicmError::Decode("Missing sample payload member".to_string())),
        many => {
            let names: Vec<&str> = many.iter().map(|(name, _)| name.as_str()).collect();
            return Err(SicmError::Decode(format!(
                "Ambiguous sample payload, candidates: {:?}",
                names
            )));
        }
    };
    let name = payload_name.rsplit('/').next().unwrap_or(payload_name).to_string();

    let samples = decode_samples(payload)?;
    log::debug!("Decoded {} samples from {} ({} mode)", samples.len(), name, mode);

    let scan = match mode {
        ScanMode::Approach => Scan::approach(name, Array1::from(samples), info, settings),
        ScanMode::BackstepScan => {
            let x_px = setting_pixels(&settings, "x-px")?;
            let y_px = setting_pixels(&settings, "y-px")?;
            if samples.len() != x_px * y_px {
                return Err(SicmError::Decode(format!(
                    "Payload holds {} samples, settings declare {}x{} = {}",
                    samples.len(),
                    x_px,
                    y_px,
                    x_px * y_px
                )));
            }

            let z = Array2::from_shape_vec((y_px, x_px), samples)
                .map_err(|e| SicmError::Decode(format!("Failed to shape payload: {}", e)))?;
            let x_size = setting_size(&settings, "x-Size", x_px);
            let y_size = setting_size(&settings, "y-Size", y_px);

            Scan::raster(name, RasterScan::new(z, x_size, y_size), info, settings)
        }
    };

    log::info!("Decoded {} scan '{}' with {} samples", scan.mode(), scan.name, scan.z_len());
    Ok(scan)
}
