//! Builders for `.sicm` fixtures on disk

#![allow(dead_code)]

use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};

pub fn build_archive(members: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn write_archive(dir: &Path, file_name: &str, members: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(file_name);
    std::fs::write(&path, build_archive(members)).unwrap();
    path
}

pub fn samples_to_bytes(samples: &[u16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Raster container with `x_px` columns and `y_px` rows of row-major samples
pub fn write_raster(dir: &Path, file_name: &str, x_px: usize, y_px: usize, samples: &[u16]) -> PathBuf {
    let settings = format!(
        r#"{{"x-px": "{}", "y-px": "{}", "x-Size": "{}", "y-Size": "{}"}}"#,
        x_px, y_px, x_px, y_px
    );
    let payload = samples_to_bytes(samples);
    write_archive(
        dir,
        file_name,
        &[
            (".mode", b"backstepScan"),
            ("settings.json", settings.as_bytes()),
            ("data.info", br#"{"time": "12:00"}"#),
            ("data", &payload),
        ],
    )
}

pub fn write_approach(dir: &Path, file_name: &str, samples: &[u16]) -> PathBuf {
    let payload = samples_to_bytes(samples);
    write_archive(
        dir,
        file_name,
        &[
            (".mode", b"approach\n"),
            ("settings.json", br#"{"x-px": "1", "y-px": "1", "x-Size": "1", "y-Size": "1"}"#),
            ("data", &payload),
        ],
    )
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
