mod common;

use approx::assert_abs_diff_eq;
use ndarray::array;
use sicmkit::io::{decode_bytes, SicmReader};
use sicmkit::types::{DataView, ScanMode, SicmError};
use tempfile::TempDir;

#[test]
fn test_decode_raster_fixture() {
    common::init_logging();
    let dir = TempDir::new().unwrap();
    let path = common::write_raster(dir.path(), "fixture.sicm", 2, 2, &[1, 2, 3, 4]);

    let reader = SicmReader::new(&path).expect("Failed to create reader");
    let files = reader.list_files().expect("Failed to list files");
    assert_eq!(files.len(), 4);

    let scan = reader.read_scan().expect("Failed to decode scan");
    assert_eq!(scan.mode(), ScanMode::BackstepScan);
    assert_eq!(scan.name(), "data");
    assert_eq!(scan.info["time"], "12:00");

    match scan.get_data() {
        DataView::Raster { x, y, z } => {
            let expected = array![[0.001, 0.002], [0.003, 0.004]];
            for (a, b) in z.iter().zip(expected.iter()) {
                assert_abs_diff_eq!(*a, *b, epsilon = 1e-12);
            }
            assert_eq!(x, &array![[0.0, 1.0], [0.0, 1.0]]);
            assert_eq!(y, &array![[0.0, 0.0], [1.0, 1.0]]);
        }
        DataView::Approach { .. } => panic!("Expected a raster scan"),
    }
}

#[test]
fn test_non_square_raster_is_row_major() {
    let dir = TempDir::new().unwrap();
    let path = common::write_raster(dir.path(), "wide.sicm", 3, 2, &[1000, 2000, 3000, 4000, 5000, 6000]);

    let scan = SicmReader::new(&path).unwrap().read_scan().unwrap();
    let raster = scan.as_raster().unwrap();
    assert_eq!(raster.z.dim(), (2, 3));
    assert_eq!((raster.x_px, raster.y_px), (3, 2));
    assert_abs_diff_eq!(raster.z[[1, 0]], 4.0, epsilon = 1e-12);
    assert!(raster.check_invariants().is_ok());
}

#[test]
fn test_decode_approach_curve() {
    let dir = TempDir::new().unwrap();
    let path = common::write_approach(dir.path(), "approach.sicm", &[500, 400, 300]);

    let scan = SicmReader::new(&path).unwrap().read_scan().unwrap();
    assert_eq!(scan.mode(), ScanMode::Approach);
    assert!(scan.info.is_empty());

    let curve = scan.as_approach().unwrap();
    assert_eq!(curve.x, array![0.0, 1.0, 2.0]);
    assert_abs_diff_eq!(curve.z[2], 0.3, epsilon = 1e-12);
}

#[test]
fn test_missing_mode_member() {
    let bytes = common::build_archive(&[
        ("settings.json", br#"{"x-px": "1", "y-px": "1"}"#),
        ("data", &[1, 0]),
    ]);
    assert!(matches!(decode_bytes(&bytes), Err(SicmError::Decode(_))));
}

#[test]
fn test_unknown_mode() {
    let bytes = common::build_archive(&[
        (".mode", b"lineScan"),
        ("settings.json", br#"{"x-px": "1", "y-px": "1"}"#),
        ("data", &[1, 0]),
    ]);
    assert!(matches!(decode_bytes(&bytes), Err(SicmError::Decode(_))));
}

#[test]
fn test_sample_count_mismatch() {
    let bytes = common::build_archive(&[
        (".mode", b"backstepScan"),
        ("settings.json", br#"{"x-px": "2", "y-px": "2"}"#),
        ("data", &[1, 0, 2, 0, 3, 0]),
    ]);
    assert!(matches!(decode_bytes(&bytes), Err(SicmError::Decode(_))));
}

#[test]
fn test_odd_payload_length() {
    let bytes = common::build_archive(&[
        (".mode", b"approach"),
        ("settings.json", b"{}"),
        ("data", &[1, 0, 2]),
    ]);
    assert!(matches!(decode_bytes(&bytes), Err(SicmError::Decode(_))));
}

#[test]
fn test_not_a_container() {
    assert!(matches!(decode_bytes(b"plain text"), Err(SicmError::Decode(_))));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = SicmReader::new(dir.path().join("absent.sicm"));
    assert!(matches!(result, Err(SicmError::Io(_))));
}
