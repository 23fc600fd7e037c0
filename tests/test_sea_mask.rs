use driftnet::types::DriftError;
use driftnet::SeaMasker;
use gdal::raster::GdalDataType;
use gdal::Dataset;
use ndarray::{array, Array2};

mod common;

const GT: [f64; 6] = [0.0, 10.0, 0.0, 20.0, 0.0, -10.0];

#[test]
fn test_mask_zeroes_land_in_every_band() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let raster_path = dir.path().join("scene.tif");
    let mask_path = dir.path().join("mask.tif");
    let output_path = dir.path().join("scene_SeaOnly.tif");

    // 3-band 2x2 raster of ones
    let ones: Array2<u8> = Array2::from_elem((2, 2), 1);
    common::write_u8_raster(
        &raster_path,
        &[ones.clone(), ones.clone(), ones],
        GT,
        32633,
        Some(0.0),
    );

    // Diagonal sea mask: 1 = keep, 0 = suppress
    let mask: Array2<u8> = array![[1, 0], [0, 1]];
    common::write_u8_raster(&mask_path, &[mask], GT, 32633, None);

    let masker = SeaMasker::new();
    masker
        .apply(&raster_path, &mask_path, &output_path)
        .expect("masking failed");

    let dataset = Dataset::open(&output_path).unwrap();
    // Band count, pixel type and georeferencing are untouched
    assert_eq!(dataset.raster_count(), 3);
    assert_eq!(dataset.rasterband(1).unwrap().band_type(), GdalDataType::UInt8);
    assert_eq!(dataset.geo_transform().unwrap(), GT);

    for b in 1..=3 {
        let data = dataset
            .rasterband(b)
            .unwrap()
            .read_as::<u8>((0, 0), (2, 2), (2, 2), None)
            .unwrap()
            .data;
        assert_eq!(data, vec![1, 0, 0, 1], "band {}", b);
    }
}

#[test]
fn test_masked_pixels_keep_original_values() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let raster_path = dir.path().join("scene.tif");
    let mask_path = dir.path().join("mask.tif");
    let output_path = dir.path().join("scene_SeaOnly.tif");

    let plane: Array2<u8> = array![[10, 20], [30, 40]];
    common::write_u8_raster(&raster_path, &[plane], GT, 32633, Some(0.0));

    let mask: Array2<u8> = array![[1, 1], [0, 1]];
    common::write_u8_raster(&mask_path, &[mask], GT, 32633, None);

    SeaMasker::new()
        .apply(&raster_path, &mask_path, &output_path)
        .expect("masking failed");

    let dataset = Dataset::open(&output_path).unwrap();
    let data = dataset
        .rasterband(1)
        .unwrap()
        .read_as::<u8>((0, 0), (2, 2), (2, 2), None)
        .unwrap()
        .data;
    assert_eq!(data, vec![10, 20, 0, 40]);
    // Nodata declaration carries over from the source
    assert_eq!(dataset.rasterband(1).unwrap().no_data_value(), Some(0.0));
}

#[test]
fn test_dimension_mismatch_writes_nothing() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let raster_path = dir.path().join("scene.tif");
    let mask_path = dir.path().join("mask.tif");
    let output_path = dir.path().join("scene_SeaOnly.tif");

    let plane: Array2<u8> = Array2::from_elem((4, 4), 9);
    common::write_u8_raster(&raster_path, &[plane], [0.0, 10.0, 0.0, 40.0, 0.0, -10.0], 32633, None);

    let mask: Array2<u8> = Array2::from_elem((2, 2), 1);
    common::write_u8_raster(&mask_path, &[mask], GT, 32633, None);

    match SeaMasker::new().apply(&raster_path, &mask_path, &output_path) {
        Err(DriftError::GridMismatch(_)) => {}
        other => panic!("expected GridMismatch, got {:?}", other.map(|_| ())),
    }

    // Failed precondition means no partial output on disk
    assert!(!output_path.exists());
}
