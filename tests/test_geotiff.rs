use driftnet::io::geotiff;
use gdal::Dataset;
use ndarray::{Array2, Array3, Axis};

mod common;

const GT: [f64; 6] = [500_000.0, 10.0, 0.0, 4_650_000.0, 0.0, -10.0];

#[test]
fn test_cube_roundtrip_preserves_grid_and_values() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cube.tif");

    let plane_a: Array2<u8> = Array2::from_shape_fn((5, 5), |(r, c)| (r * 5 + c) as u8);
    let plane_b: Array2<u8> = Array2::from_elem((5, 5), 42);
    common::write_u8_raster(&path, &[plane_a.clone(), plane_b.clone()], GT, 32633, Some(0.0));

    let dataset = Dataset::open(&path).unwrap();
    let grid = geotiff::read_grid(&dataset).unwrap();
    assert_eq!(grid.transform.to_gdal(), GT);
    assert_eq!((grid.width, grid.height), (5, 5));
    assert!(!grid.crs_wkt.is_empty());

    let cube = geotiff::read_cube_u8(&dataset).unwrap();
    assert_eq!(cube.dim(), (2, 5, 5));
    assert_eq!(cube.index_axis(Axis(0), 0), plane_a);
    assert_eq!(cube.index_axis(Axis(0), 1), plane_b);
}

#[test]
fn test_write_cube_rejects_wrong_grid() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("cube.tif");

    let dataset_grid = driftnet::GridDescriptor {
        crs_wkt: String::new(),
        transform: driftnet::GeoTransform::from_gdal(GT),
        width: 3, // cube below is 5x5
        height: 3,
    };
    let cube: Array3<u8> = Array3::zeros((1, 5, 5));

    let result = geotiff::write_cube_u8(
        &path,
        &cube,
        &dataset_grid,
        None,
        &geotiff::tiled_creation_options(),
    );
    assert!(result.is_err());
    assert!(!path.exists());
}

#[test]
fn test_retile_in_place_preserves_content() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("prediction.tif");

    let plane: Array2<u8> = Array2::from_shape_fn((8, 8), |(r, c)| ((r * 8 + c) % 251) as u8);
    common::write_u8_raster(&path, &[plane.clone()], GT, 32633, Some(0.0));

    geotiff::retile_in_place(&path).expect("retile failed");

    // No temp file remains and the original path still answers
    assert!(!dir.path().join("temp_prediction.tif").exists());
    let dataset = Dataset::open(&path).unwrap();
    assert_eq!(dataset.geo_transform().unwrap(), GT);

    let cube = geotiff::read_cube_u8(&dataset).unwrap();
    assert_eq!(cube.index_axis(Axis(0), 0), plane);
}
