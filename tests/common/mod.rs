//! Shared helpers for building synthetic rasters, archives and vector layers
#![allow(dead_code)]

use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{DriverManager, LayerOptions};
use ndarray::Array2;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a multi-band u8 GeoTIFF
pub fn write_u8_raster(
    path: &Path,
    planes: &[Array2<u8>],
    geo_transform: [f64; 6],
    epsg: u32,
    nodata: Option<f64>,
) {
    let (height, width) = planes[0].dim();
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type_with_options::<u8, _>(
            path,
            width as isize,
            height as isize,
            planes.len() as isize,
            &[RasterCreationOption {
                key: "COMPRESS",
                value: "DEFLATE",
            }],
        )
        .unwrap();

    dataset.set_geo_transform(&geo_transform).unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(epsg).unwrap())
        .unwrap();

    for (b, plane) in planes.iter().enumerate() {
        let flat: Vec<u8> = plane.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat);
        let mut band = dataset.rasterband((b + 1) as isize).unwrap();
        band.write((0, 0), (width, height), &buffer).unwrap();
        if let Some(value) = nodata {
            band.set_no_data_value(Some(value)).unwrap();
        }
    }
}

/// Write a single-band u16 GeoTIFF (synthetic reflectance band)
pub fn write_u16_band(path: &Path, plane: &Array2<u16>, geo_transform: [f64; 6], epsg: u32) {
    let (height, width) = plane.dim();
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut dataset = driver
        .create_with_band_type_with_options::<u16, _>(
            path,
            width as isize,
            height as isize,
            1,
            &[],
        )
        .unwrap();

    dataset.set_geo_transform(&geo_transform).unwrap();
    dataset
        .set_spatial_ref(&SpatialRef::from_epsg(epsg).unwrap())
        .unwrap();

    let flat: Vec<u16> = plane.iter().cloned().collect();
    let buffer = Buffer::new((width, height), flat);
    let mut band = dataset.rasterband(1).unwrap();
    band.write((0, 0), (width, height), &buffer).unwrap();
}

/// Metadata document in the delivery format
pub fn metadata_xml(tile_id: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<product>
  <TILE_ID metadataLevel="Brief">{}</TILE_ID>
</product>"#,
        tile_id
    )
}

/// Zip a set of already-written files into a scene archive
pub fn build_scene_zip(zip_path: &Path, entries: &[(String, Vec<u8>)]) {
    let file = std::fs::File::create(zip_path).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, bytes) in entries {
        writer.start_file(name.as_str(), options).unwrap();
        writer.write_all(bytes).unwrap();
    }

    writer.finish().unwrap();
}

/// Build a complete scene archive: u16 band rasters plus metadata.xml
pub fn build_scene_archive(
    dir: &Path,
    archive_name: &str,
    bands: &[(&str, Array2<u16>)],
    tile_id: Option<&str>,
) -> PathBuf {
    let staging = dir.join(format!("{}_staging", archive_name));
    std::fs::create_dir_all(&staging).unwrap();

    let geo_transform = [500_000.0, 10.0, 0.0, 4_650_000.0, 0.0, -10.0];
    let mut entries = Vec::new();
    for (name, plane) in bands {
        let band_path = staging.join(name);
        write_u16_band(&band_path, plane, geo_transform, 32633);
        entries.push((name.to_string(), std::fs::read(&band_path).unwrap()));
    }
    if let Some(tile_id) = tile_id {
        entries.push(("metadata.xml".to_string(), metadata_xml(tile_id).into_bytes()));
    }

    let zip_path = dir.join(format!("{}.zip", archive_name));
    build_scene_zip(&zip_path, &entries);
    std::fs::remove_dir_all(&staging).unwrap();
    zip_path
}

/// Write a single-polygon vector layer (GeoJSON) with the given spatial ref
pub fn write_polygon_layer(path: &Path, wkt: &str, srs: &SpatialRef) {
    let driver = DriverManager::get_driver_by_name("GeoJSON").unwrap();
    let mut dataset = driver.create_vector_only(path).unwrap();
    let mut layer = dataset
        .create_layer(LayerOptions {
            name: "land",
            srs: Some(srs),
            ..Default::default()
        })
        .unwrap();

    let geometry = Geometry::from_wkt(wkt).unwrap();
    layer.create_feature(geometry).unwrap();
}
