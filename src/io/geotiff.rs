use crate::types::{BandCube, DriftError, DriftResult, GeoTransform, GridDescriptor};
use gdal::raster::{Buffer, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3, Axis};
use std::path::{Path, PathBuf};

/// Creation profile for merged/masked rasters and reprojected mosaic tiles
pub fn tiled_creation_options() -> Vec<RasterCreationOption<'static>> {
    vec![
        RasterCreationOption {
            key: "TILED",
            value: "YES",
        },
        RasterCreationOption {
            key: "COMPRESS",
            value: "DEFLATE",
        },
        RasterCreationOption {
            key: "BIGTIFF",
            value: "YES",
        },
    ]
}

/// Creation profile for the final mosaic output
pub fn mosaic_creation_options() -> Vec<RasterCreationOption<'static>> {
    vec![
        RasterCreationOption {
            key: "TILED",
            value: "YES",
        },
        RasterCreationOption {
            key: "COMPRESS",
            value: "DEFLATE",
        },
        RasterCreationOption {
            key: "PREDICTOR",
            value: "2",
        },
        RasterCreationOption {
            key: "BIGTIFF",
            value: "YES",
        },
        RasterCreationOption {
            key: "COPY_SRC_OVERVIEWS",
            value: "YES",
        },
    ]
}

/// Creation profile used when normalizing inference outputs in place
fn retile_options() -> Vec<RasterCreationOption<'static>> {
    vec![
        RasterCreationOption {
            key: "TILED",
            value: "YES",
        },
        RasterCreationOption {
            key: "COPY_SRC_OVERVIEWS",
            value: "YES",
        },
    ]
}

/// Read the spatial grid of an open dataset
pub fn read_grid(dataset: &Dataset) -> DriftResult<GridDescriptor> {
    let geo_transform = dataset.geo_transform()?;
    let (width, height) = dataset.raster_size();
    let crs_wkt = dataset
        .spatial_ref()
        .and_then(|sr| sr.to_wkt())
        .unwrap_or_default();

    Ok(GridDescriptor {
        crs_wkt,
        transform: GeoTransform::from_gdal(geo_transform),
        width,
        height,
    })
}

/// Read one band (1-based index) as an 8-bit plane
pub fn read_band_u8(dataset: &Dataset, band_index: isize) -> DriftResult<Array2<u8>> {
    let (width, height) = dataset.raster_size();
    let rasterband = dataset.rasterband(band_index)?;
    let band_data = rasterband.read_as::<u8>((0, 0), (width, height), (width, height), None)?;

    Array2::from_shape_vec((height, width), band_data.data)
        .map_err(|e| DriftError::Reprojection(format!("Failed to reshape band data: {}", e)))
}

/// Read all bands of an 8-bit raster as a (band, row, column) cube
pub fn read_cube_u8(dataset: &Dataset) -> DriftResult<BandCube> {
    let (width, height) = dataset.raster_size();
    let band_count = dataset.raster_count() as usize;

    let mut cube = Array3::zeros((band_count, height, width));
    for b in 0..band_count {
        let plane = read_band_u8(dataset, (b + 1) as isize)?;
        cube.index_axis_mut(Axis(0), b).assign(&plane);
    }

    Ok(cube)
}

/// Write a (band, row, column) cube as a GeoTIFF on the given grid.
///
/// Every band receives the same nodata declaration when one is supplied.
pub fn write_cube_u8<P: AsRef<Path>>(
    output_path: P,
    cube: &BandCube,
    grid: &GridDescriptor,
    nodata: Option<f64>,
    options: &[RasterCreationOption],
) -> DriftResult<()> {
    let (band_count, height, width) = cube.dim();
    if width != grid.width || height != grid.height {
        return Err(DriftError::GridMismatch(format!(
            "cube is {}x{} but grid is {}x{}",
            width, height, grid.width, grid.height
        )));
    }

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let mut dataset = driver.create_with_band_type_with_options::<u8, _>(
        output_path.as_ref(),
        width as isize,
        height as isize,
        band_count as isize,
        options,
    )?;

    dataset.set_geo_transform(&grid.transform.to_gdal())?;
    if !grid.crs_wkt.is_empty() {
        dataset.set_spatial_ref(&SpatialRef::from_wkt(&grid.crs_wkt)?)?;
    }

    for b in 0..band_count {
        let flat_data: Vec<u8> = cube.index_axis(Axis(0), b).iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_data);
        let mut rasterband = dataset.rasterband((b + 1) as isize)?;
        rasterband.write((0, 0), (width, height), &buffer)?;
        if let Some(value) = nodata {
            rasterband.set_no_data_value(Some(value))?;
        }
    }

    Ok(())
}

/// Rewrite a raster in place as a tiled GeoTIFF, keeping source overviews.
///
/// The copy lands in a sibling temp file that replaces the original only once
/// it is fully written; on failure the temp file is removed and the original
/// is left untouched.
pub fn retile_in_place<P: AsRef<Path>>(path: P) -> DriftResult<PathBuf> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| {
            DriftError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not a file path: {}", path.display()),
            ))
        })?
        .to_string_lossy()
        .to_string();
    let temp_path = path.with_file_name(format!("temp_{}", file_name));

    log::info!("Normalizing raster layout: {}", path.display());

    let dataset = Dataset::open(path)?;
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    match dataset.create_copy(&driver, &temp_path, &retile_options()) {
        Ok(copy) => {
            drop(copy);
            drop(dataset);
            std::fs::rename(&temp_path, path)?;
            Ok(path.to_path_buf())
        }
        Err(e) => {
            if temp_path.exists() {
                let _ = std::fs::remove_file(&temp_path);
            }
            Err(DriftError::Gdal(e))
        }
    }
}
