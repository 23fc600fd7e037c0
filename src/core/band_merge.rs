use crate::io::archive::{self, SceneArchive};
use crate::io::geotiff;
use crate::types::{BandCube, DriftError, DriftResult, GridDescriptor, NODATA_BYTE, REFLECTANCE_MAX};
use gdal::Dataset;
use ndarray::{Array3, Axis};
use std::path::{Path, PathBuf};

/// Merges a zipped per-scene band delivery into one analysis-ready raster.
///
/// Bands are stacked in lexicographic filename order, rescaled from
/// reflectance [0, 10000] to [0, 255] and written as a tiled, compressed
/// 8-bit GeoTIFF named after the scene's tile identifier. The source archive
/// and extraction directory are removed only after the output is fully
/// written; any failure leaves them on disk for inspection or retry.
pub struct BandMerger;

impl BandMerger {
    pub fn new() -> Self {
        Self
    }

    /// Process one scene archive; returns the merged output path
    pub fn merge_archive<P: AsRef<Path>>(&self, zip_path: P) -> DriftResult<PathBuf> {
        let zip_path = zip_path.as_ref();
        log::info!("Merging scene archive: {}", zip_path.display());

        let archive = SceneArchive::new(zip_path)?;
        let extract_dir = archive.extract()?;

        let band_paths = archive::band_files(&extract_dir)?;
        log::debug!("Found {} band raster(s)", band_paths.len());

        let metadata_path = archive::metadata_file(&extract_dir)?;
        let tile_id = archive::read_tile_id(&metadata_path)?;
        log::debug!("Tile identity: {}", tile_id);

        let (cube, grid) = stack_bands(&band_paths)?;

        let output_dir = zip_path.parent().unwrap_or_else(|| Path::new("."));
        let output_path = output_dir.join(format!("{}.tif", tile_id));

        geotiff::write_cube_u8(
            &output_path,
            &cube,
            &grid,
            Some(NODATA_BYTE as f64),
            &geotiff::tiled_creation_options(),
        )?;

        // Destructive cleanup happens only on the success path
        std::fs::remove_dir_all(&extract_dir)?;
        std::fs::remove_file(zip_path)?;

        log::info!("Merged {} band(s) into {}", cube.dim().0, output_path.display());
        Ok(output_path)
    }
}

impl Default for BandMerger {
    fn default() -> Self {
        Self::new()
    }
}

/// Stack sorted single-band rasters into a rescaled (band, row, column) cube.
///
/// All bands must share one grid; the first band defines it.
fn stack_bands(band_paths: &[PathBuf]) -> DriftResult<(BandCube, GridDescriptor)> {
    let first = Dataset::open(&band_paths[0])?;
    let grid = geotiff::read_grid(&first)?;
    drop(first);

    let mut cube = Array3::zeros((band_paths.len(), grid.height, grid.width));

    for (b, path) in band_paths.iter().enumerate() {
        let dataset = Dataset::open(path)?;
        let band_grid = geotiff::read_grid(&dataset)?;
        if !band_grid.is_congruent_with(&grid) {
            return Err(DriftError::GridMismatch(format!(
                "band {} does not share the scene grid",
                path.display()
            )));
        }

        let (width, height) = dataset.raster_size();
        let rasterband = dataset.rasterband(1)?;
        let band_data =
            rasterband.read_as::<u16>((0, 0), (width, height), (width, height), None)?;

        let rescaled: Vec<u8> = band_data.data.iter().map(|&v| rescale_to_byte(v)).collect();
        let plane = ndarray::Array2::from_shape_vec((height, width), rescaled)
            .map_err(|e| DriftError::Reprojection(format!("Failed to reshape band: {}", e)))?;
        cube.index_axis_mut(Axis(0), b).assign(&plane);
    }

    Ok((cube, grid))
}

/// Rescale one reflectance sample to 8 bit.
///
/// 0 is the nodata sentinel on both sides and passes through untouched;
/// everything else maps [0, 10000] -> [0, 255] with saturation above 10000.
pub fn rescale_to_byte(value: u16) -> u8 {
    if value == 0 {
        return NODATA_BYTE;
    }
    let scaled = (value as f64 * 255.0 / REFLECTANCE_MAX as f64).round();
    scaled.clamp(0.0, 255.0) as u8
}
