use crate::io::geotiff;
use crate::types::{BandImage, DriftError, DriftResult, GridDescriptor};
use gdal::raster::{Buffer, GdalDataType, GdalType};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use num_traits::Zero;
use std::path::{Path, PathBuf};

/// Suppresses land pixels in a raster using a congruent binary mask.
///
/// Mask semantics: 1 = retained (sea), 0 = excluded (land). For every pixel
/// where the mask is 0 every band is set to 0; pixels where the mask is 1 are
/// copied unchanged. Band count, pixel type and georeferencing carry over to
/// the output untouched.
pub struct SeaMasker;

impl SeaMasker {
    pub fn new() -> Self {
        Self
    }

    /// Mask all bands of `raster_path` with `mask_path`, writing `output_path`.
    ///
    /// Fails with a grid mismatch before anything is written when the spatial
    /// dimensions disagree.
    pub fn apply<P: AsRef<Path>, Q: AsRef<Path>, R: AsRef<Path>>(
        &self,
        raster_path: P,
        mask_path: Q,
        output_path: R,
    ) -> DriftResult<PathBuf> {
        let raster_path = raster_path.as_ref();
        let output_path = output_path.as_ref();

        let source = Dataset::open(raster_path)?;
        let source_grid = geotiff::read_grid(&source)?;

        let mask_dataset = Dataset::open(mask_path.as_ref())?;
        let mask_grid = geotiff::read_grid(&mask_dataset)?;

        if !source_grid.same_dimensions(&mask_grid) {
            return Err(DriftError::GridMismatch(format!(
                "raster is {}x{} but mask is {}x{}",
                source_grid.width, source_grid.height, mask_grid.width, mask_grid.height
            )));
        }

        let mask = geotiff::read_band_u8(&mask_dataset, 1)?;
        let band_type = source.rasterband(1)?.band_type();

        log::info!(
            "Masking {} ({} band(s), {:?})",
            raster_path.display(),
            source.raster_count(),
            band_type
        );

        match band_type {
            GdalDataType::UInt8 => self.apply_typed::<u8>(&source, &source_grid, &mask, output_path),
            GdalDataType::UInt16 => self.apply_typed::<u16>(&source, &source_grid, &mask, output_path),
            GdalDataType::Int16 => self.apply_typed::<i16>(&source, &source_grid, &mask, output_path),
            GdalDataType::UInt32 => self.apply_typed::<u32>(&source, &source_grid, &mask, output_path),
            GdalDataType::Int32 => self.apply_typed::<i32>(&source, &source_grid, &mask, output_path),
            GdalDataType::Float32 => self.apply_typed::<f32>(&source, &source_grid, &mask, output_path),
            GdalDataType::Float64 => self.apply_typed::<f64>(&source, &source_grid, &mask, output_path),
            other => Err(DriftError::Reprojection(format!(
                "unsupported pixel type for masking: {:?}",
                other
            ))),
        }
    }

    fn apply_typed<T: GdalType + Copy + Zero>(
        &self,
        source: &Dataset,
        grid: &GridDescriptor,
        mask: &BandImage,
        output_path: &Path,
    ) -> DriftResult<PathBuf> {
        let (width, height) = (grid.width, grid.height);
        let band_count = source.raster_count();

        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut output = driver.create_with_band_type_with_options::<T, _>(
            output_path,
            width as isize,
            height as isize,
            band_count,
            &geotiff::tiled_creation_options(),
        )?;

        output.set_geo_transform(&grid.transform.to_gdal())?;
        if !grid.crs_wkt.is_empty() {
            output.set_spatial_ref(&SpatialRef::from_wkt(&grid.crs_wkt)?)?;
        }

        for b in 1..=band_count {
            let source_band = source.rasterband(b)?;
            let mut data = source_band
                .read_as::<T>((0, 0), (width, height), (width, height), None)?
                .data;

            for (value, &keep) in data.iter_mut().zip(mask.iter()) {
                if keep == 0 {
                    *value = T::zero();
                }
            }

            let buffer = Buffer::new((width, height), data);
            let mut output_band = output.rasterband(b)?;
            output_band.write((0, 0), (width, height), &buffer)?;
            if let Some(nodata) = source_band.no_data_value() {
                output_band.set_no_data_value(Some(nodata))?;
            }
        }

        // Band count must be verifiable unchanged on the output
        log::debug!(
            "Band count: {} in, {} out",
            band_count,
            output.raster_count()
        );

        Ok(output_path.to_path_buf())
    }
}

impl Default for SeaMasker {
    fn default() -> Self {
        Self::new()
    }
}
