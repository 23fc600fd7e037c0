use crate::io::geotiff;
use crate::types::{BandImage, DriftError, DriftResult, GridDescriptor};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Axis};
use std::path::{Path, PathBuf};

/// Segment count for buffer arc approximation
const BUFFER_SEGMENTS: u32 = 30;

/// Rasterizes a vector shoreline dataset onto a reference raster grid.
///
/// The produced mask is congruent with the reference grid by construction:
/// the rasterizer is never free to choose its own transform or dimensions.
/// Mask semantics: 1 = retained (sea), 0 = excluded (land).
///
/// The buffer distance is applied to every geometry before clipping, in
/// reference-CRS units. It compensates for registration error in coastline
/// datasets; 0 is a no-op. Negative distances are accepted but ill-advised,
/// as they can invert the intended coverage.
pub struct MaskRasterizer {
    buffer_distance: f64,
}

impl MaskRasterizer {
    pub fn new(buffer_distance: f64) -> Self {
        Self { buffer_distance }
    }

    /// Rasterize the shoreline dataset onto the reference grid
    pub fn rasterize_for_grid<P: AsRef<Path>>(
        &self,
        vector_path: P,
        reference: &GridDescriptor,
    ) -> DriftResult<BandImage> {
        let vector_path = vector_path.as_ref();
        log::info!(
            "Rasterizing {} onto {}x{} reference grid (buffer {})",
            vector_path.display(),
            reference.width,
            reference.height,
            self.buffer_distance
        );

        let geometries = self.collect_geometries(vector_path, reference)?;
        if geometries.is_empty() {
            // Nothing survived reprojection/clipping: a valid all-zero mask
            log::debug!("No geometries intersect the reference grid");
            return Ok(Array2::zeros((reference.height, reference.width)));
        }

        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut dataset = driver.create_with_band_type::<u8, _>(
            "",
            reference.width as isize,
            reference.height as isize,
            1,
        )?;
        dataset.set_geo_transform(&reference.transform.to_gdal())?;
        if !reference.crs_wkt.is_empty() {
            dataset.set_spatial_ref(&SpatialRef::from_wkt(&reference.crs_wkt)?)?;
        }

        let burn_values = [1.0];
        gdal::raster::rasterize(&mut dataset, &[1], &geometries, &burn_values, None)
            .map_err(|e| DriftError::Reprojection(format!("rasterization failed: {}", e)))?;

        geotiff::read_band_u8(&dataset, 1)
    }

    /// Rasterize and write the mask as a single-band GeoTIFF
    pub fn write_mask<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        vector_path: P,
        reference: &GridDescriptor,
        output_path: Q,
    ) -> DriftResult<PathBuf> {
        let mask = self.rasterize_for_grid(vector_path, reference)?;
        let cube = mask.insert_axis(Axis(0));
        geotiff::write_cube_u8(
            output_path.as_ref(),
            &cube,
            reference,
            None,
            &geotiff::tiled_creation_options(),
        )?;
        Ok(output_path.as_ref().to_path_buf())
    }

    /// Reproject, buffer and clip the vector features to the reference grid
    fn collect_geometries(
        &self,
        vector_path: &Path,
        reference: &GridDescriptor,
    ) -> DriftResult<Vec<Geometry>> {
        let dataset = Dataset::open(vector_path)?;
        let mut layer = dataset.layer(0)?;

        let transform = self.reprojection_for(&layer.spatial_ref(), reference)?;
        let clip_box = bounds_polygon(reference)?;

        let mut geometries = Vec::new();
        for feature in layer.features() {
            let source = match feature.geometry_by_index(0) {
                Ok(g) => g,
                Err(_) => continue,
            };

            let clipped = match &transform {
                Some(ct) => {
                    let reprojected = source.transform(ct).map_err(|e| {
                        DriftError::Reprojection(format!("feature reprojection failed: {}", e))
                    })?;
                    self.buffer_and_clip(&reprojected, &clip_box)?
                }
                None => self.buffer_and_clip(source, &clip_box)?,
            };

            if let Some(geometry) = clipped {
                geometries.push(geometry);
            }
        }

        Ok(geometries)
    }

    fn buffer_and_clip(
        &self,
        geometry: &Geometry,
        clip_box: &Geometry,
    ) -> DriftResult<Option<Geometry>> {
        if self.buffer_distance != 0.0 {
            let buffered = geometry
                .buffer(self.buffer_distance, BUFFER_SEGMENTS)
                .map_err(|e| DriftError::Reprojection(format!("buffering failed: {}", e)))?;
            Ok(buffered.intersection(clip_box).filter(|g| !g.is_empty()))
        } else {
            Ok(geometry.intersection(clip_box).filter(|g| !g.is_empty()))
        }
    }

    /// Coordinate transform into the reference CRS, if the CRSs differ
    fn reprojection_for(
        &self,
        layer_sr: &Option<SpatialRef>,
        reference: &GridDescriptor,
    ) -> DriftResult<Option<CoordTransform>> {
        if reference.crs_wkt.is_empty() {
            return Ok(None);
        }
        let source = match layer_sr {
            Some(sr) => sr,
            None => return Ok(None),
        };

        let source_wkt = source.to_wkt().unwrap_or_default();
        if source_wkt == reference.crs_wkt {
            return Ok(None);
        }

        let target = SpatialRef::from_wkt(&reference.crs_wkt)?;
        let transform = CoordTransform::new(source, &target).map_err(|e| {
            DriftError::Reprojection(format!("cannot build CRS transform: {}", e))
        })?;
        Ok(Some(transform))
    }
}

/// Reference grid extent as a clip polygon
fn bounds_polygon(reference: &GridDescriptor) -> DriftResult<Geometry> {
    let b = reference.bounds();
    let wkt = format!(
        "POLYGON(({minx} {miny},{minx} {maxy},{maxx} {maxy},{maxx} {miny},{minx} {miny}))",
        minx = b.min_x,
        miny = b.min_y,
        maxx = b.max_x,
        maxy = b.max_y,
    );
    Geometry::from_wkt(&wkt).map_err(DriftError::Gdal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoTransform;

    #[test]
    fn test_bounds_polygon_covers_grid() {
        let grid = GridDescriptor {
            crs_wkt: String::new(),
            transform: GeoTransform::from_gdal([0.0, 10.0, 0.0, 40.0, 0.0, -10.0]),
            width: 4,
            height: 4,
        };
        let polygon = bounds_polygon(&grid).unwrap();
        let (x0, y0, x1, y1) = {
            let e = polygon.envelope();
            (e.MinX, e.MinY, e.MaxX, e.MaxY)
        };
        assert_eq!((x0, y0, x1, y1), (0.0, 0.0, 40.0, 40.0));
    }
}
