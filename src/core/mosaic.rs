use crate::io::geotiff;
use crate::types::{DriftError, DriftResult, GeoTransform, GridDescriptor, NODATA_BYTE};
use gdal::raster::{Buffer, ColorInterpretation};
use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, Array3, ArrayView2, Axis};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Stitches processed rasters into one georeferenced mosaic.
///
/// Every input is first warped independently onto a grid in the target CRS
/// whose origin is snapped to integer multiples of the pixel size, so all
/// reprojected tiles align with no fractional pixel offset. The aligned tiles
/// are then composited in input order into a virtual mosaic with a validity
/// (alpha) band and per-band nodata 0, and the result is materialized as one
/// tiled, compressed GeoTIFF.
///
/// Where reprojected tiles overlap, the tile later in the input ordering wins
/// at every pixel it carries data for. No temporal or quality precedence is
/// applied; callers needing most-recent-acquisition-wins must pre-sort the
/// input collection accordingly.
pub struct MosaicBuilder {
    target_epsg: u32,
    pixel_size: f64,
}

/// One input after warping to the target grid
struct ReprojectedTile {
    path: PathBuf,
    grid: GridDescriptor,
    band_count: usize,
}

impl MosaicBuilder {
    pub fn new(target_epsg: u32, pixel_size: f64) -> Self {
        Self {
            target_epsg,
            pixel_size,
        }
    }

    /// Reproject, compose and materialize the mosaic at `output_path`
    pub fn build<P: AsRef<Path>>(
        &self,
        inputs: &[PathBuf],
        output_path: P,
    ) -> DriftResult<PathBuf> {
        let output_path = output_path.as_ref();
        if inputs.is_empty() {
            return Err(DriftError::Reprojection(
                "mosaic requires at least one input raster".to_string(),
            ));
        }

        let parent = output_path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;
        let reproj_dir = tempfile::Builder::new()
            .prefix("reproj-")
            .tempdir_in(parent)?;

        match self.build_inner(inputs, reproj_dir.path(), output_path) {
            Ok(path) => {
                reproj_dir.close()?;
                Ok(path)
            }
            Err(e) => {
                // Keep the intermediates for inspection; never delete on failure
                let kept = reproj_dir.into_path();
                log::warn!(
                    "Mosaic failed; reprojected tiles kept in {}",
                    kept.display()
                );
                Err(e)
            }
        }
    }

    fn build_inner(
        &self,
        inputs: &[PathBuf],
        reproj_dir: &Path,
        output_path: &Path,
    ) -> DriftResult<PathBuf> {
        // 1) Warp each input independently onto the aligned target grid
        let tiles: Vec<ReprojectedTile> = inputs
            .par_iter()
            .enumerate()
            .map(|(index, source)| {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| format!("tile_{}.tif", index));
                let destination = reproj_dir.join(format!("{:03}_{}", index, name));
                log::info!(
                    "Reprojecting {} -> {}",
                    source.display(),
                    destination.display()
                );
                self.reproject_tile(source, &destination)
            })
            .collect::<DriftResult<Vec<_>>>()?;

        let band_count = tiles[0].band_count;
        for tile in &tiles {
            if tile.band_count != band_count {
                return Err(DriftError::GridMismatch(format!(
                    "{} has {} band(s), expected {}",
                    tile.path.display(),
                    tile.band_count,
                    band_count
                )));
            }
        }

        // 2) Compose the virtual mosaic over the union of the tile grids
        log::info!("Composing virtual mosaic from {} tile(s)", tiles.len());
        let (grid, cube, alpha) = self.compose(&tiles, band_count)?;

        // 3) Materialize as one tiled, compressed GeoTIFF
        log::info!("Materializing mosaic: {}", output_path.display());
        self.materialize(&grid, &cube, &alpha, output_path)?;

        Ok(output_path.to_path_buf())
    }

    /// Warp one raster to the target CRS/pixel size with bilinear resampling.
    ///
    /// The output grid's origin and edges are snapped outward to integer
    /// multiples of the pixel size, which is what makes every tile of a
    /// mosaic job mutually aligned.
    fn reproject_tile(&self, source: &Path, destination: &Path) -> DriftResult<ReprojectedTile> {
        let dataset = Dataset::open(source)?;
        let src_grid = geotiff::read_grid(&dataset)?;
        if src_grid.crs_wkt.is_empty() {
            return Err(DriftError::Reprojection(format!(
                "{} has no coordinate reference system",
                source.display()
            )));
        }

        let src_sr = SpatialRef::from_wkt(&src_grid.crs_wkt)?;
        let dst_sr = SpatialRef::from_epsg(self.target_epsg)?;

        let forward = CoordTransform::new(&src_sr, &dst_sr)
            .map_err(|e| DriftError::Reprojection(format!("CRS transform failed: {}", e)))?;
        let inverse = CoordTransform::new(&dst_sr, &src_sr)
            .map_err(|e| DriftError::Reprojection(format!("CRS transform failed: {}", e)))?;

        let grid = self.target_grid(&src_grid, &dst_sr, &forward)?;

        let src_cube = geotiff::read_cube_u8(&dataset)?;
        let band_count = src_cube.dim().0;
        let src_transform = &src_grid.transform;

        let mut cube = Array3::zeros((band_count, grid.height, grid.width));
        let top_left_x = grid.transform.top_left_x;
        let top_left_y = grid.transform.top_left_y;

        for row in 0..grid.height {
            // Backward-map one output row of pixel centers into source space
            let center_y = top_left_y - (row as f64 + 0.5) * self.pixel_size;
            let mut xs: Vec<f64> = (0..grid.width)
                .map(|col| top_left_x + (col as f64 + 0.5) * self.pixel_size)
                .collect();
            let mut ys = vec![center_y; grid.width];
            let mut zs = vec![0.0; grid.width];
            inverse
                .transform_coords(&mut xs, &mut ys, &mut zs)
                .map_err(|e| DriftError::Reprojection(format!("inverse transform: {}", e)))?;

            for col in 0..grid.width {
                let col_f =
                    (xs[col] - src_transform.top_left_x) / src_transform.pixel_width - 0.5;
                let row_f =
                    (ys[col] - src_transform.top_left_y) / src_transform.pixel_height - 0.5;

                for b in 0..band_count {
                    let plane = src_cube.index_axis(Axis(0), b);
                    cube[[b, row, col]] = bilinear_sample(&plane, col_f, row_f);
                }
            }
        }

        geotiff::write_cube_u8(
            destination,
            &cube,
            &grid,
            Some(NODATA_BYTE as f64),
            &geotiff::tiled_creation_options(),
        )?;

        Ok(ReprojectedTile {
            path: destination.to_path_buf(),
            grid,
            band_count,
        })
    }

    /// Aligned target grid covering the source extent in the target CRS
    fn target_grid(
        &self,
        src_grid: &GridDescriptor,
        dst_sr: &SpatialRef,
        forward: &CoordTransform,
    ) -> DriftResult<GridDescriptor> {
        let b = src_grid.bounds();
        let mid_x = (b.min_x + b.max_x) / 2.0;
        let mid_y = (b.min_y + b.max_y) / 2.0;

        // Corners plus edge midpoints guard against reprojection curvature
        let mut xs = [
            b.min_x, mid_x, b.max_x, b.min_x, b.max_x, b.min_x, mid_x, b.max_x,
        ];
        let mut ys = [
            b.max_y, b.max_y, b.max_y, mid_y, mid_y, b.min_y, b.min_y, b.min_y,
        ];
        let mut zs = [0.0; 8];
        forward
            .transform_coords(&mut xs, &mut ys, &mut zs)
            .map_err(|e| DriftError::Reprojection(format!("extent transform: {}", e)))?;

        let min_x = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_x = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let min_y = ys.iter().cloned().fold(f64::INFINITY, f64::min);
        let max_y = ys.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        let ps = self.pixel_size;
        let x0 = snap_down(min_x, ps);
        let y1 = snap_up(max_y, ps);
        let width = ((max_x - x0) / ps).ceil().max(1.0) as usize;
        let height = ((y1 - min_y) / ps).ceil().max(1.0) as usize;

        Ok(GridDescriptor {
            crs_wkt: dst_sr.to_wkt()?,
            transform: GeoTransform::from_gdal([x0, ps, 0.0, y1, 0.0, -ps]),
            width,
            height,
        })
    }

    /// Composite aligned tiles in input order; later tiles overwrite earlier
    /// ones wherever they carry data (any band non-zero).
    fn compose(
        &self,
        tiles: &[ReprojectedTile],
        band_count: usize,
    ) -> DriftResult<(GridDescriptor, Array3<u8>, Array2<u8>)> {
        let ps = self.pixel_size;

        let x0 = tiles
            .iter()
            .map(|t| t.grid.transform.top_left_x)
            .fold(f64::INFINITY, f64::min);
        let y1 = tiles
            .iter()
            .map(|t| t.grid.transform.top_left_y)
            .fold(f64::NEG_INFINITY, f64::max);
        let x1 = tiles
            .iter()
            .map(|t| t.grid.transform.top_left_x + ps * t.grid.width as f64)
            .fold(f64::NEG_INFINITY, f64::max);
        let y0 = tiles
            .iter()
            .map(|t| t.grid.transform.top_left_y - ps * t.grid.height as f64)
            .fold(f64::INFINITY, f64::min);

        let width = ((x1 - x0) / ps).round() as usize;
        let height = ((y1 - y0) / ps).round() as usize;

        let grid = GridDescriptor {
            crs_wkt: tiles[0].grid.crs_wkt.clone(),
            transform: GeoTransform::from_gdal([x0, ps, 0.0, y1, 0.0, -ps]),
            width,
            height,
        };

        let mut cube = Array3::zeros((band_count, height, width));
        let mut alpha = Array2::zeros((height, width));

        for tile in tiles {
            let dataset = Dataset::open(&tile.path)?;
            let tile_cube = geotiff::read_cube_u8(&dataset)?;

            // Aligned grids differ by exact pixel multiples
            let col_off = ((tile.grid.transform.top_left_x - x0) / ps).round() as usize;
            let row_off = ((y1 - tile.grid.transform.top_left_y) / ps).round() as usize;

            for r in 0..tile.grid.height {
                for c in 0..tile.grid.width {
                    let has_data = (0..band_count).any(|b| tile_cube[[b, r, c]] != NODATA_BYTE);
                    if !has_data {
                        continue;
                    }
                    for b in 0..band_count {
                        cube[[b, row_off + r, col_off + c]] = tile_cube[[b, r, c]];
                    }
                    alpha[[row_off + r, col_off + c]] = 255;
                }
            }
        }

        Ok((grid, cube, alpha))
    }

    /// Flatten the composed mosaic into the final GeoTIFF
    fn materialize(
        &self,
        grid: &GridDescriptor,
        cube: &Array3<u8>,
        alpha: &Array2<u8>,
        output_path: &Path,
    ) -> DriftResult<()> {
        let (band_count, height, width) = cube.dim();

        let mem_driver = DriverManager::get_driver_by_name("MEM")?;
        let mut composed = mem_driver.create_with_band_type::<u8, _>(
            "",
            width as isize,
            height as isize,
            (band_count + 1) as isize,
        )?;
        composed.set_geo_transform(&grid.transform.to_gdal())?;
        if !grid.crs_wkt.is_empty() {
            composed.set_spatial_ref(&SpatialRef::from_wkt(&grid.crs_wkt)?)?;
        }

        for b in 0..band_count {
            let flat: Vec<u8> = cube.index_axis(Axis(0), b).iter().cloned().collect();
            let buffer = Buffer::new((width, height), flat);
            let mut band = composed.rasterband((b + 1) as isize)?;
            band.write((0, 0), (width, height), &buffer)?;
            band.set_no_data_value(Some(NODATA_BYTE as f64))?;
        }

        let flat_alpha: Vec<u8> = alpha.iter().cloned().collect();
        let buffer = Buffer::new((width, height), flat_alpha);
        let mut alpha_band = composed.rasterband((band_count + 1) as isize)?;
        alpha_band.write((0, 0), (width, height), &buffer)?;
        alpha_band.set_color_interpretation(ColorInterpretation::AlphaBand)?;

        let gtiff = DriverManager::get_driver_by_name("GTiff")?;
        let output = composed.create_copy(&gtiff, output_path, &geotiff::mosaic_creation_options())?;
        drop(output);

        Ok(())
    }
}

/// Snap a coordinate down to the pixel grid
pub fn snap_down(value: f64, pixel_size: f64) -> f64 {
    (value / pixel_size).floor() * pixel_size
}

/// Snap a coordinate up to the pixel grid
pub fn snap_up(value: f64, pixel_size: f64) -> f64 {
    (value / pixel_size).ceil() * pixel_size
}

/// Bilinear sample with edge clamping; coordinates outside the plane are
/// nodata
fn bilinear_sample(plane: &ArrayView2<u8>, x: f64, y: f64) -> u8 {
    let (rows, cols) = plane.dim();
    if x <= -0.5 || y <= -0.5 || x >= cols as f64 - 0.5 || y >= rows as f64 - 0.5 {
        return NODATA_BYTE;
    }

    let xc = x.clamp(0.0, (cols - 1) as f64);
    let yc = y.clamp(0.0, (rows - 1) as f64);
    let x1 = xc.floor() as usize;
    let y1 = yc.floor() as usize;
    let x2 = (x1 + 1).min(cols - 1);
    let y2 = (y1 + 1).min(rows - 1);

    let dx = xc - x1 as f64;
    let dy = yc - y1 as f64;

    let v11 = plane[[y1, x1]] as f64;
    let v12 = plane[[y2, x1]] as f64;
    let v21 = plane[[y1, x2]] as f64;
    let v22 = plane[[y2, x2]] as f64;

    let interpolated =
        v11 * (1.0 - dx) * (1.0 - dy) + v21 * dx * (1.0 - dy) + v12 * (1.0 - dx) * dy + v22 * dx * dy;

    interpolated.round().clamp(0.0, 255.0) as u8
}
