//! Batch orchestration: one parameterized stage per pipeline responsibility.
//!
//! Work items (archives, rasters) are independent, so each stage runs on a
//! bounded worker pool and drains a completion channel -- a blocking "next
//! finished item" queue instead of sleep-and-recheck polling. One item's
//! failure never cancels or corrupts its siblings.

use crate::core::{BandMerger, MaskRasterizer, MosaicBuilder, SeaMasker};
use crate::io::{geotiff, ManifestStore};
use crate::types::{DriftError, DriftResult};
use gdal::Dataset;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

/// Explicit pipeline configuration, passed in at construction time.
///
/// Defaults mirror the operational setup: three workers, yesterday's date
/// bucket, a 250 m shoreline buffer and a WGS84 mosaic grid at roughly 10 m.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bounded worker count for batch stages
    pub workers: usize,
    /// Manifest bucket is `today - day_offset`
    pub day_offset: i64,
    /// Shoreline buffer distance in reference-CRS units
    pub buffer_distance: f64,
    /// Mosaic target CRS
    pub target_epsg: u32,
    /// Mosaic target pixel size in target-CRS units
    pub target_pixel_size: f64,
    /// Manifest location; None disables manifest recording
    pub manifest_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            day_offset: 1,
            buffer_distance: 250.0,
            target_epsg: 4326,
            target_pixel_size: 0.0000898315,
            manifest_path: None,
        }
    }
}

/// Per-stage batch outcome: which items succeeded, which failed and how
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Output paths of successful items
    pub succeeded: Vec<PathBuf>,
    /// Failed inputs with their errors, in completion order
    pub failed: Vec<(PathBuf, DriftError)>,
}

impl BatchSummary {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Log counts plus the failure kind for every failed item
    pub fn log_report(&self, stage: &str) {
        log::info!(
            "{}: {} succeeded, {} failed",
            stage,
            self.success_count(),
            self.failure_count()
        );
        for (input, error) in &self.failed {
            log::warn!("{}: {} [{}] {}", stage, input.display(), error.kind(), error);
        }
    }
}

/// Merge a batch of scene archives into per-tile rasters.
///
/// Successful output names are recorded in the manifest (when configured)
/// under the configured date bucket.
pub fn run_merge_batch(archives: &[PathBuf], config: &PipelineConfig) -> DriftResult<BatchSummary> {
    let summary = run_batch(archives, config.workers, |zip_path| {
        BandMerger::new().merge_archive(zip_path)
    })?;
    summary.log_report("merge");
    record_outputs(config, &summary.succeeded);
    Ok(summary)
}

/// Mask a batch of rasters against a shoreline dataset.
///
/// For each raster a congruent mask is rasterized beside it
/// (`{stem}_mask.tif`) and applied, producing `{stem}_SeaOnly.tif`.
pub fn run_mask_batch(
    rasters: &[PathBuf],
    vector_path: &Path,
    config: &PipelineConfig,
) -> DriftResult<BatchSummary> {
    let rasterizer = MaskRasterizer::new(config.buffer_distance);
    let masker = SeaMasker::new();

    let summary = run_batch(rasters, config.workers, |raster_path| {
        let dataset = Dataset::open(raster_path)?;
        let grid = geotiff::read_grid(&dataset)?;
        drop(dataset);

        let mask_path = with_suffix(raster_path, "_mask");
        rasterizer.write_mask(vector_path, &grid, &mask_path)?;

        let output_path = with_suffix(raster_path, "_SeaOnly");
        masker.apply(raster_path, &mask_path, &output_path)
    })?;
    summary.log_report("mask");
    record_outputs(config, &summary.succeeded);
    Ok(summary)
}

/// Stitch a batch of rasters into one mosaic.
///
/// Input order is significant: overlaps resolve last-write-wins by position.
pub fn run_mosaic<P: AsRef<Path>>(
    rasters: &[PathBuf],
    output_path: P,
    config: &PipelineConfig,
) -> DriftResult<PathBuf> {
    let builder = MosaicBuilder::new(config.target_epsg, config.target_pixel_size);
    let output = builder.build(rasters, output_path)?;
    record_outputs(config, std::slice::from_ref(&output));
    Ok(output)
}

/// Run one job per item on a bounded pool, draining a completion channel
fn run_batch<F>(items: &[PathBuf], workers: usize, job: F) -> DriftResult<BatchSummary>
where
    F: Fn(&Path) -> DriftResult<PathBuf> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| {
            DriftError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            ))
        })?;

    let (tx, rx) = mpsc::channel();
    let mut summary = BatchSummary::default();
    let total = items.len();

    pool.scope(|scope| {
        for item in items {
            let tx = tx.clone();
            let job = &job;
            scope.spawn(move |_| {
                let outcome = job(item);
                // Receiver hung up means the batch is being abandoned
                tx.send((item.clone(), outcome)).ok();
            });
        }
        drop(tx);

        // Blocking wait for the next completed item, in completion order
        for (done, (item, outcome)) in rx.into_iter().enumerate() {
            match outcome {
                Ok(output) => {
                    log::info!(
                        "[{}/{}] {} -> {}",
                        done + 1,
                        total,
                        item.display(),
                        output.display()
                    );
                    summary.succeeded.push(output);
                }
                Err(error) => {
                    log::error!(
                        "[{}/{}] {} failed [{}]: {}",
                        done + 1,
                        total,
                        item.display(),
                        error.kind(),
                        error
                    );
                    summary.failed.push((item, error));
                }
            }
        }
    });

    Ok(summary)
}

/// Record output names in the manifest; manifest trouble never fails a batch
fn record_outputs(config: &PipelineConfig, outputs: &[PathBuf]) {
    let Some(manifest_path) = &config.manifest_path else {
        return;
    };
    if outputs.is_empty() {
        return;
    }

    let names: Vec<String> = outputs
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .collect();

    let store = ManifestStore::new(manifest_path);
    if let Err(e) = store.record_for_offset(config.day_offset, &names) {
        log::error!("manifest update failed: {}", e);
    }
}

/// `dir/name.tif` -> `dir/name{suffix}.tif`
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}.tif", stem, suffix))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 3);
        assert_eq!(config.day_offset, 1);
        assert_eq!(config.target_epsg, 4326);
        assert!(config.manifest_path.is_none());
    }

    #[test]
    fn test_with_suffix_naming() {
        let path = Path::new("/data/T33TWJ_20230101.tif");
        assert_eq!(
            with_suffix(path, "_SeaOnly"),
            Path::new("/data/T33TWJ_20230101_SeaOnly.tif")
        );
        assert_eq!(
            with_suffix(path, "_mask"),
            Path::new("/data/T33TWJ_20230101_mask.tif")
        );
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary::default();
        summary.succeeded.push(PathBuf::from("a.tif"));
        summary.failed.push((
            PathBuf::from("b.zip"),
            DriftError::MissingBands("empty".to_string()),
        ));

        assert_eq!(summary.success_count(), 1);
        assert_eq!(summary.failure_count(), 1);
        assert_eq!(summary.failed[0].1.kind(), "MissingBands");
    }
}
