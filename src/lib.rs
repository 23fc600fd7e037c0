//! driftnet: A Fast, Modular Sentinel-2 Ocean Raster Pipeline
//!
//! This library turns zipped per-scene band deliveries into analysis-ready
//! rasters: bands are merged and rescaled into 8-bit GeoTIFFs, land pixels are
//! suppressed with a shoreline-derived mask, and processed tiles are stitched
//! into one georeferenced mosaic.

pub mod types;
pub mod io;
pub mod core;
pub mod pipeline;

// Re-export main types and functions for easier access
pub use types::{
    BandCube, BandImage, BoundingBox, DriftError, DriftResult, GeoTransform, GridDescriptor,
};

pub use io::{ManifestStore, SceneArchive};

pub use crate::core::{BandMerger, MaskRasterizer, MosaicBuilder, SeaMasker};

pub use pipeline::{run_mask_batch, run_merge_batch, run_mosaic, BatchSummary, PipelineConfig};
