//! Core raster processing modules

pub mod band_merge;
pub mod land_mask;
pub mod mosaic;
pub mod sea_mask;

// Re-export main types
pub use band_merge::{rescale_to_byte, BandMerger};
pub use land_mask::MaskRasterizer;
pub use mosaic::MosaicBuilder;
pub use sea_mask::SeaMasker;
