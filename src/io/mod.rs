//! Input/output: scene archives, GeoTIFF access, output manifest

pub mod archive;
pub mod geotiff;
pub mod manifest;

// Re-export main types
pub use archive::SceneArchive;
pub use geotiff::{mosaic_creation_options, tiled_creation_options};
pub use manifest::ManifestStore;
