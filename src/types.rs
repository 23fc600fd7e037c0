use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

/// Single-band pixel plane (row x column)
pub type BandImage = Array2<u8>;

/// Multi-band pixel cube (band x row x column)
pub type BandCube = Array3<u8>;

/// Sentinel-2 deliveries encode reflectance in [0, 10000]
pub const REFLECTANCE_MAX: u16 = 10_000;

/// Nodata sentinel shared by merged, masked and mosaicked rasters
pub const NODATA_BYTE: u8 = 0;

/// Geospatial bounding box in map coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

/// Affine geotransform, GDAL coefficient order
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }
}

/// Canonical description of a raster's spatial grid.
///
/// Two rasters are congruent iff their descriptors are equal; congruence is
/// the precondition for any pixel-by-pixel operation between them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDescriptor {
    /// CRS as WKT
    pub crs_wkt: String,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

impl GridDescriptor {
    /// Map-space extent of the grid (assumes north-up, no rotation terms)
    pub fn bounds(&self) -> BoundingBox {
        let t = &self.transform;
        let x0 = t.top_left_x;
        let y0 = t.top_left_y;
        let x1 = x0 + t.pixel_width * self.width as f64;
        let y1 = y0 + t.pixel_height * self.height as f64;
        BoundingBox {
            min_x: x0.min(x1),
            min_y: y0.min(y1),
            max_x: x0.max(x1),
            max_y: y0.max(y1),
        }
    }

    pub fn is_congruent_with(&self, other: &GridDescriptor) -> bool {
        self == other
    }

    /// Width/height agreement only; the masking precondition
    pub fn same_dimensions(&self, other: &GridDescriptor) -> bool {
        self.width == other.width && self.height == other.height
    }
}

/// Error types for pipeline processing
#[derive(Debug, thiserror::Error)]
pub enum DriftError {
    #[error("no band rasters found: {0}")]
    MissingBands(String),

    #[error("metadata error: {0}")]
    MissingMetadata(String),

    #[error("grid mismatch: {0}")]
    GridMismatch(String),

    #[error("archive error: {0}")]
    ArchiveIo(String),

    #[error("reprojection error: {0}")]
    Reprojection(String),

    #[error("manifest corruption: {0}")]
    ManifestCorruption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),
}

impl DriftError {
    /// Short failure kind used in batch summaries
    pub fn kind(&self) -> &'static str {
        match self {
            DriftError::MissingBands(_) => "MissingBands",
            DriftError::MissingMetadata(_) => "MissingMetadata",
            DriftError::GridMismatch(_) => "GridMismatch",
            DriftError::ArchiveIo(_) => "ArchiveIo",
            DriftError::Reprojection(_) => "Reprojection",
            DriftError::ManifestCorruption(_) => "ManifestCorruption",
            DriftError::Io(_) => "Io",
            DriftError::Gdal(_) => "Gdal",
        }
    }
}

/// Result type for pipeline operations
pub type DriftResult<T> = Result<T, DriftError>;
