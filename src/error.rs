use thiserror::Error;

#[derive(Error, Debug)]
pub enum TilingError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Array shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Invalid footprint: {0}")]
    InvalidFootprint(String),

    #[error("Resource unavailable: {path}: {reason}")]
    ResourceUnavailable { path: String, reason: String },

    #[error("Tile {tile} failed: {reason}")]
    TileTaskFailed { tile: String, reason: String },

    #[error("Merge failed: {0}")]
    MergeFailed(String),

    #[error("No-data cache {path} is unreadable: {reason}")]
    CacheCorrupt { path: String, reason: String },

    #[error("Invalid tile size: {tile_size} px with halo {halo} px (tile must exceed twice the halo)")]
    InvalidTileSize { tile_size: usize, halo: usize },

    #[error("Invalid no-data threshold: {0}% (must be in (0, 100])")]
    InvalidThreshold(f64),

    #[error("Pixel size is non-positive: {0}")]
    InvalidPixelSize(f64),

    #[error("Raster has invalid dimensions: {0}x{1}")]
    InvalidDimensions(usize, usize),

    #[error("Invalid block size: {0} (must be a positive multiple of 16)")]
    InvalidBlockSize(usize),

    #[error("Invalid compression type: {0}")]
    InvalidCompression(String),

    #[error("CRS error: {0}")]
    CrsError(String),

    #[error("{tool} failed: {stderr}")]
    ToolFailed { tool: String, stderr: String },
}

impl TilingError {
    pub fn unavailable(path: impl AsRef<std::path::Path>, reason: impl ToString) -> Self {
        TilingError::ResourceUnavailable {
            path: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn tile_failed(tile: impl Into<String>, reason: impl ToString) -> Self {
        TilingError::TileTaskFailed {
            tile: tile.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the underlying cause is a file that is no longer on disk.
    pub fn is_not_found(&self) -> bool {
        match self {
            TilingError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, TilingError>;
