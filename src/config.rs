use crate::error::{Result, TilingError};
use crate::pool::{WorkerPool, MAX_CORE_FRACTION};
use crate::tools::OutputOptions;

/// Run-wide settings, built once by the caller and passed down explicitly.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Side of a cut tile in pixels, halo included
    pub tile_size: usize,
    /// Overlap added on every side of a tile, in pixels
    pub halo: usize,
    /// Discard a tile when a band has at least this percentage of no-data
    pub nodata_threshold: f64,
    /// Overrides the source raster's no-data value
    pub nodata: Option<f64>,
    pub overwrite: bool,
    pub use_cache: bool,
    pub core_fraction: f64,
    pub threads: Option<usize>,
    pub max_vertices: usize,
    /// Cells per batch in ROI selection
    pub selection_batch: usize,
    pub image_prefix: String,
    pub mask_prefix: String,
    pub vector_prefix: String,
    pub cut_excluded: bool,
    pub epsg: Option<u32>,
    pub output: OutputOptions,
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tile_size: 512,
            halo: 32,
            nodata_threshold: 50.0,
            nodata: None,
            overwrite: false,
            use_cache: true,
            core_fraction: MAX_CORE_FRACTION,
            threads: None,
            max_vertices: 1000,
            selection_batch: 256,
            image_prefix: "img_".to_string(),
            mask_prefix: "mask_".to_string(),
            vector_prefix: "vec_".to_string(),
            cut_excluded: false,
            epsg: None,
            output: OutputOptions::default(),
            verbose: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tile_size <= 2 * self.halo {
            return Err(TilingError::InvalidTileSize {
                tile_size: self.tile_size,
                halo: self.halo,
            });
        }
        if !(self.nodata_threshold > 0.0 && self.nodata_threshold <= 100.0) {
            return Err(TilingError::InvalidThreshold(self.nodata_threshold));
        }
        Ok(())
    }

    /// Grid cell side in pixels: the tile without its halo on both sides.
    pub fn cell_pixels(&self) -> usize {
        self.tile_size - 2 * self.halo
    }

    /// Whether a fresh no-data pass is forced.
    pub fn force_nodata_pass(&self) -> bool {
        self.overwrite || !self.use_cache
    }

    pub fn worker_pool(&self) -> Result<WorkerPool> {
        WorkerPool::for_machine(self.core_fraction, self.threads)
    }

    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else {
            "info"
        }
    }
}
