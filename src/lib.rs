// Library exports for testing and reuse

pub mod backend;
pub mod cache;
pub mod cli;
pub mod config;
pub mod crs;
pub mod cutter;
pub mod error;
pub mod footprint;
pub mod geometry;
pub mod grid;
pub mod io;
pub mod mosaic;
pub mod nodata;
pub mod pipeline;
pub mod pool;
pub mod select;
pub mod split;
pub mod tiles;
pub mod tools;
pub mod vector;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types
pub use backend::{RasterOps, VectorOps};
pub use config::PipelineConfig;
pub use error::{Result, TilingError};
pub use grid::{build_grid, GridCell};
pub use io::{GdalRaster, RasterMetadata};
pub use pipeline::{preprocess, reassemble, PreprocessInputs, PreprocessReport, ReassembleInputs};
pub use vector::GdalVector;
