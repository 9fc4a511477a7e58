//! Seams to the GIS engine.
//!
//! Every stage talks to rasters and vectors only through these traits, so the
//! pipeline can run against GDAL (`io::GdalRaster`, `vector::GdalVector`) or
//! against an in-memory fake in tests. Implementations must be shareable
//! across the worker pool.

use crate::error::Result;
use crate::geometry::{Extent, MultiPolygon};
use crate::io::RasterMetadata;
use std::path::{Path, PathBuf};

pub trait RasterOps: Send + Sync {
    /// Size, geotransform, band count, no-data and CRS of a raster.
    fn metadata(&self, path: &Path) -> Result<RasterMetadata>;

    /// Cut `src` to `extent` (already including any halo) into `dst`.
    fn clip_to_extent(&self, src: &Path, extent: &Extent, nodata: f64, dst: &Path) -> Result<()>;

    /// Cut `src` to the polygon stored in `geometry` into `dst`.
    fn clip_to_geometry(&self, src: &Path, geometry: &Path, nodata: f64, dst: &Path)
        -> Result<()>;

    /// Number of pixels in 1-based `band` equal to `value`.
    fn count_pixels_equal(&self, path: &Path, band: usize, value: f64) -> Result<u64>;

    /// Mosaic `manifest` into `dst` at `pixel_size`, `nodata` being both the
    /// fill and the transparent value.
    fn merge(&self, manifest: &[PathBuf], dst: &Path, pixel_size: f64, nodata: f64) -> Result<()>;

    /// EPSG code of the raster, `None` when it carries no CRS.
    fn crs_code(&self, path: &Path) -> Result<Option<u32>>;

    fn force_crs(&self, path: &Path, epsg: u32) -> Result<()>;
}

pub trait VectorOps: Send + Sync {
    /// All polygons of the first layer, unioned as parts of one footprint.
    fn read_polygons(&self, path: &Path) -> Result<MultiPolygon>;

    /// Simplify every ring within `tolerance` ground units, keeping the
    /// polygons valid.
    fn simplify(&self, geometry: &MultiPolygon, tolerance: f64) -> Result<MultiPolygon>;

    /// Write a single-feature polygon file with integer attributes.
    fn write_polygon(
        &self,
        path: &Path,
        geometry: &MultiPolygon,
        epsg: Option<u32>,
        fields: &[(&str, i64)],
    ) -> Result<()>;
}
