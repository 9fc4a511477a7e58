use crate::backend::RasterOps;
use crate::error::{Result, TilingError};
use crate::grid::GridCell;
use crate::pool::WorkerPool;
use crate::tiles::{TileFamily, TileKey, TileOutcome};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// How each tile is cut from the source raster.
#[derive(Debug, Clone, Copy)]
pub struct CutSpec {
    pub halo_pixels: usize,
    pub pixel_size: f64,
    pub nodata: f64,
    pub overwrite: bool,
}

/// Cut one raster tile per cell, each grown by the halo, into `family`.
///
/// Failed tiles are logged and reported in `errors`; they never stop the
/// remaining cuts. Existing outputs are reused unless `overwrite` is set.
pub fn cut_tiles(
    cells: &[GridCell],
    src: &Path,
    family: &TileFamily,
    spec: &CutSpec,
    raster: &dyn RasterOps,
    pool: &WorkerPool,
) -> TileOutcome {
    if let Err(e) = fs::create_dir_all(&family.dir) {
        return TileOutcome {
            paths: Vec::new(),
            errors: vec![TilingError::unavailable(&family.dir, e)],
        };
    }

    info!(
        "Cutting {} tiles from {} (halo {} px) with {} workers",
        cells.len(),
        src.display(),
        spec.halo_pixels,
        pool.workers()
    );

    let results: Vec<(TileKey, Result<PathBuf>)> = pool.install(|| {
        cells
            .par_iter()
            .map(|cell| {
                let key = TileKey::of(cell);
                let dst = family.path(key);

                if dst.exists() {
                    if !spec.overwrite {
                        debug!("Tile {} already cut, skipping", key);
                        return (key, Ok(dst));
                    }
                    if let Err(e) = fs::remove_file(&dst) {
                        return (key, Err(TilingError::tile_failed(key.to_string(), e)));
                    }
                }

                let extent = cell.halo_extent(spec.halo_pixels, spec.pixel_size);
                let result = raster
                    .clip_to_extent(src, &extent, spec.nodata, &dst)
                    .map(|_| dst)
                    .map_err(|e| {
                        warn!("Tile {}: cut failed: {}", key, e);
                        TilingError::tile_failed(key.to_string(), e)
                    });
                (key, result)
            })
            .collect()
    });

    let outcome = TileOutcome::collect(results);
    if !outcome.errors.is_empty() {
        warn!("{} of {} tile cuts failed", outcome.errors.len(), cells.len());
    }
    outcome
}
