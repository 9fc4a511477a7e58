//! Entry points tying the stages together. Each stage is a barrier: it
//! finishes, failures included, before the next one starts.

use crate::backend::{RasterOps, VectorOps};
use crate::cache::NoDataCache;
use crate::config::PipelineConfig;
use crate::crs::{self, CrsKind};
use crate::cutter::{cut_tiles, CutSpec};
use crate::error::{Result, TilingError};
use crate::footprint::build_footprint;
use crate::grid::build_grid;
use crate::mosaic::{assemble, AssembleOutcome, AssembleSpec};
use crate::nodata::{filter_nodata, NoDataSpec};
use crate::select::select_tiles;
use crate::split::split_cells;
use crate::tiles::{
    complete_keys, pair_records, retain_by_key, sort_by_tile, TileFamily, TileNaming, TileRecord,
    RASTER_EXT,
};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

pub const ROI_SIMPLIFIED: &str = "roi_simplified.gpkg";
pub const EXCLUDED_DIR: &str = "excluded";

/// No-data value used when neither the caller nor the raster provides one.
pub const DEFAULT_NODATA: f64 = 0.0;

#[derive(Debug, Clone)]
pub struct PreprocessInputs<'a> {
    pub raster: &'a Path,
    /// Label raster cut alongside the image for training data
    pub mask: Option<&'a Path>,
    pub roi: Option<&'a Path>,
    pub out_dir: &'a Path,
}

#[derive(Debug, Default)]
pub struct PreprocessReport {
    pub cells: usize,
    pub kept_cells: usize,
    pub excluded_cells: usize,
    pub images: Vec<PathBuf>,
    pub masks: Vec<PathBuf>,
    pub vectors: Vec<PathBuf>,
    pub excluded_tiles: Vec<PathBuf>,
    pub records: Vec<TileRecord>,
    pub discarded: Vec<PathBuf>,
    pub from_cache: bool,
    /// Per-tile failures of every stage
    pub failures: Vec<TilingError>,
    pub roi_simplified: PathBuf,
}

/// Tile a raster (and its label raster) for inference or training.
pub fn preprocess(
    inputs: &PreprocessInputs<'_>,
    cfg: &PipelineConfig,
    raster: &dyn RasterOps,
    vector: &dyn VectorOps,
) -> Result<PreprocessReport> {
    cfg.validate()?;
    fs::create_dir_all(inputs.out_dir)?;
    let pool = cfg.worker_pool()?;

    let meta = raster.metadata(inputs.raster)?;
    info!(
        "Raster {}: {}x{} px, {} bands, pixel size {:.6}",
        inputs.raster.display(),
        meta.width,
        meta.height,
        meta.band_count,
        meta.pixel_width
    );
    if (meta.pixel_width - meta.pixel_height).abs() > 1e-9 {
        warn!(
            "Non-square pixels detected ({:.6} x {:.6}), using width for tile sizes",
            meta.pixel_width, meta.pixel_height
        );
    }
    if crs::classify_projection(&meta.projection) == CrsKind::Geographic {
        warn!("Raster CRS is geographic; tile sizes are in degrees");
    }
    let epsg = cfg.epsg.or(meta.epsg);
    let nodata = cfg.nodata.or(meta.nodata).unwrap_or(DEFAULT_NODATA);

    let footprint = build_footprint(&meta, inputs.roi, cfg.max_vertices, vector)?;
    let roi_simplified = inputs.out_dir.join(ROI_SIMPLIFIED);
    vector.write_polygon(&roi_simplified, &footprint, epsg, &[("id", 1)])?;

    let cell_size = cfg.cell_pixels() as f64 * meta.pixel_width;
    let cells = build_grid(&footprint, cell_size, cell_size)?;
    let selection = select_tiles(&cells, &footprint, cfg.selection_batch, &pool)?;

    let naming = TileNaming::under(
        inputs.out_dir,
        &cfg.image_prefix,
        &cfg.mask_prefix,
        &cfg.vector_prefix,
    );
    let mut failures = Vec::new();

    let split = split_cells(&selection.kept, &naming.vectors, epsg, cfg.overwrite, vector, &pool);
    failures.extend(split.errors);

    let image_spec = CutSpec {
        halo_pixels: cfg.halo,
        pixel_size: meta.pixel_width,
        nodata,
        overwrite: cfg.overwrite,
    };
    let images = cut_tiles(&selection.kept, inputs.raster, &naming.images, &image_spec, raster, &pool);
    failures.extend(images.errors);

    let masks = match inputs.mask {
        Some(mask) => {
            let mask_nodata = raster.metadata(mask)?.nodata.unwrap_or(DEFAULT_NODATA);
            let mask_spec = CutSpec {
                nodata: mask_nodata,
                ..image_spec
            };
            let cut = cut_tiles(&selection.kept, mask, &naming.masks, &mask_spec, raster, &pool);
            failures.extend(cut.errors);
            cut.paths
        }
        None => Vec::new(),
    };

    let excluded_tiles = if cfg.cut_excluded && !selection.excluded.is_empty() {
        let family = TileFamily::new(
            inputs.out_dir.join(EXCLUDED_DIR),
            cfg.image_prefix.as_str(),
            RASTER_EXT,
        );
        let cut = cut_tiles(&selection.excluded, inputs.raster, &family, &image_spec, raster, &pool);
        failures.extend(cut.errors);
        cut.paths
    } else {
        Vec::new()
    };

    // A tile enters the filter only with all of its files
    let complete = complete_keys(
        &images.paths,
        inputs.mask.map(|_| masks.as_slice()),
        Some(&split.paths),
        &naming,
    );
    let ready = retain_by_key(&images.paths, &naming.images, &complete);
    if ready.len() < images.paths.len() {
        warn!(
            "{} tiles dropped because their mask or vector is missing",
            images.paths.len() - ready.len()
        );
    }

    let nodata_spec = NoDataSpec {
        threshold_percent: cfg.nodata_threshold,
        tile_size_pixels: cfg.tile_size,
        nodata,
        band_count: meta.band_count,
        overwrite: cfg.force_nodata_pass(),
    };
    let cache = NoDataCache::in_dir(inputs.out_dir);
    let mut filtered = filter_nodata(
        &ready,
        &masks,
        &split.paths,
        &naming,
        &nodata_spec,
        &cache,
        raster,
        &pool,
    )?;

    failures.append(&mut filtered.failed);
    let records = pair_records(
        &filtered.images,
        &filtered.masks,
        &filtered.vectors,
        &filtered.discarded,
        &naming,
    );

    info!(
        "Preprocessing done: {} cells, {} in ROI, {} tiles kept, {} discarded, {} failures",
        cells.len(),
        selection.kept.len(),
        filtered.images.len(),
        filtered.discarded.len(),
        failures.len()
    );

    Ok(PreprocessReport {
        cells: cells.len(),
        kept_cells: selection.kept.len(),
        excluded_cells: selection.excluded.len(),
        images: filtered.images,
        masks: filtered.masks,
        vectors: filtered.vectors,
        excluded_tiles,
        records,
        discarded: filtered.discarded,
        from_cache: filtered.from_cache,
        failures,
        roi_simplified,
    })
}

#[derive(Debug, Clone)]
pub struct ReassembleInputs<'a> {
    pub predicted: &'a [PathBuf],
    pub tile_vectors: &'a [PathBuf],
    pub source: &'a Path,
    pub output: &'a Path,
    pub roi: Option<&'a Path>,
}

/// Merge per-tile predictions back into a single raster.
pub fn reassemble(
    inputs: &ReassembleInputs<'_>,
    cfg: &PipelineConfig,
    raster: &dyn RasterOps,
) -> Result<AssembleOutcome> {
    let pool = cfg.worker_pool()?;
    let meta = raster.metadata(inputs.source)?;
    let spec = AssembleSpec {
        halo_pixels: cfg.halo,
        nodata: cfg.nodata.or(meta.nodata).unwrap_or(DEFAULT_NODATA),
        epsg: cfg.epsg,
    };
    let predicted = sort_by_tile(inputs.predicted);
    assemble(
        &predicted,
        inputs.tile_vectors,
        inputs.source,
        inputs.output,
        inputs.roi,
        &spec,
        raster,
        &pool,
    )
}

/// Files in `dir` with extension `ext`, sorted by name.
pub fn list_files(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| TilingError::unavailable(dir, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(ext) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
