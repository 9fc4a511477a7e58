use crate::backend::RasterOps;
use crate::cache::NoDataCache;
use crate::error::{Result, TilingError};
use crate::pool::WorkerPool;
use crate::tiles::{complete_keys, retain_by_key, TileKey, TileNaming};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct NoDataSpec {
    /// Percentage of a tile's pixels, in (0, 100]
    pub threshold_percent: f64,
    /// Side of a cut tile in pixels, halo included
    pub tile_size_pixels: usize,
    pub nodata: f64,
    pub band_count: usize,
    pub overwrite: bool,
}

impl NoDataSpec {
    pub fn validate(&self) -> Result<()> {
        if !(self.threshold_percent > 0.0 && self.threshold_percent <= 100.0) {
            return Err(TilingError::InvalidThreshold(self.threshold_percent));
        }
        Ok(())
    }

    /// Pixel count at or above which a band makes its tile a discard.
    pub fn threshold_pixels(&self) -> u64 {
        let total = (self.tile_size_pixels * self.tile_size_pixels) as f64;
        (total * self.threshold_percent / 100.0).floor() as u64
    }
}

/// Lists surviving the filter, in 1:1 correspondence and tile order.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub images: Vec<PathBuf>,
    pub masks: Vec<PathBuf>,
    pub vectors: Vec<PathBuf>,
    pub discarded: Vec<PathBuf>,
    /// Tiles whose pixels could not be counted. They are left out of the
    /// kept lists and of the cache, so the next run counts them again.
    pub failed: Vec<TilingError>,
    /// Decisions replayed from the cache without reading pixels
    pub from_cache: bool,
}

enum Decision {
    Keep,
    Discard,
    Gone,
    Failed(TilingError),
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove {}: {}", path.display(), e),
    }
}

fn discard_files(image: &Path, naming: &TileNaming, with_mask: bool) {
    remove_if_present(image);
    if with_mask {
        if let Some(mask) = naming.mask_for_image(image) {
            remove_if_present(&mask);
        }
    }
}

fn outcome_for(
    keys: &HashSet<TileKey>,
    masks: &[PathBuf],
    vectors: &[PathBuf],
    images: &[PathBuf],
    naming: &TileNaming,
) -> (Vec<PathBuf>, Vec<PathBuf>, Vec<PathBuf>) {
    (
        retain_by_key(images, &naming.images, keys),
        retain_by_key(masks, &naming.masks, keys),
        retain_by_key(vectors, &naming.vectors, keys),
    )
}

/// Drop tiles in which any band has too many no-data pixels.
///
/// Masks and vectors are paired with images by tile identity through
/// `naming`, never by list position. When `masks` or `vectors` is non-empty,
/// a tile missing its mask or vector is not kept. Without `overwrite`, a
/// previous run's cache is replayed and no pixels are read.
#[allow(clippy::too_many_arguments)]
pub fn filter_nodata(
    images: &[PathBuf],
    masks: &[PathBuf],
    vectors: &[PathBuf],
    naming: &TileNaming,
    spec: &NoDataSpec,
    cache: &NoDataCache,
    raster: &dyn RasterOps,
    pool: &WorkerPool,
) -> Result<FilterOutcome> {
    spec.validate()?;
    let with_mask = !masks.is_empty();

    let all_keys = complete_keys(
        images,
        with_mask.then_some(masks),
        (!vectors.is_empty()).then_some(vectors),
        naming,
    );
    if all_keys.len() < images.len() {
        warn!(
            "{} tiles lack a mask or vector and are left out",
            images.len() - all_keys.len()
        );
    }

    if !spec.overwrite {
        if let Some(cached) = cache.load_or_miss() {
            let discarded_keys: HashSet<TileKey> =
                cached.iter().filter_map(|p| naming.images.key_of(p)).collect();
            for image in images {
                if naming.images.key_of(image).map_or(false, |k| discarded_keys.contains(&k)) {
                    discard_files(image, naming, with_mask);
                }
            }
            let kept: HashSet<TileKey> = all_keys.difference(&discarded_keys).copied().collect();
            let (images, masks, vectors) = outcome_for(&kept, masks, vectors, images, naming);
            info!(
                "No-data cache {}: {} tiles discarded earlier, {} kept",
                cache.path().display(),
                cached.len(),
                images.len()
            );
            return Ok(FilterOutcome {
                images,
                masks,
                vectors,
                discarded: cached,
                failed: Vec::new(),
                from_cache: true,
            });
        }
    }

    let threshold = spec.threshold_pixels();
    info!(
        "No-data filter: {} tiles, {} bands, discard at >= {} pixels equal to {}",
        all_keys.len(),
        spec.band_count,
        threshold,
        spec.nodata
    );

    let mut candidates: Vec<(TileKey, PathBuf)> = images
        .iter()
        .filter_map(|p| naming.images.key_of(p).map(|k| (k, p.clone())))
        .filter(|(k, _)| all_keys.contains(k))
        .collect();
    candidates.sort_by_key(|(k, _)| *k);

    let mut discarded: Vec<PathBuf> = Vec::new();
    let mut failed: Vec<TilingError> = Vec::new();
    for band in 1..=spec.band_count {
        let decisions: Vec<Decision> = pool.install(|| {
            candidates
                .par_iter()
                .map(|(key, image)| match raster.count_pixels_equal(image, band, spec.nodata) {
                    Ok(count) if count >= threshold => {
                        debug!("Tile {} band {}: {} no-data pixels, discarding", key, band, count);
                        discard_files(image, naming, with_mask);
                        Decision::Discard
                    }
                    Ok(_) => Decision::Keep,
                    Err(e) if e.is_not_found() => Decision::Gone,
                    Err(e) => Decision::Failed(TilingError::tile_failed(key.to_string(), e)),
                })
                .collect()
        });

        let before = candidates.len();
        let mut survivors = Vec::with_capacity(before);
        for ((key, image), decision) in candidates.into_iter().zip(decisions) {
            match decision {
                Decision::Keep => survivors.push((key, image)),
                Decision::Discard => discarded.push(image),
                Decision::Gone => debug!("Tile {} vanished before band {}", key, band),
                Decision::Failed(e) => {
                    warn!("{}; leaving tile out of this run", e);
                    failed.push(e);
                }
            }
        }
        candidates = survivors;
        info!(
            "Band {}: {} of {} tiles discarded",
            band,
            before - candidates.len(),
            before
        );
    }

    cache.store(&discarded)?;

    let kept: HashSet<TileKey> = candidates.iter().map(|(k, _)| *k).collect();
    let (images, masks, vectors) = outcome_for(&kept, masks, vectors, images, naming);
    info!(
        "No-data filter done: {} kept, {} discarded, {} failed",
        images.len(),
        discarded.len(),
        failed.len()
    );

    Ok(FilterOutcome {
        images,
        masks,
        vectors,
        discarded,
        failed,
        from_cache: false,
    })
}
