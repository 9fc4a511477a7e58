use crate::backend::RasterOps;
use crate::crs;
use crate::error::{Result, TilingError};
use crate::pool::WorkerPool;
use crate::tiles::{TileKey, TileOutcome};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy)]
pub struct AssembleSpec {
    pub halo_pixels: usize,
    pub nodata: f64,
    /// CRS forced onto the mosaic when the merge loses it. Falls back to the
    /// source raster's own code.
    pub epsg: Option<u32>,
}

#[derive(Debug)]
pub struct AssembleOutcome {
    pub output: PathBuf,
    pub merged_tiles: usize,
    /// Tiles that could not be trimmed and were left out of the mosaic
    pub dropped: Vec<TilingError>,
    pub crs_repaired: bool,
}

/// Scratch directory for trimmed tiles, next to the output.
pub fn trim_dir_for(out_path: &Path) -> PathBuf {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "mosaic".to_string());
    out_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(format!(".trim_{}", stem))
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    path.with_file_name(name)
}

/// Re-cut every predicted tile against its original, halo-free vector.
/// The result is ordered by tile identity.
pub fn trim_halo(
    predicted: &[PathBuf],
    tile_vectors: &[PathBuf],
    trim_dir: &Path,
    nodata: f64,
    raster: &dyn RasterOps,
    pool: &WorkerPool,
) -> Result<TileOutcome> {
    fs::create_dir_all(trim_dir)?;

    let vectors: HashMap<TileKey, &PathBuf> = tile_vectors
        .iter()
        .filter_map(|v| TileKey::from_path_suffix(v).map(|k| (k, v)))
        .collect();

    let results: Vec<(TileKey, Result<PathBuf>)> = pool.install(|| {
        predicted
            .par_iter()
            .filter_map(|tile| {
                let Some(key) = TileKey::from_path_suffix(tile) else {
                    warn!("{} has no tile identity, skipping", tile.display());
                    return None;
                };
                let result = match vectors.get(&key) {
                    None => Err(TilingError::tile_failed(key.to_string(), "no tile vector")),
                    Some(vector) => {
                        let file_name = tile.file_name().unwrap_or_default();
                        let dst = trim_dir.join(file_name);
                        raster
                            .clip_to_geometry(tile, vector, nodata, &dst)
                            .map(|_| dst)
                            .map_err(|e| TilingError::tile_failed(key.to_string(), e))
                    }
                };
                if let Err(e) = &result {
                    warn!("Trim failed, dropping tile from mosaic: {}", e);
                }
                Some((key, result))
            })
            .collect()
    });

    Ok(TileOutcome::collect(results))
}

/// Force a CRS onto `path` when it carries none. Returns whether it had to.
fn repair_crs(
    path: &Path,
    explicit: Option<u32>,
    from_source: Option<u32>,
    raster: &dyn RasterOps,
) -> Result<bool> {
    if raster.crs_code(path)?.is_some() {
        return Ok(false);
    }
    let epsg = crs::resolve_epsg(explicit, from_source)?;
    warn!("{} lost its CRS, assigning EPSG:{}", path.display(), epsg);
    raster.force_crs(path, epsg)?;
    Ok(true)
}

/// Reassemble per-tile predictions into one raster at `out_path`.
///
/// With a halo the tiles are first trimmed back to their grid cells, so the
/// manifest tiles the plane without overlap. A tile that fails to trim is
/// dropped; an empty manifest or a failed merge aborts. The scratch
/// directory is removed only on success.
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    predicted: &[PathBuf],
    tile_vectors: &[PathBuf],
    src_raster: &Path,
    out_path: &Path,
    roi_footprint: Option<&Path>,
    spec: &AssembleSpec,
    raster: &dyn RasterOps,
    pool: &WorkerPool,
) -> Result<AssembleOutcome> {
    if predicted.is_empty() {
        error!("Nothing to assemble into {}", out_path.display());
        return Err(TilingError::MergeFailed("manifest is empty".to_string()));
    }

    let source = raster.metadata(src_raster)?;

    let trim_dir = trim_dir_for(out_path);
    let (manifest, dropped) = if spec.halo_pixels > 0 {
        info!(
            "Trimming {} px halo from {} predicted tiles",
            spec.halo_pixels,
            predicted.len()
        );
        let trimmed = trim_halo(predicted, tile_vectors, &trim_dir, spec.nodata, raster, pool)?;
        (trimmed.paths, trimmed.errors)
    } else {
        (predicted.to_vec(), Vec::new())
    };

    if manifest.is_empty() {
        error!("Every tile failed to trim, nothing to merge");
        return Err(TilingError::MergeFailed(
            "manifest is empty after trimming".to_string(),
        ));
    }

    if let Some(parent) = out_path.parent() {
        fs::create_dir_all(parent)?;
    }
    if out_path.exists() {
        fs::remove_file(out_path)?;
    }

    info!("Merging {} tiles into {}", manifest.len(), out_path.display());
    raster
        .merge(&manifest, out_path, source.pixel_width, spec.nodata)
        .map_err(|e| TilingError::MergeFailed(e.to_string()))?;

    let mut crs_repaired = repair_crs(out_path, spec.epsg, source.epsg, raster)?;

    if let Some(roi) = roi_footprint {
        let clipped = sibling_with_suffix(out_path, "_clip");
        debug!("Clipping mosaic to {}", roi.display());
        raster.clip_to_geometry(out_path, roi, spec.nodata, &clipped)?;
        fs::remove_file(out_path)?;
        fs::rename(&clipped, out_path)?;
        crs_repaired |= repair_crs(out_path, spec.epsg, source.epsg, raster)?;
    }

    if spec.halo_pixels > 0 && trim_dir.exists() {
        fs::remove_dir_all(&trim_dir)?;
    }

    info!(
        "Assembled {} tiles into {} ({} dropped)",
        manifest.len(),
        out_path.display(),
        dropped.len()
    );

    Ok(AssembleOutcome {
        output: out_path.to_path_buf(),
        merged_tiles: manifest.len(),
        dropped,
        crs_repaired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Extent, MultiPolygon};
    use crate::grid::build_grid;
    use crate::test_utils::{metadata, touch_all, FakeRaster};
    use crate::vector::to_wkt;

    struct Fixture {
        dir: tempfile::TempDir,
        predicted: Vec<PathBuf>,
        vectors: Vec<PathBuf>,
    }

    fn fixture(keys: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let fp = MultiPolygon::from(Extent::new(0.0, 100.0, 0.0, 100.0).to_polygon());
        let cells = build_grid(&fp, 50.0, 50.0).unwrap();

        let mut predicted = Vec::new();
        let mut vectors = Vec::new();
        fs::create_dir_all(dir.path().join("vec")).unwrap();
        for key in keys {
            let cell = cells.iter().find(|c| c.sub_name == *key).unwrap();
            let v = dir.path().join("vec").join(format!("vec_{}.gpkg", key));
            fs::write(&v, to_wkt(&MultiPolygon::from(cell.extent().to_polygon()))).unwrap();
            vectors.push(v);
            predicted.push(dir.path().join("pred").join(format!("pred_img_{}.tif", key)));
        }
        touch_all(&predicted);
        Fixture {
            dir,
            predicted,
            vectors,
        }
    }

    fn raster() -> FakeRaster {
        FakeRaster {
            crs: Some(2154),
            ..Default::default()
        }
        .with_metadata("src.tif", metadata(Extent::new(0.0, 100.0, 0.0, 100.0), 0.5, 3, Some(2154)))
    }

    fn spec(halo: usize) -> AssembleSpec {
        AssembleSpec {
            halo_pixels: halo,
            nodata: -9999.0,
            epsg: None,
        }
    }

    #[test]
    fn test_single_tile_without_halo() {
        let f = fixture(&["l2c1"]);
        let r = raster();
        let pool = WorkerPool::new(2).unwrap();
        let out = f.dir.path().join("out").join("mosaic.tif");

        let res = assemble(&f.predicted, &f.vectors, Path::new("src.tif"), &out, None, &spec(0), &r, &pool)
            .unwrap();
        assert_eq!(res.output, out);
        assert_eq!(res.merged_tiles, 1);
        assert!(!res.crs_repaired);
        // Manifest is the untouched input list
        assert_eq!(r.merged.lock().unwrap()[0], f.predicted);
        assert_eq!(r.clip_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_halo_trim_pairs_by_identity_and_sorts() {
        let f = fixture(&["l2c2", "l1c1", "l2c1"]);
        let r = raster();
        let pool = WorkerPool::new(2).unwrap();
        let out = f.dir.path().join("mosaic.tif");

        let mut vectors = f.vectors.clone();
        vectors.reverse();
        assemble(&f.predicted, &vectors, Path::new("src.tif"), &out, None, &spec(8), &r, &pool).unwrap();

        let manifest = r.merged.lock().unwrap()[0].clone();
        let names: Vec<String> = manifest
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["pred_img_l1c1.tif", "pred_img_l2c1.tif", "pred_img_l2c2.tif"]);
        // Scratch directory removed on success
        assert!(!trim_dir_for(&out).exists());
    }

    fn extent_of_wkt(wkt: &str) -> Extent {
        let nums: Vec<f64> = wkt
            .trim_start_matches("MULTIPOLYGON (((")
            .trim_end_matches(")))")
            .split(|c| c == ',' || c == ' ')
            .filter(|t| !t.is_empty())
            .map(|t| t.parse().unwrap())
            .collect();
        let xs = nums.iter().step_by(2);
        let ys = nums.iter().skip(1).step_by(2);
        Extent::new(
            xs.clone().cloned().fold(f64::MAX, f64::min),
            xs.cloned().fold(f64::MIN, f64::max),
            ys.clone().cloned().fold(f64::MAX, f64::min),
            ys.cloned().fold(f64::MIN, f64::max),
        )
    }

    #[test]
    fn test_trimmed_manifest_does_not_overlap() {
        let f = fixture(&["l1c1", "l1c2", "l2c1", "l2c2"]);
        let r = raster();
        let pool = WorkerPool::new(2).unwrap();
        let trim_dir = f.dir.path().join("trim");

        let trimmed = trim_halo(&f.predicted, &f.vectors, &trim_dir, -9999.0, &r, &pool).unwrap();
        assert_eq!(trimmed.paths.len(), 4);

        // The fake clip writes "<source name>|<cutline WKT>"
        let extents: Vec<Extent> = trimmed
            .paths
            .iter()
            .map(|p| {
                let content = fs::read_to_string(p).unwrap();
                extent_of_wkt(content.split('|').nth(1).unwrap())
            })
            .collect();

        let total: f64 = extents.iter().map(Extent::area).sum();
        assert!((total - 100.0 * 100.0).abs() < 1e-9);
        for (i, a) in extents.iter().enumerate() {
            for b in &extents[i + 1..] {
                assert!(a.intersection(b).is_none());
            }
        }
    }

    #[test]
    fn test_failed_trim_is_dropped() {
        let f = fixture(&["l1c1", "l1c2"]);
        let r = raster().failing_on("pred_img_l1c2.tif");
        let pool = WorkerPool::new(2).unwrap();
        let out = f.dir.path().join("mosaic.tif");

        let res = assemble(&f.predicted, &f.vectors, Path::new("src.tif"), &out, None, &spec(4), &r, &pool)
            .unwrap();
        assert_eq!(res.merged_tiles, 1);
        assert_eq!(res.dropped.len(), 1);
    }

    #[test]
    fn test_empty_manifest_fails() {
        let r = raster();
        let pool = WorkerPool::new(1).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("mosaic.tif");
        let err = assemble(&[], &[], Path::new("src.tif"), &out, None, &spec(0), &r, &pool).unwrap_err();
        assert!(matches!(err, TilingError::MergeFailed(_)));

        // Every tile failing its trim empties the manifest too
        let f = fixture(&["l1c1"]);
        let r = raster().failing_on("pred_img_l1c1.tif");
        let err = assemble(&f.predicted, &f.vectors, Path::new("src.tif"), &out, None, &spec(2), &r, &pool)
            .unwrap_err();
        assert!(matches!(err, TilingError::MergeFailed(_)));
        // Scratch directory is left for diagnosis
        assert!(trim_dir_for(&out).exists());
    }

    #[test]
    fn test_merge_failure_is_fatal() {
        let f = fixture(&["l1c1"]);
        let r = FakeRaster {
            fail_merge: true,
            ..raster()
        };
        let pool = WorkerPool::new(1).unwrap();
        let out = f.dir.path().join("mosaic.tif");
        let err = assemble(&f.predicted, &f.vectors, Path::new("src.tif"), &out, None, &spec(0), &r, &pool)
            .unwrap_err();
        assert!(matches!(err, TilingError::MergeFailed(_)));
    }

    #[test]
    fn test_missing_crs_is_repaired() {
        let f = fixture(&["l1c1"]);
        let r = FakeRaster {
            crs: None,
            ..raster()
        };
        let pool = WorkerPool::new(1).unwrap();
        let out = f.dir.path().join("mosaic.tif");
        let spec = AssembleSpec {
            epsg: Some(32631),
            ..spec(0)
        };
        let res = assemble(&f.predicted, &f.vectors, Path::new("src.tif"), &out, None, &spec, &r, &pool)
            .unwrap();
        assert!(res.crs_repaired);
        assert_eq!(r.forced.lock().unwrap()[0], (out.clone(), 32631));
    }

    #[test]
    fn test_roi_clip_replaces_merge() {
        let f = fixture(&["l1c1", "l2c1"]);
        let r = raster();
        let pool = WorkerPool::new(1).unwrap();
        let out = f.dir.path().join("mosaic.tif");
        let roi = f.dir.path().join("roi.gpkg");
        fs::write(&roi, "ROI").unwrap();

        assemble(&f.predicted, &f.vectors, Path::new("src.tif"), &out, Some(&roi), &spec(0), &r, &pool)
            .unwrap();
        // The fake clip writes "<source name>|<geometry text>"
        assert_eq!(fs::read_to_string(&out).unwrap(), "mosaic.tif|ROI");
        assert!(!f.dir.path().join("mosaic_clip.tif").exists());
    }
}
