use crate::backend::VectorOps;
use crate::error::{Result, TilingError};
use crate::geometry::MultiPolygon;
use crate::grid::GridCell;
use crate::pool::WorkerPool;
use crate::tiles::{TileFamily, TileKey, TileOutcome};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fs;
use std::path::PathBuf;

/// Write every cell as its own single-feature polygon file carrying its
/// `id`, `row` and `col`.
pub fn split_cells(
    cells: &[GridCell],
    family: &TileFamily,
    epsg: Option<u32>,
    overwrite: bool,
    vector: &dyn VectorOps,
    pool: &WorkerPool,
) -> TileOutcome {
    if let Err(e) = fs::create_dir_all(&family.dir) {
        return TileOutcome {
            paths: Vec::new(),
            errors: vec![TilingError::unavailable(&family.dir, e)],
        };
    }

    let results: Vec<(TileKey, Result<PathBuf>)> = pool.install(|| {
        cells
            .par_iter()
            .map(|cell| {
                let key = TileKey::of(cell);
                let path = family.path(key);
                if path.exists() && !overwrite {
                    debug!("Keeping existing tile vector {}", path.display());
                    return (key, Ok(path));
                }

                let geometry = MultiPolygon::from(cell.extent().to_polygon());
                let fields = [
                    ("id", cell.id as i64),
                    ("row", cell.row as i64),
                    ("col", cell.col as i64),
                ];
                let result = vector
                    .write_polygon(&path, &geometry, epsg, &fields)
                    .map(|_| path)
                    .map_err(|e| {
                        warn!("Tile {}: could not write vector: {}", key, e);
                        TilingError::tile_failed(key.to_string(), e)
                    });
                (key, result)
            })
            .collect()
    });

    let outcome = TileOutcome::collect(results);
    info!(
        "Split {} cells into tile vectors ({} failed)",
        outcome.paths.len(),
        outcome.errors.len()
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Extent;
    use crate::grid::build_grid;
    use crate::test_utils::FakeVector;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_split_writes_one_file_per_cell() {
        let dir = tempfile::tempdir().unwrap();
        let family = TileFamily::new(dir.path().join("vec"), "v_", "gpkg");
        let fp = MultiPolygon::from(Extent::new(0.0, 100.0, 0.0, 100.0).to_polygon());
        let cells = build_grid(&fp, 50.0, 50.0).unwrap();
        let vector = FakeVector::default();
        let pool = WorkerPool::new(2).unwrap();

        let out = split_cells(&cells, &family, Some(2154), false, &vector, &pool);
        assert!(out.errors.is_empty());
        assert_eq!(out.paths.len(), 4);
        assert_eq!(out.paths[2], dir.path().join("vec").join("v_l2c1.gpkg"));
        let wkt = fs::read_to_string(&out.paths[2]).unwrap();
        assert!(wkt.contains("0 0, 50 0, 50 50, 0 50, 0 0"));

        // Existing files are kept unless overwriting
        let again = split_cells(&cells, &family, Some(2154), false, &vector, &pool);
        assert_eq!(again.paths, out.paths);
        assert_eq!(vector.writes.load(Ordering::SeqCst), 4);
        split_cells(&cells, &family, Some(2154), true, &vector, &pool);
        assert_eq!(vector.writes.load(Ordering::SeqCst), 8);
    }
}
