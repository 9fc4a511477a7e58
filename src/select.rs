use crate::error::{Result, TilingError};
use crate::geometry::MultiPolygon;
use crate::grid::GridCell;
use crate::pool::WorkerPool;
use log::{debug, info};
use rayon::prelude::*;

/// Outcome of matching grid cells against the ROI. Both lists are sorted
/// by cell id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub kept: Vec<GridCell>,
    /// Rejected cells whose centroid lies at or east of the ROI's western
    /// bound, available for secondary sampling.
    pub excluded: Vec<GridCell>,
}

enum Verdict {
    Kept,
    Excluded,
    Dropped,
}

fn classify(cell: &GridCell, roi: &MultiPolygon, roi_xmin: f64) -> Verdict {
    let centroid = cell.centroid();
    if roi.contains_strict(centroid) {
        Verdict::Kept
    } else if centroid.0 >= roi_xmin {
        Verdict::Excluded
    } else {
        Verdict::Dropped
    }
}

/// Keep the cells whose centroid is strictly inside `roi`.
///
/// Cells are classified in contiguous batches of `batch_size`; the ROI is
/// immutable and shared, so batches need no handles of their own.
pub fn select_tiles(
    cells: &[GridCell],
    roi: &MultiPolygon,
    batch_size: usize,
    pool: &WorkerPool,
) -> Result<Selection> {
    if roi.is_empty() || roi.area() <= 0.0 {
        return Err(TilingError::InvalidFootprint(
            "ROI is empty or has zero area".to_string(),
        ));
    }
    let roi_xmin = roi
        .bounds()
        .map(|b| b.xmin)
        .ok_or_else(|| TilingError::InvalidFootprint("ROI has no vertices".to_string()))?;

    let batch_size = batch_size.max(1);
    let batches: Vec<Selection> = pool.install(|| {
        cells
            .par_chunks(batch_size)
            .map(|batch| {
                let mut out = Selection::default();
                for cell in batch {
                    match classify(cell, roi, roi_xmin) {
                        Verdict::Kept => out.kept.push(cell.clone()),
                        Verdict::Excluded => out.excluded.push(cell.clone()),
                        Verdict::Dropped => {}
                    }
                }
                out
            })
            .collect()
    });
    debug!("Classified {} cells in {} batches", cells.len(), batches.len());

    let mut selection = Selection::default();
    for batch in batches {
        selection.kept.extend(batch.kept);
        selection.excluded.extend(batch.excluded);
    }
    selection.kept.sort_by_key(|c| c.id);
    selection.excluded.sort_by_key(|c| c.id);

    info!(
        "ROI selection: {} of {} cells kept, {} excluded-adjacent",
        selection.kept.len(),
        cells.len(),
        selection.excluded.len()
    );
    Ok(selection)
}
