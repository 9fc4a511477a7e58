use crate::error::{Result, TilingError};
use crate::geometry::{Extent, MultiPolygon};
use log::debug;

/// One cell of the tiling grid. Identity fields are fixed at creation.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCell {
    /// 1-based linear index, row-major
    pub id: usize,
    /// 1-based, row 1 is the northernmost row
    pub row: usize,
    pub col: usize,
    pub sub_name: String,
    /// Lower-left corner
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl GridCell {
    pub fn sub_name_for(row: usize, col: usize) -> String {
        format!("l{}c{}", row, col)
    }

    pub fn extent(&self) -> Extent {
        Extent::new(
            self.origin_x,
            self.origin_x + self.width,
            self.origin_y,
            self.origin_y + self.height,
        )
    }

    /// Cell rectangle grown by `halo_pixels` pixels on every side.
    pub fn halo_extent(&self, halo_pixels: usize, pixel_size: f64) -> Extent {
        self.extent().buffered(halo_pixels as f64 * pixel_size)
    }

    pub fn centroid(&self) -> (f64, f64) {
        self.extent().center()
    }
}

/// Cell boundaries along one axis: `start`, then each full step while a
/// whole cell still fits before `end`, then `end` itself. The last interval
/// may be shorter than `step`.
fn axis_boundaries(start: f64, end: f64, step: f64) -> Vec<f64> {
    let mut bounds = vec![start];
    let mut k = 0usize;
    loop {
        let x = start + k as f64 * step;
        if x >= end - step {
            break;
        }
        k += 1;
        bounds.push(start + k as f64 * step);
    }
    bounds.push(end);
    bounds
}

/// Regular grid over a footprint's bounding box.
pub struct TileGrid {
    xs: Vec<f64>,
    // Descending: ys[0] is ymax
    ys: Vec<f64>,
    pub num_cols: usize,
    pub num_rows: usize,
    pub total_cells: usize,
}

impl TileGrid {
    pub fn new(bounds: &Extent, cell_width: f64, cell_height: f64) -> Result<Self> {
        if !(cell_width > 0.0 && cell_height > 0.0) {
            return Err(TilingError::InvalidFootprint(format!(
                "cell size must be positive, got {}x{}",
                cell_width, cell_height
            )));
        }
        if bounds.area() <= 0.0 {
            return Err(TilingError::InvalidFootprint(
                "bounding box has zero area".to_string(),
            ));
        }

        let xs = axis_boundaries(bounds.xmin, bounds.xmax, cell_width);
        let ys: Vec<f64> = axis_boundaries(-bounds.ymax, -bounds.ymin, cell_height)
            .into_iter()
            .map(|y| -y)
            .collect();

        let num_cols = xs.len() - 1;
        let num_rows = ys.len() - 1;
        let total_cells = num_cols * num_rows;

        debug!(
            "TileGrid: bbox [{:.3}, {:.3}] x [{:.3}, {:.3}], cell {}x{} -> {}x{} cells ({} total)",
            bounds.xmin,
            bounds.xmax,
            bounds.ymin,
            bounds.ymax,
            cell_width,
            cell_height,
            num_cols,
            num_rows,
            total_cells
        );

        Ok(Self {
            xs,
            ys,
            num_cols,
            num_rows,
            total_cells,
        })
    }

    pub fn iter(&self) -> CellIterator<'_> {
        CellIterator::new(self)
    }

    /// Cell for a 0-based linear index (row-major).
    pub fn cell(&self, idx: usize) -> GridCell {
        let j = idx / self.num_cols;
        let i = idx % self.num_cols;
        let (row, col) = (j + 1, i + 1);

        GridCell {
            id: i + j * self.num_cols + 1,
            row,
            col,
            sub_name: GridCell::sub_name_for(row, col),
            origin_x: self.xs[i],
            origin_y: self.ys[j + 1],
            width: self.xs[i + 1] - self.xs[i],
            height: self.ys[j] - self.ys[j + 1],
        }
    }
}

pub struct CellIterator<'a> {
    grid: &'a TileGrid,
    current_idx: usize,
}

impl<'a> CellIterator<'a> {
    fn new(grid: &'a TileGrid) -> Self {
        Self {
            grid,
            current_idx: 0,
        }
    }
}

impl<'a> Iterator for CellIterator<'a> {
    type Item = GridCell;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_idx < self.grid.total_cells {
            let cell = self.grid.cell(self.current_idx);
            self.current_idx += 1;
            Some(cell)
        } else {
            None
        }
    }
}

/// Tile the footprint's bounding box into cells of `cell_width` x
/// `cell_height` ground units.
pub fn build_grid(footprint: &MultiPolygon, cell_width: f64, cell_height: f64) -> Result<Vec<GridCell>> {
    if footprint.is_empty() || footprint.area() <= 0.0 {
        return Err(TilingError::InvalidFootprint(
            "footprint is empty or has zero area".to_string(),
        ));
    }
    let bounds = footprint
        .bounds()
        .ok_or_else(|| TilingError::InvalidFootprint("footprint has no vertices".to_string()))?;

    let grid = TileGrid::new(&bounds, cell_width, cell_height)?;
    Ok(grid.iter().collect())
}
