use crate::backend::VectorOps;
use crate::error::{Result, TilingError};
use crate::geometry::MultiPolygon;
use crate::io::RasterMetadata;
use log::{debug, info, warn};
use std::path::Path;

const MAX_SIMPLIFY_ROUNDS: usize = 32;

/// Simplify with a doubling tolerance, starting at `start_tolerance`, until
/// the footprint has at most `max_vertices` vertices. Returns the footprint
/// as-is when it already fits.
pub fn simplify_to_budget(
    footprint: &MultiPolygon,
    max_vertices: usize,
    start_tolerance: f64,
    vector: &dyn VectorOps,
) -> Result<MultiPolygon> {
    let mut current = footprint.clone();
    let mut tolerance = start_tolerance.max(f64::EPSILON);

    for _ in 0..MAX_SIMPLIFY_ROUNDS {
        if current.vertex_count() <= max_vertices {
            break;
        }
        current = vector.simplify(footprint, tolerance)?;
        debug!(
            "Simplified footprint at tolerance {:.6}: {} vertices",
            tolerance,
            current.vertex_count()
        );
        tolerance *= 2.0;
    }

    if current.vertex_count() > max_vertices {
        warn!(
            "Footprint still has {} vertices after simplification (limit {})",
            current.vertex_count(),
            max_vertices
        );
    }
    Ok(current)
}

/// Footprint of the raster's valid area: the ROI file when given, otherwise
/// the raster's extent. The result is simplified to `max_vertices`.
pub fn build_footprint(
    raster: &RasterMetadata,
    roi_path: Option<&Path>,
    max_vertices: usize,
    vector: &dyn VectorOps,
) -> Result<MultiPolygon> {
    let footprint = match roi_path {
        Some(path) => {
            if !path.exists() {
                return Err(TilingError::unavailable(path, "ROI file does not exist"));
            }
            info!("Reading ROI footprint from {}", path.display());
            vector.read_polygons(path)?
        }
        None => {
            info!("No ROI given, using the raster extent as footprint");
            MultiPolygon::from(raster.extent().to_polygon())
        }
    };

    if footprint.is_empty() || footprint.area() <= 0.0 {
        return Err(TilingError::InvalidFootprint(
            "footprint is empty or has zero area".to_string(),
        ));
    }

    let simplified = simplify_to_budget(&footprint, max_vertices, raster.pixel_width, vector)?;
    info!(
        "Footprint: {} polygon(s), {} -> {} vertices, area {:.1}",
        simplified.0.len(),
        footprint.vertex_count(),
        simplified.vertex_count(),
        simplified.area()
    );
    Ok(simplified)
}
