use crate::error::{Result, TilingError};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use log::{info, warn};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrsKind {
    Projected,
    Geographic,
    Unknown,
}

/// EPSG code of a dataset's spatial reference, if it has one
pub fn epsg_from_dataset(dataset: &Dataset) -> Option<u32> {
    let spatial_ref = dataset.spatial_ref().ok()?;
    spatial_ref.auth_code().ok().and_then(|code| u32::try_from(code).ok())
}

/// Classify a projection so tile sizes in ground units can be sanity-checked
pub fn classify_projection(projection_wkt: &str) -> CrsKind {
    if projection_wkt.trim().is_empty() {
        return CrsKind::Unknown;
    }

    let spatial_ref = match SpatialRef::from_wkt(projection_wkt) {
        Ok(sr) => sr,
        Err(e) => {
            warn!("Failed to parse projection WKT: {}", e);
            return CrsKind::Unknown;
        }
    };

    if spatial_ref.is_geographic() {
        CrsKind::Geographic
    } else if spatial_ref.is_projected() {
        CrsKind::Projected
    } else {
        CrsKind::Unknown
    }
}

/// Resolve the CRS used when a merge drops georeferencing: an explicit
/// code wins over the one read from the source raster.
pub fn resolve_epsg(explicit: Option<u32>, from_source: Option<u32>) -> Result<u32> {
    explicit.or(from_source).ok_or_else(|| {
        TilingError::CrsError("no EPSG code given and none found on the source raster".to_string())
    })
}

/// Overwrite the spatial reference of a raster in place
pub fn assign_epsg(path: &Path, epsg: u32) -> Result<()> {
    let options = DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
        ..Default::default()
    };
    let mut dataset = Dataset::open_ex(path, options)?;
    let spatial_ref = SpatialRef::from_epsg(epsg)
        .map_err(|e| TilingError::CrsError(format!("EPSG:{}: {}", epsg, e)))?;
    dataset.set_spatial_ref(&spatial_ref)?;
    info!("Assigned EPSG:{} to {}", epsg, path.display());
    Ok(())
}
