//! In-memory stand-ins for the GIS engine.
//!
//! Rasters are plain text files; their "pixels" are whatever counts the
//! test configures per file name and band.

use crate::backend::{RasterOps, VectorOps};
use crate::error::{Result, TilingError};
use crate::geometry::{Extent, MultiPolygon};
use crate::io::RasterMetadata;
use crate::vector::to_wkt;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn metadata(extent: Extent, pixel_size: f64, band_count: usize, epsg: Option<u32>) -> RasterMetadata {
    RasterMetadata {
        width: (extent.width() / pixel_size).round() as usize,
        height: (extent.height() / pixel_size).round() as usize,
        band_count,
        geotransform: [extent.xmin, pixel_size, 0.0, extent.ymax, 0.0, -pixel_size],
        projection: String::new(),
        epsg,
        nodata: Some(-9999.0),
        pixel_width: pixel_size,
        pixel_height: pixel_size,
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[derive(Default)]
pub struct FakeRaster {
    pub meta: HashMap<String, RasterMetadata>,
    /// (file name, band) -> pixels equal to the queried value
    pub counts: HashMap<(String, usize), u64>,
    /// File names whose clip/count calls fail
    pub failing: HashSet<String>,
    pub crs: Option<u32>,
    pub fail_merge: bool,

    pub count_calls: AtomicUsize,
    pub clip_calls: AtomicUsize,
    pub merged: Mutex<Vec<Vec<PathBuf>>>,
    pub forced: Mutex<Vec<(PathBuf, u32)>>,
}

impl FakeRaster {
    pub fn with_metadata(mut self, name: &str, meta: RasterMetadata) -> Self {
        self.meta.insert(name.to_string(), meta);
        self
    }

    pub fn with_count(mut self, name: &str, band: usize, count: u64) -> Self {
        self.counts.insert((name.to_string(), band), count);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    fn check(&self, path: &Path) -> Result<()> {
        if self.failing.contains(&file_name(path)) {
            return Err(TilingError::ToolFailed {
                tool: "fake".to_string(),
                stderr: format!("refusing {}", path.display()),
            });
        }
        Ok(())
    }
}

impl RasterOps for FakeRaster {
    fn metadata(&self, path: &Path) -> Result<RasterMetadata> {
        self.meta
            .get(&file_name(path))
            .cloned()
            .ok_or_else(|| TilingError::unavailable(path, "no such fake raster"))
    }

    fn clip_to_extent(&self, src: &Path, extent: &Extent, _nodata: f64, dst: &Path) -> Result<()> {
        self.clip_calls.fetch_add(1, Ordering::SeqCst);
        self.check(dst)?;
        fs::write(
            dst,
            format!(
                "{} {} {} {} {}",
                file_name(src),
                extent.xmin,
                extent.xmax,
                extent.ymin,
                extent.ymax
            ),
        )?;
        Ok(())
    }

    fn clip_to_geometry(&self, src: &Path, geometry: &Path, _nodata: f64, dst: &Path) -> Result<()> {
        self.clip_calls.fetch_add(1, Ordering::SeqCst);
        self.check(src)?;
        let wkt = fs::read_to_string(geometry)?;
        fs::write(dst, format!("{}|{}", file_name(src), wkt))?;
        Ok(())
    }

    fn count_pixels_equal(&self, path: &Path, band: usize, _value: f64) -> Result<u64> {
        self.count_calls.fetch_add(1, Ordering::SeqCst);
        if !path.exists() {
            return Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into());
        }
        self.check(path)?;
        Ok(*self.counts.get(&(file_name(path), band)).unwrap_or(&0))
    }

    fn merge(&self, manifest: &[PathBuf], dst: &Path, _pixel_size: f64, _nodata: f64) -> Result<()> {
        if self.fail_merge {
            return Err(TilingError::ToolFailed {
                tool: "fake".to_string(),
                stderr: "merge refused".to_string(),
            });
        }
        let listing: Vec<String> = manifest.iter().map(|p| file_name(p)).collect();
        fs::write(dst, listing.join("\n"))?;
        self.merged.lock().unwrap().push(manifest.to_vec());
        Ok(())
    }

    fn crs_code(&self, path: &Path) -> Result<Option<u32>> {
        let forced = self.forced.lock().unwrap();
        if let Some((_, epsg)) = forced.iter().rev().find(|(p, _)| p == path) {
            return Ok(Some(*epsg));
        }
        Ok(self.crs)
    }

    fn force_crs(&self, path: &Path, epsg: u32) -> Result<()> {
        self.forced.lock().unwrap().push((path.to_path_buf(), epsg));
        Ok(())
    }
}

/// Vector stand-in: reads return `polygons`, writes store WKT text.
#[derive(Default)]
pub struct FakeVector {
    pub polygons: HashMap<String, MultiPolygon>,
    /// File names whose writes fail
    pub failing: HashSet<String>,
    pub writes: AtomicUsize,
    pub simplify_calls: AtomicUsize,
}

impl FakeVector {
    pub fn with_polygon(mut self, name: &str, polygon: MultiPolygon) -> Self {
        self.polygons.insert(name.to_string(), polygon);
        self
    }

    pub fn failing_on(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl VectorOps for FakeVector {
    fn read_polygons(&self, path: &Path) -> Result<MultiPolygon> {
        self.polygons
            .get(&file_name(path))
            .cloned()
            .ok_or_else(|| TilingError::unavailable(path, "no such fake vector"))
    }

    fn simplify(&self, geometry: &MultiPolygon, tolerance: f64) -> Result<MultiPolygon> {
        self.simplify_calls.fetch_add(1, Ordering::SeqCst);
        Ok(geometry.simplify(tolerance))
    }

    fn write_polygon(
        &self,
        path: &Path,
        geometry: &MultiPolygon,
        _epsg: Option<u32>,
        _fields: &[(&str, i64)],
    ) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&file_name(path)) {
            return Err(TilingError::ToolFailed {
                tool: "fake".to_string(),
                stderr: format!("refusing {}", path.display()),
            });
        }
        fs::write(path, to_wkt(geometry))?;
        Ok(())
    }
}

/// Create empty files, returning their paths.
pub fn touch_all(paths: &[PathBuf]) -> Vec<PathBuf> {
    for p in paths {
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, b"").unwrap();
    }
    paths.to_vec()
}
