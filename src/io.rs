use crate::backend::RasterOps;
use crate::crs;
use crate::error::{Result, TilingError};
use crate::geometry::Extent;
use crate::tools::{self, OutputOptions};
use gdal::raster::RasterBand;
use gdal::Dataset;
use log::debug;
use ndarray::Array2;
use std::fs;
use std::path::{Path, PathBuf};

/// Pixels per side of the window used when scanning a band.
const SCAN_CHUNK_SIZE: usize = 2000;

#[derive(Debug, Clone)]
pub struct RasterMetadata {
    pub width: usize,
    pub height: usize,
    pub band_count: usize,
    pub geotransform: [f64; 6],
    pub projection: String,
    pub epsg: Option<u32>,
    pub nodata: Option<f64>,
    pub pixel_width: f64,
    pub pixel_height: f64,
}

impl RasterMetadata {
    pub fn extent(&self) -> Extent {
        Extent::from_geotransform(&self.geotransform, self.width, self.height)
    }
}

/// Extract metadata from a dataset without reading any pixels
pub fn extract_metadata_from_dataset(dataset: &Dataset) -> Result<RasterMetadata> {
    let rasterband: RasterBand = dataset.rasterband(1)?;

    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    if width == 0 || height == 0 {
        return Err(TilingError::InvalidDimensions(width, height));
    }

    let nodata = rasterband.no_data_value();
    let geotransform = dataset.geo_transform()?;
    let pixel_width = geotransform[1].abs();
    let pixel_height = geotransform[5].abs();

    if pixel_width <= 0.0 {
        return Err(TilingError::InvalidPixelSize(pixel_width));
    }

    Ok(RasterMetadata {
        width,
        height,
        band_count: dataset.raster_count() as usize,
        geotransform,
        projection: dataset.projection(),
        epsg: crs::epsg_from_dataset(dataset),
        nodata,
        pixel_width,
        pixel_height,
    })
}

/// Read a window of one band into a row-major array
pub fn read_window(
    rasterband: &RasterBand,
    offset: (usize, usize),
    size: (usize, usize),
) -> Result<Array2<f64>> {
    let (x, y) = offset;
    let (w, h) = size;
    let buffer = rasterband.read_as::<f64>((x as isize, y as isize), (w, h), (w, h), None)?;
    let data_vec: Vec<f64> = buffer.into_iter().collect();
    Ok(Array2::from_shape_vec((h, w), data_vec)?)
}

/// Count pixels equal to `value` in a band, scanning window by window so a
/// tile is never fully resident. A NaN `value` matches NaN pixels.
pub fn count_equal_in_band(dataset: &Dataset, band: usize, value: f64) -> Result<u64> {
    let rasterband = dataset.rasterband(band)?;
    let width = rasterband.x_size() as usize;
    let height = rasterband.y_size() as usize;

    let matches = |v: &f64| if value.is_nan() { v.is_nan() } else { *v == value };

    let mut count = 0u64;
    for y_offset in (0..height).step_by(SCAN_CHUNK_SIZE) {
        let y_size = SCAN_CHUNK_SIZE.min(height - y_offset);
        for x_offset in (0..width).step_by(SCAN_CHUNK_SIZE) {
            let x_size = SCAN_CHUNK_SIZE.min(width - x_offset);
            let window = read_window(&rasterband, (x_offset, y_offset), (x_size, y_size))?;
            count += window.iter().filter(|v| matches(*v)).count() as u64;
        }
    }
    Ok(count)
}

fn open(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )
        .into());
    }
    Dataset::open(path).map_err(|e| TilingError::unavailable(path, e))
}

/// GDAL-backed raster operations. Cuts and merges go through the GDAL
/// command-line utilities, reads and CRS edits through the bindings.
#[derive(Debug, Clone, Default)]
pub struct GdalRaster {
    pub output: OutputOptions,
}

impl GdalRaster {
    pub fn new(output: OutputOptions) -> Self {
        Self { output }
    }
}

impl RasterOps for GdalRaster {
    fn metadata(&self, path: &Path) -> Result<RasterMetadata> {
        let dataset = open(path)?;
        extract_metadata_from_dataset(&dataset)
    }

    fn clip_to_extent(&self, src: &Path, extent: &Extent, nodata: f64, dst: &Path) -> Result<()> {
        tools::translate_window(src, extent, nodata, dst)
    }

    fn clip_to_geometry(
        &self,
        src: &Path,
        geometry: &Path,
        nodata: f64,
        dst: &Path,
    ) -> Result<()> {
        tools::warp_to_cutline(src, geometry, nodata, dst)
    }

    fn count_pixels_equal(&self, path: &Path, band: usize, value: f64) -> Result<u64> {
        let dataset = open(path)?;
        let count = count_equal_in_band(&dataset, band, value)?;
        debug!("{}: band {} has {} pixels equal to {}", path.display(), band, count, value);
        Ok(count)
    }

    fn merge(&self, manifest: &[PathBuf], dst: &Path, pixel_size: f64, nodata: f64) -> Result<()> {
        let list_path = dst.with_extension("list.txt");
        let vrt_path = dst.with_extension("vrt");

        tools::write_file_list(&list_path, manifest)?;
        tools::build_vrt(&list_path, &vrt_path, pixel_size, nodata)?;
        tools::translate_with_options(&vrt_path, dst, &self.output)?;

        fs::remove_file(&list_path)?;
        fs::remove_file(&vrt_path)?;
        Ok(())
    }

    fn crs_code(&self, path: &Path) -> Result<Option<u32>> {
        let dataset = open(path)?;
        Ok(crs::epsg_from_dataset(&dataset))
    }

    fn force_crs(&self, path: &Path, epsg: u32) -> Result<()> {
        crs::assign_epsg(path, epsg)
    }
}
