//! Thin wrappers around the GDAL command-line utilities.

use crate::error::{Result, TilingError};
use crate::geometry::Extent;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Creation options for the assembled raster.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputOptions {
    pub compression: String,
    pub block_size: usize,
}

impl Default for OutputOptions {
    fn default() -> Self {
        Self {
            compression: "DEFLATE".to_string(),
            block_size: 512,
        }
    }
}

impl OutputOptions {
    pub fn new(compression: &str, block_size: usize) -> Result<Self> {
        validate_compression(compression)?;
        validate_block_size(block_size)?;
        Ok(Self {
            compression: compression.to_string(),
            block_size,
        })
    }

    /// `-co` values for a tiled GeoTIFF
    pub fn creation_options(&self) -> Vec<String> {
        vec![
            format!("COMPRESS={}", self.compression),
            "TILED=YES".to_string(),
            format!("BLOCKXSIZE={}", self.block_size),
            format!("BLOCKYSIZE={}", self.block_size),
            "BIGTIFF=IF_SAFER".to_string(),
        ]
    }
}

/// Validate compression type
pub fn validate_compression(compression: &str) -> Result<()> {
    let valid_types = ["DEFLATE", "LZW", "ZSTD", "NONE"];
    if !valid_types.contains(&compression) {
        return Err(TilingError::InvalidCompression(compression.to_string()));
    }
    Ok(())
}

/// Validate block size (must be multiple of 16)
pub fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size % 16 != 0 {
        return Err(TilingError::InvalidBlockSize(block_size));
    }
    Ok(())
}

fn run(tool: &str, args: &[String]) -> Result<()> {
    debug!("{} {}", tool, args.join(" "));

    let output = Command::new(tool).args(args).output().map_err(|e| TilingError::ToolFailed {
        tool: tool.to_string(),
        stderr: format!("could not start: {}", e),
    })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(TilingError::ToolFailed {
            tool: tool.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

/// Arguments for cutting a georeferenced window; areas outside the source
/// are filled with `nodata`.
pub fn translate_window_args(src: &Path, extent: &Extent, nodata: f64, dst: &Path) -> Vec<String> {
    vec![
        "-of".to_string(),
        "GTiff".to_string(),
        "-projwin".to_string(),
        extent.xmin.to_string(),
        extent.ymax.to_string(),
        extent.xmax.to_string(),
        extent.ymin.to_string(),
        "-a_nodata".to_string(),
        nodata.to_string(),
        path_arg(src),
        path_arg(dst),
    ]
}

pub fn translate_window(src: &Path, extent: &Extent, nodata: f64, dst: &Path) -> Result<()> {
    run("gdal_translate", &translate_window_args(src, extent, nodata, dst))
}

pub fn warp_to_cutline_args(src: &Path, cutline: &Path, nodata: f64, dst: &Path) -> Vec<String> {
    vec![
        "-overwrite".to_string(),
        "-of".to_string(),
        "GTiff".to_string(),
        "-cutline".to_string(),
        path_arg(cutline),
        "-crop_to_cutline".to_string(),
        "-srcnodata".to_string(),
        nodata.to_string(),
        "-dstnodata".to_string(),
        nodata.to_string(),
        path_arg(src),
        path_arg(dst),
    ]
}

pub fn warp_to_cutline(src: &Path, cutline: &Path, nodata: f64, dst: &Path) -> Result<()> {
    run("gdalwarp", &warp_to_cutline_args(src, cutline, nodata, dst))
}

/// Write one path per line for `-input_file_list`.
///
/// gdalbuildvrt lets later sources win in overlaps, so the list is written
/// in reverse: earlier manifest entries are never overwritten.
pub fn write_file_list(list_path: &Path, files: &[PathBuf]) -> Result<()> {
    let mut content = String::new();
    for f in files.iter().rev() {
        content.push_str(&f.display().to_string());
        content.push('\n');
    }
    fs::write(list_path, content)?;
    Ok(())
}

pub fn build_vrt(list_path: &Path, vrt_path: &Path, pixel_size: f64, nodata: f64) -> Result<()> {
    let args = vec![
        "-overwrite".to_string(),
        "-resolution".to_string(),
        "user".to_string(),
        "-tr".to_string(),
        pixel_size.to_string(),
        pixel_size.to_string(),
        "-srcnodata".to_string(),
        nodata.to_string(),
        "-vrtnodata".to_string(),
        nodata.to_string(),
        "-input_file_list".to_string(),
        path_arg(list_path),
        path_arg(vrt_path),
    ];
    run("gdalbuildvrt", &args)
}

pub fn translate_with_options(src: &Path, dst: &Path, options: &OutputOptions) -> Result<()> {
    let mut args = vec!["-of".to_string(), "GTiff".to_string()];
    for co in options.creation_options() {
        args.push("-co".to_string());
        args.push(co);
    }
    args.push(path_arg(src));
    args.push(path_arg(dst));
    run("gdal_translate", &args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_compression_valid() {
        assert!(validate_compression("DEFLATE").is_ok());
        assert!(validate_compression("LZW").is_ok());
        assert!(validate_compression("ZSTD").is_ok());
        assert!(validate_compression("NONE").is_ok());
    }

    #[test]
    fn test_validate_compression_invalid() {
        assert!(validate_compression("INVALID").is_err());
        assert!(validate_compression("jpeg").is_err());
    }

    #[test]
    fn test_validate_block_size() {
        assert!(validate_block_size(256).is_ok());
        assert!(validate_block_size(0).is_err());
        assert!(matches!(
            validate_block_size(100),
            Err(TilingError::InvalidBlockSize(100))
        ));
        assert!(matches!(
            OutputOptions::new("LZW", 8),
            Err(TilingError::InvalidBlockSize(8))
        ));
    }

    #[test]
    fn test_creation_options() {
        let opts = OutputOptions::new("LZW", 256).unwrap().creation_options();
        assert_eq!(opts.len(), 5);
        assert!(opts.contains(&"COMPRESS=LZW".to_string()));
        assert!(opts.contains(&"BLOCKXSIZE=256".to_string()));
    }

    #[test]
    fn test_projwin_is_upper_left_then_lower_right() {
        let args = translate_window_args(
            Path::new("in.tif"),
            &Extent::new(10.0, 20.0, 30.0, 40.0),
            -9999.0,
            Path::new("out.tif"),
        );
        let i = args.iter().position(|a| a == "-projwin").unwrap();
        assert_eq!(&args[i + 1..i + 5], &["10", "40", "20", "30"]);
        assert_eq!(args.last().unwrap(), "out.tif");
    }

    #[test]
    fn test_file_list_is_reversed() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("list.txt");
        let files = vec![PathBuf::from("a.tif"), PathBuf::from("b.tif")];
        write_file_list(&list, &files).unwrap();
        assert_eq!(fs::read_to_string(&list).unwrap(), "b.tif\na.tif\n");
    }
}
