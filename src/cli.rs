use crate::config::PipelineConfig;
use crate::error::Result;
use crate::tools::OutputOptions;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tile-pipeline")]
#[command(about = "Cut large rasters into halo tiles and merge tile predictions back")]
#[command(version)]
pub struct Args {
    /// Number of worker threads (default: half of the available cores)
    #[arg(short, long, value_name = "N", global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Tile a raster (and its label raster) and drop no-data tiles
    Preprocess(PreprocessArgs),
    /// Merge predicted tiles into one raster, trimming the halo
    Reassemble(ReassembleArgs),
}

/// Options shared by both subcommands
#[derive(ClapArgs, Debug)]
pub struct TilingArgs {
    /// Tile side in pixels, halo included
    #[arg(long, value_name = "PX", default_value_t = 512)]
    pub tile_size: usize,

    /// Overlap added on each side of a tile, in pixels
    #[arg(long, value_name = "PX", default_value_t = 32)]
    pub halo: usize,

    /// Override nodata value (default: read from input)
    #[arg(long, value_name = "VALUE")]
    pub nodata: Option<f64>,

    /// EPSG code for outputs (default: the source raster's)
    #[arg(long, value_name = "CODE")]
    pub epsg: Option<u32>,
}

#[derive(ClapArgs, Debug)]
pub struct PreprocessArgs {
    /// Input GeoTIFF path
    #[arg(short, long, value_name = "FILE")]
    pub input: PathBuf,

    /// Label raster cut alongside the input
    #[arg(short, long, value_name = "FILE")]
    pub mask: Option<PathBuf>,

    /// Region of interest polygon (default: the raster extent)
    #[arg(short, long, value_name = "FILE")]
    pub roi: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Discard a tile when a band has at least this percentage of no-data
    #[arg(long, value_name = "PERCENT", default_value_t = 50.0)]
    pub nodata_threshold: f64,

    /// Recreate existing tiles and ignore the no-data cache
    #[arg(long)]
    pub overwrite: bool,

    /// Always recount no-data pixels
    #[arg(long)]
    pub no_cache: bool,

    /// Vertex limit for the simplified ROI
    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub max_vertices: usize,

    /// Also cut cells rejected by the ROI into <output>/excluded
    #[arg(long)]
    pub cut_excluded: bool,

    #[arg(long, value_name = "PREFIX", default_value = "img_")]
    pub image_prefix: String,

    #[arg(long, value_name = "PREFIX", default_value = "mask_")]
    pub mask_prefix: String,

    #[arg(long, value_name = "PREFIX", default_value = "vec_")]
    pub vector_prefix: String,
}

#[derive(ClapArgs, Debug)]
pub struct ReassembleArgs {
    /// Directory holding the predicted tiles
    #[arg(short, long, value_name = "DIR")]
    pub predictions: PathBuf,

    /// Directory holding the tile vectors written by `preprocess`
    #[arg(long, value_name = "DIR")]
    pub vectors: PathBuf,

    /// Source raster the tiles were cut from
    #[arg(short, long, value_name = "FILE")]
    pub source: PathBuf,

    /// Output GeoTIFF path
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,

    /// Clip the mosaic to this polygon
    #[arg(short, long, value_name = "FILE")]
    pub roi: Option<PathBuf>,

    #[command(flatten)]
    pub tiling: TilingArgs,

    /// Compression type for the mosaic (DEFLATE, LZW, ZSTD, NONE)
    #[arg(long, value_name = "TYPE", default_value = "DEFLATE")]
    pub compression: String,

    /// Internal block size for the mosaic
    #[arg(long, value_name = "SIZE", default_value_t = 512)]
    pub block_size: usize,
}

impl Args {
    /// Settings for the selected subcommand.
    pub fn to_config(&self) -> Result<PipelineConfig> {
        let mut cfg = PipelineConfig {
            threads: self.threads,
            verbose: self.verbose,
            ..Default::default()
        };
        match &self.command {
            Command::Preprocess(p) => {
                p.tiling.apply(&mut cfg);
                cfg.nodata_threshold = p.nodata_threshold;
                cfg.overwrite = p.overwrite;
                cfg.use_cache = !p.no_cache;
                cfg.max_vertices = p.max_vertices;
                cfg.cut_excluded = p.cut_excluded;
                cfg.image_prefix = p.image_prefix.clone();
                cfg.mask_prefix = p.mask_prefix.clone();
                cfg.vector_prefix = p.vector_prefix.clone();
            }
            Command::Reassemble(r) => {
                r.tiling.apply(&mut cfg);
                cfg.output = OutputOptions::new(&r.compression, r.block_size)?;
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

impl TilingArgs {
    fn apply(&self, cfg: &mut PipelineConfig) {
        cfg.tile_size = self.tile_size;
        cfg.halo = self.halo;
        cfg.nodata = self.nodata;
        cfg.epsg = self.epsg;
    }
}
