use clap::Parser;
use env_logger::Env;
use log::{info, warn};

use geotiff_tiling::cli::{Args, Command};
use geotiff_tiling::error::Result;
use geotiff_tiling::io::GdalRaster;
use geotiff_tiling::pipeline::{self, PreprocessInputs, ReassembleInputs};
use geotiff_tiling::tiles::{RASTER_EXT, VECTOR_EXT};
use geotiff_tiling::vector::GdalVector;

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = args.to_config()?;

    env_logger::Builder::from_env(Env::default().default_filter_or(cfg.log_level())).init();

    info!("=== GeoTIFF Tiling Pipeline ===");

    let raster = GdalRaster::new(cfg.output.clone());
    let vector = GdalVector;

    match &args.command {
        Command::Preprocess(p) => {
            let inputs = PreprocessInputs {
                raster: &p.input,
                mask: p.mask.as_deref(),
                roi: p.roi.as_deref(),
                out_dir: &p.output,
            };
            let report = pipeline::preprocess(&inputs, &cfg, &raster, &vector)?;

            for failure in &report.failures {
                warn!("{}", failure);
            }
            info!(
                "{} tiles kept, {} discarded for no-data{}",
                report.images.len(),
                report.discarded.len(),
                if report.from_cache { " (from cache)" } else { "" }
            );
            if !report.excluded_tiles.is_empty() {
                info!("{} excluded tiles cut", report.excluded_tiles.len());
            }
            info!("Simplified ROI: {}", report.roi_simplified.display());
        }
        Command::Reassemble(r) => {
            let predicted = pipeline::list_files(&r.predictions, RASTER_EXT)?;
            let tile_vectors = pipeline::list_files(&r.vectors, VECTOR_EXT)?;
            info!(
                "Found {} predicted tiles and {} tile vectors",
                predicted.len(),
                tile_vectors.len()
            );

            let inputs = ReassembleInputs {
                predicted: &predicted,
                tile_vectors: &tile_vectors,
                source: &r.source,
                output: &r.output,
                roi: r.roi.as_deref(),
            };
            let outcome = pipeline::reassemble(&inputs, &cfg, &raster)?;

            for dropped in &outcome.dropped {
                warn!("{}", dropped);
            }
            info!(
                "Wrote {} from {} tiles",
                outcome.output.display(),
                outcome.merged_tiles
            );
        }
    }

    info!("=== Done! ===");
    Ok(())
}
