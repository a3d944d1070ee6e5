use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gigaview_core::decoder::synthetic::pattern_pixel;
use gigaview_core::decoder::RasterWriter;
use indicatif::{ProgressBar, ProgressStyle};

use super::parse_size;

#[derive(Args)]
pub struct SynthArgs {
    /// Image size as WIDTHxHEIGHT
    #[arg(long, default_value = "20000x15000")]
    pub size: String,

    /// Output raster path
    #[arg(short, long, default_value = "synthetic.gvr")]
    pub output: PathBuf,
}

/// Stream the synthetic pattern to disk one row at a time, so the size is
/// bounded by disk space rather than memory.
pub fn run(args: &SynthArgs) -> Result<()> {
    let size = parse_size(&args.size)?;
    let mut writer = RasterWriter::create(&args.output, size.width, size.height, 4)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let pb = ProgressBar::new(size.height as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len} rows")?
            .progress_chars("=> "),
    );
    pb.set_message("Generating");

    let mut row = vec![0u8; writer.header().row_bytes()];
    for y in 0..size.height {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&pattern_pixel(x as u32, y, size));
        }
        writer.write_row(&row)?;
        pb.inc(1);
    }
    writer.finish()?;
    pb.finish_with_message("Done");

    let mb = size.area() as f64 * 4.0 / (1024.0 * 1024.0);
    println!("Saved {} raster ({:.1} MB) to {}", size, mb, args.output.display());
    Ok(())
}
