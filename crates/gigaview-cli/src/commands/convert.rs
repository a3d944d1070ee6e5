use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gigaview_core::decoder::RasterWriter;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};

#[derive(Args)]
pub struct ConvertArgs {
    /// Input image file (any format the image crate reads)
    pub file: PathBuf,

    /// Keep only luminance (one channel)
    #[arg(long)]
    pub gray: bool,

    /// Output raster path
    #[arg(short, long, default_value = "image.gvr")]
    pub output: PathBuf,
}

pub fn run(args: &ConvertArgs) -> Result<()> {
    let img = image::open(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let (width, height) = (img.width(), img.height());
    println!("Loaded {}x{} image", width, height);

    let gray = args.gray || matches!(img, DynamicImage::ImageLuma8(_));
    let (channels, data) = if gray {
        (1u16, img.to_luma8().into_raw())
    } else {
        (4u16, img.to_rgba8().into_raw())
    };
    drop(img);

    let mut writer = RasterWriter::create(&args.output, width, height, channels)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let pb = ProgressBar::new(height as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len} rows")?
            .progress_chars("=> "),
    );
    pb.set_message("Writing");

    let row_bytes = writer.header().row_bytes();
    for row in data.chunks_exact(row_bytes) {
        writer.write_row(row)?;
        pb.inc(1);
    }
    writer.finish()?;
    pb.finish_with_message("Done");

    println!(
        "Saved {}-channel raster to {}",
        channels,
        args.output.display()
    );
    Ok(())
}
