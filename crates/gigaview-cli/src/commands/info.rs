use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use gigaview_core::grid::{compute_grid, GridParams};
use gigaview_core::viewport::Viewport;

use super::{load_config, open_input, parse_size, ScaleModeArg};

#[derive(Args)]
pub struct InfoArgs {
    /// Image file, GVRASTER file, or synthetic:WxH
    pub input: String,

    /// Surface size the levels are computed for
    #[arg(long, default_value = "1920x1080")]
    pub surface: String,

    /// Resting scale policy
    #[arg(long, value_enum, default_value = "fit")]
    pub mode: ScaleModeArg,

    /// Viewer config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = open_input(&args.input)?;
    let size = source.probe()?;
    let surface = parse_size(&args.surface)?;

    println!("Source:      {}", source.name());
    println!("Dimensions:  {}", size);
    println!("Megapixels:  {:.1}", size.area() as f64 / 1e6);
    let rgba_mb = size.area() as f64 * 4.0 / (1024.0 * 1024.0);
    println!("RGBA size:   {:.1} MB", rgba_mb);

    let viewport = Viewport::new(size, surface, args.mode.into(), &config);
    let bounds = viewport.bounds();
    println!();
    println!("Surface:     {}", surface);
    println!("Fit scale:   {:.4}", bounds.full);
    println!("Fill scale:  {:.4}", bounds.fill);
    println!("Scale range: {:.4} .. {:.4}", bounds.min, bounds.max);

    let params = GridParams::from(&config);
    println!();
    println!("  {:>8}  {:>6}  {:>9}  {:>9}", "Scale", "Sample", "Tile edge", "Grid");
    for scale in viewport.step_zoom_scales() {
        let grid = compute_grid(size, surface, scale, &params);
        println!(
            "  {:>8.4}  {:>6}  {:>9}  {:>9}",
            scale,
            grid.sample_size,
            grid.tile_edge,
            format!("{}x{}", grid.columns, grid.rows)
        );
    }

    Ok(())
}
