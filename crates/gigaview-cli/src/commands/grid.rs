use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use gigaview_core::grid::{compute_grid, GridParams};
use gigaview_core::viewport::Viewport;

use super::{load_config, open_input, parse_point, parse_size, ScaleModeArg};

#[derive(Args)]
pub struct GridArgs {
    /// Image file, GVRASTER file, or synthetic:WxH
    pub input: String,

    /// Surface size in device pixels
    #[arg(long, default_value = "1920x1080")]
    pub surface: String,

    /// Resting scale policy
    #[arg(long, value_enum, default_value = "fit")]
    pub mode: ScaleModeArg,

    /// Zoom to this scale (clamped to the scale bounds)
    #[arg(long)]
    pub scale: Option<f64>,

    /// Centre the surface on this source point (X,Y)
    #[arg(long)]
    pub center: Option<String>,

    /// Rotation in degrees (multiple of 90)
    #[arg(long, default_value = "0")]
    pub rotate: i32,

    /// List every tile, not only the visible ones
    #[arg(long)]
    pub all: bool,

    /// Viewer config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn run(args: &GridArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = open_input(&args.input)?;
    let size = source.probe()?;
    let surface = parse_size(&args.surface)?;

    let mut viewport = Viewport::new(size, surface, args.mode.into(), &config);
    viewport
        .rotate_to(args.rotate)
        .context("Invalid rotation")?;
    if let Some(scale) = args.scale {
        let centre = (surface.width as f64 / 2.0, surface.height as f64 / 2.0);
        viewport.zoom_to(scale, centre.0, centre.1, false);
    }
    if let Some(ref center) = args.center {
        let (x, y) = parse_point(center)?;
        viewport.locate(x, y, false);
    }

    let visible = viewport.visible_source_rect();
    let grid = compute_grid(size, surface, viewport.scale(), &GridParams::from(&config));

    crate::summary::print_grid_summary(&viewport, &grid);

    let visible_count = grid.covering(&visible).count();
    println!(
        "  {} of {} tiles visible",
        visible_count,
        grid.tiles.len()
    );
    println!();

    for tile in &grid.tiles {
        let shown = tile.cell.intersects(&visible);
        if !shown && !args.all {
            continue;
        }
        println!(
            "  {}({:>3},{:>3})  cell {:<24} decode {}",
            if shown { "*" } else { " " },
            tile.col,
            tile.row,
            tile.cell.to_string(),
            tile.source_rect
        );
    }

    Ok(())
}
