use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Args;
use gigaview_core::manager::ViewerEvent;
use gigaview_core::pool::ReusePool;
use gigaview_core::render::{draw_overlay, Canvas};
use gigaview_core::tile::TileStatus;
use gigaview_core::view::HugeImageView;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::warn;

use super::{load_config, open_input, parse_point, parse_size, ScaleModeArg};

const PUMP_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Args)]
pub struct RenderArgs {
    /// Image file, GVRASTER file, or synthetic:WxH
    pub input: String,

    /// Surface size in device pixels
    #[arg(long, default_value = "1024x768")]
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

    /// Outline tiles by status and the visible rect
    #[arg(long)]
    pub overlay: bool,

    /// Background colour as R,G,B
    #[arg(long, default_value = "32,32,32")]
    pub background: String,

    /// Buffer pool budget in MiB
    #[arg(long, default_value = "64")]
    pub pool_mb: usize,

    /// Give up waiting for tiles after this many seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Viewer config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Output PNG path
    #[arg(short, long, default_value = "frame.png")]
    pub output: PathBuf,
}

pub fn run(args: &RenderArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let source = open_input(&args.input)?;
    let surface = parse_size(&args.surface)?;
    let background = parse_rgb(&args.background)?;

    let pool = Arc::new(ReusePool::new(args.pool_mb * 1024 * 1024));
    let mut view = HugeImageView::new(config, pool.clone(), surface)?;
    view.bind(Arc::clone(&source), args.mode.into())
        .with_context(|| format!("Failed to bind {}", source.name()))?;

    view.rotate_to(args.rotate).context("Invalid rotation")?;
    if let Some(scale) = args.scale {
        view.zoom_to(
            scale,
            surface.width as f64 / 2.0,
            surface.height as f64 / 2.0,
            false,
        );
    }
    if let Some(ref center) = args.center {
        let (x, y) = parse_point(center)?;
        view.locate(x, y, false);
    }

    let started = Instant::now();
    wait_for_tiles(&mut view, Duration::from_secs(args.timeout))?;
    let elapsed = started.elapsed();

    let mut canvas = Canvas::new(surface, background);
    canvas.paint(view.viewport(), &view.snapshot());
    let statuses = view.tile_statuses();
    if args.overlay {
        draw_overlay(&mut canvas, view.viewport(), &statuses);
    }

    crate::summary::print_render_summary(&crate::summary::RenderSummary {
        source: source.name(),
        surface,
        viewport: view.viewport(),
        statuses: &statuses,
        pool: pool.stats(),
        elapsed,
        output: &args.output,
    });

    view.unbind();
    canvas
        .into_image()?
        .save(&args.output)
        .with_context(|| format!("Failed to save {}", args.output.display()))?;
    println!("Saved to {}", args.output.display());

    Ok(())
}

/// Pump decode results until every needed tile has settled.
fn wait_for_tiles(view: &mut HugeImageView, timeout: Duration) -> Result<()> {
    let pb = ProgressBar::new(needed(view));
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg:12} [{bar:40}] {pos}/{len} tiles")?
            .progress_chars("=> "),
    );
    pb.set_message("Decoding");

    let deadline = Instant::now() + timeout;
    loop {
        view.pump_timeout(PUMP_INTERVAL);
        for event in view.events().try_iter() {
            match event {
                ViewerEvent::SessionFailed { message } => {
                    pb.abandon_with_message("Failed");
                    bail!("Decoder could not be opened: {message}");
                }
                ViewerEvent::DecodeFailures { consecutive } => {
                    warn!(consecutive, "repeated tile decode failures");
                }
                ViewerEvent::Invalidate => {}
            }
        }

        pb.set_length(needed(view));
        pb.set_position(settled(view));
        if view.is_idle() {
            break;
        }
        if Instant::now() >= deadline {
            pb.abandon_with_message("Timed out");
            bail!("Tiles still decoding after {}s", timeout.as_secs());
        }
    }

    pb.finish_with_message("Done");
    Ok(())
}

fn needed(view: &HugeImageView) -> u64 {
    view.tile_statuses()
        .iter()
        .filter(|(_, s)| *s != TileStatus::Unneeded)
        .count() as u64
}

fn settled(view: &HugeImageView) -> u64 {
    view.tile_statuses()
        .iter()
        .filter(|(_, s)| matches!(s, TileStatus::Ready | TileStatus::Failed))
        .count() as u64
}

fn parse_rgb(s: &str) -> Result<[u8; 4]> {
    let parts: Vec<u8> = s
        .split(',')
        .map(|p| p.trim().parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid colour '{s}'"))?;
    match parts.as_slice() {
        [r, g, b] => Ok([*r, *g, *b, 255]),
        _ => bail!("Colour '{s}' must be R,G,B"),
    }
}
