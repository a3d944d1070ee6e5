use std::path::Path;
use std::time::Duration;

use console::Style;
use gigaview_core::geometry::{Rect, Size};
use gigaview_core::grid::TileGrid;
use gigaview_core::pool::PoolStats;
use gigaview_core::tile::TileStatus;
use gigaview_core::viewport::Viewport;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    good: Style,
    bad: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            good: Style::new().green(),
            bad: Style::new().red(),
            path: Style::new().underlined(),
        }
    }
}

pub struct RenderSummary<'a> {
    pub source: String,
    pub surface: Size,
    pub viewport: &'a Viewport,
    pub statuses: &'a [(Rect, TileStatus)],
    pub pool: PoolStats,
    pub elapsed: Duration,
    pub output: &'a Path,
}

pub fn print_render_summary(summary: &RenderSummary<'_>) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Gigaview Render"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(15)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Source"),
        s.path.apply_to(&summary.source)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(summary.output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Surface"),
        s.value.apply_to(summary.surface)
    );
    println!();

    print_viewport_section(&s, summary.viewport);

    let count = |status: TileStatus| summary.statuses.iter().filter(|(_, t)| *t == status).count();
    println!("  {}", s.header.apply_to("Tiles"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Ready"),
        s.good.apply_to(count(TileStatus::Ready))
    );
    let failed = count(TileStatus::Failed);
    if failed > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Failed"),
            s.bad.apply_to(failed)
        );
    }
    let unneeded = count(TileStatus::Unneeded);
    if unneeded > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Superseded"),
            s.value.apply_to(unneeded)
        );
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Time"),
        s.value.apply_to(format!("{:.2}s", summary.elapsed.as_secs_f64()))
    );
    println!();

    println!("  {}", s.header.apply_to("Buffer Pool"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Reused"),
        s.value.apply_to(format!(
            "{} of {}",
            summary.pool.hits,
            summary.pool.hits + summary.pool.misses
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Pooled"),
        s.value.apply_to(format!(
            "{:.1} MB",
            summary.pool.pooled_bytes as f64 / (1024.0 * 1024.0)
        ))
    );
    println!();
}

pub fn print_grid_summary(viewport: &Viewport, grid: &TileGrid) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Gigaview Tile Grid"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(18)));
    println!();

    print_viewport_section(&s, viewport);

    println!("  {}", s.header.apply_to("Grid"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Sample"),
        s.value.apply_to(grid.sample_size)
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Tile edge"),
        s.value.apply_to(format!("{} px", grid.tile_edge))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Border"),
        s.value.apply_to(format!("{} px", grid.border))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Layout"),
        s.value.apply_to(format!("{}x{}", grid.columns, grid.rows))
    );
    println!();
}

fn print_viewport_section(s: &Styles, viewport: &Viewport) {
    let bounds = viewport.bounds();
    println!("  {}", s.header.apply_to("Viewport"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Image"),
        s.value.apply_to(viewport.image_size())
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Scale"),
        s.value.apply_to(format!(
            "{:.4} ({:.4} .. {:.4})",
            viewport.scale(),
            bounds.min,
            bounds.max
        ))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Rotation"),
        s.value.apply_to(format!("{}\u{b0}", viewport.rotation().degrees()))
    );
    println!(
        "    {:<12}{}",
        s.label.apply_to("Visible"),
        s.value.apply_to(viewport.visible_source_rect())
    );
    println!();
}
