mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{wait_until, CountingPool, ScriptedSource, TILE_COLOR, WAIT};
use gigaview_core::config::ViewerConfig;
use gigaview_core::decoder::synthetic::pattern_pixel;
use gigaview_core::decoder::{ImageSource, SyntheticSource};
use gigaview_core::geometry::Size;
use gigaview_core::pool::ReusePool;
use gigaview_core::render::{
    draw_overlay, status_color, Canvas, FAILED_PLACEHOLDER, OVERLAY_FAILED, OVERLAY_READY,
    OVERLAY_VISIBLE_RECT,
};
use gigaview_core::tile::TileStatus;
use gigaview_core::view::HugeImageView;
use gigaview_core::viewport::ScaleMode;

const BACKGROUND: [u8; 4] = [0, 0, 0, 255];
const SURFACE: Size = Size::new(128, 64);

fn test_config() -> ViewerConfig {
    ViewerConfig {
        tile_size: 64,
        shutdown_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn settled_view(source: Arc<dyn ImageSource>, surface: Size) -> HugeImageView {
    let mut view = HugeImageView::new(test_config(), CountingPool::new(), surface).unwrap();
    view.bind(source, ScaleMode::Fit).unwrap();
    assert!(wait_until(WAIT, || {
        view.pump();
        view.is_idle()
    }));
    view
}

fn paint(view: &HugeImageView) -> Canvas {
    let size = view.viewport().surface_size();
    let mut canvas = Canvas::new(size, BACKGROUND);
    canvas.paint(view.viewport(), &view.snapshot());
    canvas
}

// ---------------------------------------------------------------------------
// Painting
// ---------------------------------------------------------------------------

#[test]
fn test_ready_tiles_cover_surface() {
    let view = settled_view(ScriptedSource::new(Size::new(256, 128)).shared(), SURFACE);
    let canvas = paint(&view);
    for (x, y) in [(0, 0), (127, 63), (64, 32), (31, 40)] {
        assert_eq!(canvas.pixel(x, y), Some(TILE_COLOR), "pixel ({x}, {y})");
    }
}

#[test]
fn test_letterbox_keeps_background() {
    let view = settled_view(ScriptedSource::new(Size::new(256, 64)).shared(), SURFACE);
    let canvas = paint(&view);
    assert_eq!(canvas.pixel(5, 2), Some(BACKGROUND));
    assert_eq!(canvas.pixel(5, 60), Some(BACKGROUND));
    assert_eq!(canvas.pixel(5, 20), Some(TILE_COLOR));
}

#[test]
fn test_nothing_painted_before_tiles_ready() {
    let pool = CountingPool::new();
    let mut view = HugeImageView::new(test_config(), pool, SURFACE).unwrap();
    let mut canvas = Canvas::new(SURFACE, BACKGROUND);
    canvas.paint(view.viewport(), &view.snapshot());
    assert!(canvas.data().chunks_exact(4).all(|p| p == BACKGROUND));

    let source = ScriptedSource::new(Size::new(256, 128));
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    let mut canvas = Canvas::new(SURFACE, BACKGROUND);
    // Tiles are only pending until pumped.
    canvas.paint(view.viewport(), &view.snapshot());
    assert!(canvas.data().chunks_exact(4).all(|p| p == BACKGROUND));
}

#[test]
fn test_failed_tiles_show_placeholder() {
    let source = ScriptedSource::new(Size::new(256, 128));
    source.script.fail_decodes.store(true, Ordering::SeqCst);
    let view = settled_view(source.shared(), SURFACE);
    assert!(view
        .tile_statuses()
        .iter()
        .all(|(_, s)| *s == TileStatus::Failed));

    let canvas = paint(&view);
    assert_eq!(canvas.pixel(10, 10), Some(FAILED_PLACEHOLDER));
}

#[test]
fn test_origin_scale_reproduces_source_pixels() {
    let size = Size::new(256, 128);
    let surface = Size::new(256, 128);
    let mut view = HugeImageView::new(test_config(), Arc::new(ReusePool::new(0)), surface).unwrap();
    view.bind(Arc::new(SyntheticSource::new(size)), ScaleMode::Origin)
        .unwrap();
    assert!(wait_until(WAIT, || {
        view.pump();
        view.is_idle()
    }));

    let canvas = paint(&view);
    for (x, y) in [(0, 0), (5, 3), (100, 70), (255, 127), (130, 64)] {
        assert_eq!(canvas.pixel(x, y), Some(pattern_pixel(x, y, size)));
    }
}

#[test]
fn test_rotated_paint_maps_back_to_source() {
    let size = Size::new(256, 128);
    let surface = Size::new(256, 128);
    let mut view = HugeImageView::new(test_config(), Arc::new(ReusePool::new(0)), surface).unwrap();
    view.bind(Arc::new(SyntheticSource::new(size)), ScaleMode::Origin)
        .unwrap();
    view.rotate_to(180).unwrap();
    assert!(wait_until(WAIT, || {
        view.pump();
        view.is_idle()
    }));

    let canvas = paint(&view);
    for (x, y) in [(0, 0), (5, 3), (100, 70), (255, 127)] {
        assert_eq!(
            canvas.pixel(x, y),
            Some(pattern_pixel(255 - x, 127 - y, size)),
            "pixel ({x}, {y})"
        );
    }
}

#[test]
fn test_canvas_into_image() {
    let view = settled_view(ScriptedSource::new(Size::new(256, 128)).shared(), SURFACE);
    let img = paint(&view).into_image().unwrap();
    assert_eq!(img.dimensions(), (128, 64));
    assert_eq!(img.get_pixel(64, 32).0, TILE_COLOR);
}

// ---------------------------------------------------------------------------
// Overlay
// ---------------------------------------------------------------------------

#[test]
fn test_overlay_outlines_tiles_and_visible_rect() {
    let view = settled_view(ScriptedSource::new(Size::new(256, 128)).shared(), SURFACE);
    let mut canvas = paint(&view);
    draw_overlay(&mut canvas, view.viewport(), &view.tile_statuses());

    // Visible rect is the whole surface and is drawn last.
    assert_eq!(canvas.pixel(0, 0), Some(OVERLAY_VISIBLE_RECT));
    assert_eq!(canvas.pixel(127, 63), Some(OVERLAY_VISIBLE_RECT));
    // Boundary between the first two tile columns.
    assert_eq!(canvas.pixel(32, 10), Some(OVERLAY_READY));
    assert_eq!(canvas.pixel(31, 10), Some(OVERLAY_READY));
    // Tile interior untouched.
    assert_eq!(canvas.pixel(16, 16), Some(TILE_COLOR));
}

#[test]
fn test_status_colors_distinct() {
    let statuses = [
        TileStatus::Unneeded,
        TileStatus::Pending,
        TileStatus::Loading,
        TileStatus::Ready,
        TileStatus::Failed,
    ];
    let colors: Vec<_> = statuses.iter().map(|s| status_color(*s)).collect();
    for (i, a) in colors.iter().enumerate() {
        for b in &colors[i + 1..] {
            assert_ne!(a, b);
        }
    }
    assert_eq!(status_color(TileStatus::Failed), OVERLAY_FAILED);
}
