mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{wait_until, CountingPool, Gate, ScriptedSource, WAIT};
use gigaview_core::config::ViewerConfig;
use gigaview_core::decoder::SyntheticSource;
use gigaview_core::error::GigaviewError;
use gigaview_core::geometry::{Rect, Size};
use gigaview_core::manager::{SessionState, ViewerEvent};
use gigaview_core::pool::ReusePool;
use gigaview_core::tile::TileStatus;
use gigaview_core::view::HugeImageView;
use gigaview_core::viewport::ScaleMode;

const IMAGE: Size = Size::new(256, 128);
const WIDE_IMAGE: Size = Size::new(1024, 128);
const SURFACE: Size = Size::new(128, 64);

fn test_config() -> ViewerConfig {
    ViewerConfig {
        tile_size: 64,
        shutdown_timeout_ms: 2_000,
        ..Default::default()
    }
}

fn new_view(pool: &Arc<CountingPool>) -> HugeImageView {
    HugeImageView::new(test_config(), pool.clone(), SURFACE).unwrap()
}

fn settle(view: &mut HugeImageView) {
    assert!(wait_until(WAIT, || {
        view.pump();
        view.is_idle()
    }));
}

fn all_ready(view: &HugeImageView) -> bool {
    let statuses = view.tile_statuses();
    !statuses.is_empty() && statuses.iter().all(|(_, s)| *s == TileStatus::Ready)
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

#[test]
fn test_bind_decodes_visible_tiles() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let source = ScriptedSource::new(IMAGE);

    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    assert!(view.is_bound());
    assert!((view.viewport().scale() - 0.5).abs() < 1e-12);
    assert_eq!(view.visible_source_rect(), Rect::from_size(IMAGE));

    settle(&mut view);
    assert_eq!(view.tile_statuses().len(), 8);
    assert!(all_ready(&view));
    assert_eq!(view.snapshot().len(), 8);
    assert!(view.events().try_iter().any(|e| e == ViewerEvent::Invalidate));
}

#[test]
fn test_bind_rejects_unprobeable_source() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let err = view
        .bind(Arc::new(SyntheticSource::new(Size::new(0, 10))), ScaleMode::Fit)
        .unwrap_err();
    assert!(matches!(err, GigaviewError::InvalidDimensions { .. }));
    assert!(!view.is_bound());
    assert!(view.snapshot().is_empty());
}

#[test]
fn test_new_rejects_invalid_config() {
    let config = ViewerConfig {
        tile_size: 1,
        ..Default::default()
    };
    assert!(HugeImageView::new(config, CountingPool::new(), SURFACE).is_err());
}

#[test]
fn test_unbind_releases_everything() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let source = ScriptedSource::new(IMAGE);
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);

    view.unbind();
    assert!(!view.is_bound());
    assert!(view.source().is_none());
    assert!(view.tile_statuses().is_empty());
    assert!(view.visible_source_rect().is_empty());
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.double_releases(), 0);
    assert_eq!(source.script.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rebind_replaces_session() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let first = ScriptedSource::new(IMAGE);
    view.bind(first.shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);

    let second = ScriptedSource::new(WIDE_IMAGE);
    view.bind(second.shared(), ScaleMode::Fit).unwrap();
    assert_eq!(first.script.closes.load(Ordering::SeqCst), 1);
    assert_eq!(view.viewport().image_size(), WIDE_IMAGE);

    settle(&mut view);
    assert!(all_ready(&view));
    assert_eq!(second.script.opens.load(Ordering::SeqCst), 1);
    assert_eq!(view.source().unwrap().name(), second.shared().name());
}

// ---------------------------------------------------------------------------
// Gestures
// ---------------------------------------------------------------------------

#[test]
fn test_drag_defers_refresh_until_gesture_ends() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let source = ScriptedSource::new(WIDE_IMAGE);
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);

    view.zoom_to(1.0, 0.0, 32.0, false);
    assert_eq!(view.visible_source_rect(), Rect::new(0, 32, 128, 96));
    settle(&mut view);
    let before = source.script.decoded().len();

    view.on_drag(-256.0, 0.0);
    assert!(view.is_dragging());
    assert_eq!(view.visible_source_rect(), Rect::new(256, 32, 384, 96));
    assert!(!view.is_idle());
    std::thread::sleep(std::time::Duration::from_millis(20));
    view.pump();
    assert_eq!(source.script.decoded().len(), before);

    view.end_gesture();
    assert!(!view.is_dragging());
    settle(&mut view);
    let new_decodes = &source.script.decoded()[before..];
    assert_eq!(new_decodes.len(), 4);
    assert!(new_decodes.iter().all(|(rect, sample)| {
        *sample == 1 && rect.intersects(&Rect::new(256, 32, 384, 96))
    }));
}

#[test]
fn test_pinch_defers_refresh() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let source = ScriptedSource::new(WIDE_IMAGE);
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);
    let before = source.script.decoded().len();

    view.on_scale(8.0, 0.0, 32.0);
    assert!(view.is_scaling());
    assert!(view.motion().is_moving());
    view.pump();
    assert_eq!(source.script.decoded().len(), before);

    view.end_gesture();
    settle(&mut view);
    assert!(source.script.decoded().len() > before);
    assert_eq!(view.manager().unwrap().sample_size(), Some(1));
    assert!(view
        .tile_statuses()
        .iter()
        .all(|(_, s)| matches!(s, TileStatus::Ready | TileStatus::Unneeded)));
}

#[test]
fn test_invalid_rotation_leaves_view_unchanged() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let source = ScriptedSource::new(IMAGE);
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);
    view.events().try_iter().count();
    let before = view.viewport().transform();

    assert!(view.rotate_to(45).is_err());
    assert_eq!(view.viewport().transform(), before);
    assert_eq!(view.events().try_iter().count(), 0);
}

#[test]
fn test_rotate_refreshes_tiles() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let source = ScriptedSource::new(IMAGE);
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);

    view.rotate_by(90).unwrap();
    assert_eq!(view.viewport().rotation().degrees(), 90);
    settle(&mut view);
    assert!(view
        .tile_statuses()
        .iter()
        .all(|(_, s)| matches!(s, TileStatus::Ready | TileStatus::Unneeded)));
    assert!(view.events().try_iter().any(|e| e == ViewerEvent::Invalidate));
}

// ---------------------------------------------------------------------------
// Surface lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_paused_surface_decodes_nothing_until_resumed() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    view.set_paused(true);
    let source = ScriptedSource::new(IMAGE);
    view.bind(source.shared(), ScaleMode::Fit).unwrap();

    assert_eq!(view.manager().unwrap().state(), SessionState::Paused);
    std::thread::sleep(std::time::Duration::from_millis(20));
    view.pump();
    assert!(source.script.decoded().is_empty());

    view.set_paused(false);
    assert!(!view.is_paused());
    settle(&mut view);
    assert!(all_ready(&view));
}

#[test]
fn test_pause_mid_decode_keeps_pool_balanced() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    let gate = Gate::closed();
    let source = ScriptedSource::with_gate(IMAGE, gate.clone());
    view.bind(source.shared(), ScaleMode::Fit).unwrap();
    let script = Arc::clone(&source.script);
    assert!(wait_until(WAIT, || script.entered.load(Ordering::SeqCst) == 1));
    assert!(view.is_region_loading(&Rect::from_size(IMAGE)));

    view.set_paused(true);
    assert!(!view.is_region_loading(&Rect::from_size(IMAGE)));
    gate.release();
    std::thread::sleep(std::time::Duration::from_millis(20));
    view.pump();
    assert!(view.tile_statuses().is_empty());

    view.unbind();
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.double_releases(), 0);
}

#[test]
fn test_notify_called_from_worker() {
    let pool = CountingPool::new();
    let wakes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&wakes);
    let mut view = new_view(&pool).with_notify(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    view.bind(ScriptedSource::new(IMAGE).shared(), ScaleMode::Fit).unwrap();
    settle(&mut view);
    assert!(wakes.load(Ordering::SeqCst) >= 8);
}

#[test]
fn test_open_failure_surfaces_once() {
    let pool = CountingPool::new();
    let mut view = new_view(&pool);
    view.bind(ScriptedSource::failing_open(IMAGE).shared(), ScaleMode::Fit)
        .unwrap();
    settle(&mut view);

    assert_eq!(view.manager().unwrap().state(), SessionState::Failed);
    let failures = view
        .events()
        .try_iter()
        .filter(|e| matches!(e, ViewerEvent::SessionFailed { .. }))
        .count();
    assert_eq!(failures, 1);
    assert!(view
        .tile_statuses()
        .iter()
        .all(|(_, s)| *s == TileStatus::Failed));
}

#[test]
fn test_synthetic_source_with_reuse_pool() {
    let pool = Arc::new(ReusePool::new(1 << 20));
    let mut view = HugeImageView::new(test_config(), pool.clone(), SURFACE).unwrap();
    view.bind(Arc::new(SyntheticSource::new(Size::new(4096, 2048))), ScaleMode::Fit)
        .unwrap();
    settle(&mut view);
    assert!(all_ready(&view));

    view.zoom_to(view.scale_bounds().max, 64.0, 32.0, false);
    settle(&mut view);
    view.unbind();
    assert!(pool.stats().released > 0);
}
