use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::decoder::ImageSource;
use crate::error::Result;
use crate::geometry::{Rect, Size};
use crate::manager::{MotionState, TileDraw, TileManager, ViewerEvent};
use crate::pool::BufferPool;
use crate::scheduler::{Generation, Notify};
use crate::tile::TileStatus;
use crate::viewport::{ScaleBounds, ScaleMode, Viewport};

/// Host-facing viewer for one surface.
///
/// Owns the viewport, the gesture state and, while a source is bound, the
/// tile manager. Every mutation drains the viewport's events and refreshes
/// the tiles, so the host only has to forward input, call [`HugeImageView::pump`]
/// when woken and repaint on [`ViewerEvent::Invalidate`].
pub struct HugeImageView {
    config: ViewerConfig,
    pool: Arc<dyn BufferPool>,
    generation: Generation,
    notify: Option<Notify>,
    viewport: Viewport,
    manager: Option<TileManager>,
    source: Option<Arc<dyn ImageSource>>,
    dragging: bool,
    scaling: bool,
    paused: bool,
    events_tx: mpsc::Sender<ViewerEvent>,
    events_rx: mpsc::Receiver<ViewerEvent>,
}

impl HugeImageView {
    pub fn new(config: ViewerConfig, pool: Arc<dyn BufferPool>, surface: Size) -> Result<Self> {
        config.validate()?;
        let (events_tx, events_rx) = mpsc::channel();
        let viewport = Viewport::new(Size::default(), surface, ScaleMode::default(), &config);
        Ok(Self {
            config,
            pool,
            generation: Generation::new(),
            notify: None,
            viewport,
            manager: None,
            source: None,
            dragging: false,
            scaling: false,
            paused: false,
            events_tx,
            events_rx,
        })
    }

    /// Run `notify` on the decode worker whenever a result is waiting.
    pub fn with_notify(mut self, notify: Notify) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Repaint and session notifications. One consumer: the paint layer.
    pub fn events(&self) -> &mpsc::Receiver<ViewerEvent> {
        &self.events_rx
    }

    // -----------------------------------------------------------------------
    // Binding
    // -----------------------------------------------------------------------

    /// Show `source`, replacing whatever was bound. Only the cheap probe runs
    /// here; the decoder opens on the worker.
    pub fn bind(&mut self, source: Arc<dyn ImageSource>, mode: ScaleMode) -> Result<()> {
        self.unbind();
        let size = source.probe()?;
        self.generation.advance();
        self.viewport = Viewport::new(size, self.viewport.surface_size(), mode, &self.config);
        let mut manager = TileManager::new(
            Arc::clone(&source),
            &self.config,
            Arc::clone(&self.pool),
            self.generation.clone(),
            self.events_tx.clone(),
            self.notify.clone(),
        )?;
        if self.paused {
            manager.pause();
        }
        info!(source = %source.name(), size = %size, ?mode, "bound");
        self.manager = Some(manager);
        self.source = Some(source);
        self.refresh();
        self.invalidate();
        Ok(())
    }

    pub fn unbind(&mut self) {
        let Some(mut manager) = self.manager.take() else {
            return;
        };
        manager.destroy();
        self.generation.advance();
        self.source = None;
        self.viewport.set_image_size(Size::default());
        self.viewport.take_events();
        info!("unbound");
        self.invalidate();
    }

    pub fn is_bound(&self) -> bool {
        self.manager.is_some()
    }

    pub fn source(&self) -> Option<&Arc<dyn ImageSource>> {
        self.source.as_ref()
    }

    // -----------------------------------------------------------------------
    // Viewport pass-throughs
    // -----------------------------------------------------------------------

    pub fn pan(&mut self, dx: f64, dy: f64) {
        self.viewport.pan(dx, dy);
        self.sync();
    }

    pub fn zoom_to(&mut self, scale: f64, focus_x: f64, focus_y: f64, animate: bool) {
        self.viewport.zoom_to(scale, focus_x, focus_y, animate);
        self.sync();
    }

    pub fn zoom_by(&mut self, factor: f64, focus_x: f64, focus_y: f64) {
        self.viewport.zoom_by(factor, focus_x, focus_y);
        self.sync();
    }

    pub fn rotate_to(&mut self, degrees: i32) -> Result<()> {
        self.viewport.rotate_to(degrees)?;
        self.sync();
        Ok(())
    }

    pub fn rotate_by(&mut self, delta: i32) -> Result<()> {
        self.viewport.rotate_by(delta)?;
        self.sync();
        Ok(())
    }

    /// Centre the surface on a source point.
    pub fn locate(&mut self, x: f64, y: f64, animate: bool) {
        self.viewport.locate(x, y, animate);
        self.sync();
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) {
        self.viewport.set_scale_mode(mode);
        self.sync();
    }

    pub fn set_surface_size(&mut self, size: Size) {
        self.viewport.set_surface_size(size);
        self.sync();
    }

    /// Step running zoom or fling animations.
    pub fn advance(&mut self, dt: Duration) {
        self.viewport.advance(dt);
        self.sync();
    }

    // -----------------------------------------------------------------------
    // Gestures
    // -----------------------------------------------------------------------

    pub fn on_drag(&mut self, dx: f64, dy: f64) {
        self.dragging = true;
        self.viewport.cancel_animation();
        self.pan(dx, dy);
    }

    pub fn on_scale(&mut self, factor: f64, focus_x: f64, focus_y: f64) {
        self.scaling = true;
        self.viewport.cancel_animation();
        self.zoom_by(factor, focus_x, focus_y);
    }

    /// Finger lifted with velocity: the gesture ends and a fling starts.
    pub fn on_fling(&mut self, velocity_x: f64, velocity_y: f64) {
        self.dragging = false;
        self.scaling = false;
        self.viewport.fling(velocity_x, velocity_y);
        self.sync();
    }

    /// Finger lifted without velocity.
    pub fn end_gesture(&mut self) {
        self.dragging = false;
        self.scaling = false;
        self.sync();
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn is_scaling(&self) -> bool {
        self.scaling
    }

    pub fn motion(&self) -> MotionState {
        MotionState {
            dragging: self.dragging,
            scaling: self.scaling,
            animating: self.viewport.is_animating(),
        }
    }

    // -----------------------------------------------------------------------
    // Surface lifecycle
    // -----------------------------------------------------------------------

    /// Pause decoding while the surface is off-screen.
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused == paused {
            return;
        }
        self.paused = paused;
        debug!(paused, "surface visibility changed");
        let motion = self.motion();
        if let Some(manager) = self.manager.as_mut() {
            if paused {
                manager.pause();
            } else {
                manager.resume(&self.viewport, motion);
            }
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Apply decode results that are waiting. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        self.manager.as_mut().map_or(0, TileManager::pump)
    }

    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        self.manager
            .as_mut()
            .map_or(0, |m| m.pump_timeout(timeout))
    }

    pub fn snapshot(&self) -> Vec<TileDraw<'_>> {
        self.manager
            .as_ref()
            .map(|m| m.snapshot(&self.viewport))
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn manager(&self) -> Option<&TileManager> {
        self.manager.as_ref()
    }

    pub fn scale_bounds(&self) -> ScaleBounds {
        self.viewport.bounds()
    }

    pub fn visible_source_rect(&self) -> Rect {
        self.viewport.visible_source_rect()
    }

    pub fn is_region_loading(&self, rect: &Rect) -> bool {
        self.manager
            .as_ref()
            .is_some_and(|m| m.is_region_loading(rect))
    }

    pub fn tile_statuses(&self) -> Vec<(Rect, TileStatus)> {
        self.manager
            .as_ref()
            .map(TileManager::tile_statuses)
            .unwrap_or_default()
    }

    /// No tile waiting for the decoder and no refresh held back.
    pub fn is_idle(&self) -> bool {
        self.manager
            .as_ref()
            .map_or(true, |m| m.is_idle() && !m.has_deferred_refresh())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Forward viewport changes to the tiles. A refresh held back during a
    /// gesture runs here once the motion stops.
    fn sync(&mut self) {
        let changed = !self.viewport.take_events().is_empty();
        let motion = self.motion();
        if let Some(manager) = self.manager.as_mut() {
            if changed || (manager.has_deferred_refresh() && !motion.is_moving()) {
                manager.refresh(&self.viewport, motion);
            }
        }
        if changed {
            self.invalidate();
        }
    }

    fn refresh(&mut self) {
        self.viewport.take_events();
        let motion = self.motion();
        if let Some(manager) = self.manager.as_mut() {
            manager.refresh(&self.viewport, motion);
        }
    }

    fn invalidate(&self) {
        let _ = self.events_tx.send(ViewerEvent::Invalidate);
    }
}
