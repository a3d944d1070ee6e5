//! Tile refresh and decode-result handling.
//!
//! The manager runs on the UI thread. It diffs the grid for the current
//! viewport against the cached tiles and applies decode results as they
//! arrive.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::config::ViewerConfig;
use crate::consts::MAX_PUMP_WAIT;
use crate::decoder::ImageSource;
use crate::error::Result;
use crate::geometry::{Rect, RectF, Size};
use crate::grid::{compute_grid, GridParams, TileGrid};
use crate::pool::BufferPool;
use crate::scheduler::{
    DecodeEvent, DecodeRequest, DecodeScheduler, Generation, Notify, TileResult,
};
use crate::tile::{Tile, TileKey, TileState, TileStatus};
use crate::viewport::Viewport;

/// Notifications for the paint layer, delivered on one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViewerEvent {
    /// Something visible changed; call `snapshot` and repaint.
    Invalidate,
    /// The source could not be opened. The session stays failed until a new
    /// source is bound.
    SessionFailed { message: String },
    /// Tile decodes have failed this many times in a row.
    DecodeFailures { consecutive: u32 },
}

/// Motion the host is in the middle of. Refresh is held back while any of it
/// is going on and runs once it settles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MotionState {
    pub dragging: bool,
    pub scaling: bool,
    pub animating: bool,
}

impl MotionState {
    pub fn is_moving(&self) -> bool {
        self.dragging || self.scaling || self.animating
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Paused,
    /// Decoder open failed; terminal.
    Failed,
    Destroyed,
}

/// One tile as the paint layer sees it.
#[derive(Debug)]
pub struct TileDraw<'a> {
    /// The tile's source rect projected to device pixels.
    pub device_rect: RectF,
    pub tile: &'a Tile,
}

/// Tile cache for one bound source.
///
/// Lives on the UI thread. Decodes run on a [`DecodeScheduler`] worker and
/// come back through [`TileManager::pump`]. Every buffer that reaches the
/// manager goes back to the pool exactly once: on eviction, or right away
/// when the result is stale.
pub struct TileManager {
    config: ViewerConfig,
    params: GridParams,
    source_name: String,
    pool: Arc<dyn BufferPool>,
    generation: Generation,
    scheduler: Option<DecodeScheduler>,
    decode_events: mpsc::Receiver<DecodeEvent>,
    viewer_events: mpsc::Sender<ViewerEvent>,
    tiles: HashMap<TileKey, Tile>,
    state: SessionState,
    /// Grid and visible rect of the last effective refresh.
    grid: Option<TileGrid>,
    visible: Rect,
    decoder_size: Option<Size>,
    deferred_refresh: bool,
    consecutive_failures: u32,
    failures_reported: bool,
}

impl TileManager {
    pub fn new(
        source: Arc<dyn ImageSource>,
        config: &ViewerConfig,
        pool: Arc<dyn BufferPool>,
        generation: Generation,
        viewer_events: mpsc::Sender<ViewerEvent>,
        notify: Option<Notify>,
    ) -> Result<Self> {
        config.validate()?;
        let source_name = source.name();
        let (tx, rx) = mpsc::channel();
        let scheduler = DecodeScheduler::spawn(
            source,
            Arc::clone(&pool),
            generation.clone(),
            tx,
            notify,
            config.shutdown_timeout(),
        )?;
        info!(source = %source_name, generation = generation.current(), "tile session started");

        Ok(Self {
            config: config.clone(),
            params: GridParams::from(config),
            source_name,
            pool,
            generation,
            scheduler: Some(scheduler),
            decode_events: rx,
            viewer_events,
            tiles: HashMap::new(),
            state: SessionState::Active,
            grid: None,
            visible: Rect::default(),
            decoder_size: None,
            deferred_refresh: false,
            consecutive_failures: 0,
            failures_reported: false,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn generation(&self) -> u64 {
        self.generation.current()
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tile(&self, key: &TileKey) -> Option<&Tile> {
        self.tiles.get(key)
    }

    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Sample size of the current grid.
    pub fn sample_size(&self) -> Option<u32> {
        self.grid.as_ref().map(|g| g.sample_size)
    }

    pub fn grid(&self) -> Option<&TileGrid> {
        self.grid.as_ref()
    }

    /// Image size reported by the decoder once it opened.
    pub fn decoder_size(&self) -> Option<Size> {
        self.decoder_size
    }

    pub fn has_deferred_refresh(&self) -> bool {
        self.deferred_refresh
    }

    /// No tile is waiting for the decoder.
    pub fn is_idle(&self) -> bool {
        !self.tiles.values().any(Tile::is_in_flight)
    }

    /// Whether any tile overlapping `rect` is still being decoded.
    pub fn is_region_loading(&self, rect: &Rect) -> bool {
        self.tiles
            .values()
            .any(|t| t.is_in_flight() && t.cell().intersects(rect))
    }

    /// Every cached tile's cell and status. Tiles left over from a previous
    /// grid show as `Unneeded`.
    pub fn tile_statuses(&self) -> Vec<(Rect, TileStatus)> {
        let mut statuses: Vec<_> = self
            .tiles
            .values()
            .map(|t| {
                let status = if self.is_current(t) {
                    TileStatus::from(t.state)
                } else {
                    TileStatus::Unneeded
                };
                (t.cell(), status)
            })
            .collect();
        statuses.sort_by_key(|(rect, _)| (rect.top, rect.left));
        statuses
    }

    /// Cached tiles projected to device space in paint order: leftovers from
    /// previous grids first, coarsest level first, then the current grid on
    /// top. Tiles whose projection is not finite are skipped.
    pub fn snapshot(&self, viewport: &Viewport) -> Vec<TileDraw<'_>> {
        let transform = viewport.transform();
        let mut draws: Vec<_> = self
            .tiles
            .values()
            .filter_map(|tile| {
                let device_rect = transform.map_rect(&tile.source_rect)?;
                Some(TileDraw { device_rect, tile })
            })
            .collect();
        draws.sort_by(|a, b| {
            self.is_current(a.tile)
                .cmp(&self.is_current(b.tile))
                .then(b.tile.sample_size().cmp(&a.tile.sample_size()))
                .then(a.tile.key.cell.cmp(&b.tile.key.cell))
        });
        draws
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Bring the cache in line with what `viewport` shows: queue decodes for
    /// missing tiles and evict tiles that drifted out of range.
    pub fn refresh(&mut self, viewport: &Viewport, motion: MotionState) {
        match self.state {
            SessionState::Active => {}
            state => {
                trace!(?state, "refresh skipped");
                return;
            }
        }
        if motion.is_moving() {
            if !self.deferred_refresh {
                trace!(?motion, "refresh deferred while moving");
            }
            self.deferred_refresh = true;
            return;
        }
        self.deferred_refresh = false;

        let visible = viewport.visible_source_rect();
        if visible.is_empty() {
            debug!("nothing visible, clearing tiles");
            self.clear();
            return;
        }
        if self.config.clear_at_min_scale && viewport.is_at_min_scale() {
            debug!("at min scale, clearing tiles");
            self.clear();
            return;
        }

        let image = viewport.image_size();
        let grid = compute_grid(image, viewport.surface_size(), viewport.scale(), &self.params);
        if grid.is_empty() {
            self.clear();
            return;
        }
        let margin = self.config.eviction_margin_tiles.saturating_mul(grid.tile_edge);
        let keep = visible.expand(margin, image);
        let generation = self.generation.current();

        let needed: Vec<_> = grid
            .covering(&visible)
            .map(|t| (TileKey::new(t.cell, grid.sample_size), t.source_rect))
            .collect();
        let mut queued = 0usize;
        for (key, source_rect) in needed {
            let requeue = match self.tiles.get_mut(&key) {
                None => {
                    self.tiles
                        .insert(key, Tile::pending(key, source_rect, generation));
                    true
                }
                Some(tile)
                    if tile.state == TileState::Failed
                        && tile.attempts < self.config.max_tile_attempts =>
                {
                    tile.state = TileState::Pending;
                    tile.generation = generation;
                    true
                }
                Some(_) => false,
            };
            if requeue {
                self.enqueue(key, source_rect, generation);
                queued += 1;
            }
        }

        let evicted = self.evict_where(|tile| {
            if grid.contains_key(&tile.key) {
                !tile.cell().intersects(&keep)
            } else {
                // Previous grid: only ready tiles still showing something stay.
                !tile.is_ready() || !tile.cell().intersects(&visible)
            }
        });

        debug!(
            sample_size = grid.sample_size,
            visible = %visible,
            queued,
            evicted,
            tiles = self.tiles.len(),
            "refresh"
        );
        self.grid = Some(grid);
        self.visible = visible;
        self.prune_superseded();
    }

    // -----------------------------------------------------------------------
    // Decode results
    // -----------------------------------------------------------------------

    /// Handle every decode event already waiting. Returns how many were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.decode_events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Like [`TileManager::pump`], but wait up to `timeout` for the first
    /// event. The wait is capped at [`MAX_PUMP_WAIT`].
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.decode_events.recv_timeout(timeout.min(MAX_PUMP_WAIT)) {
            Ok(event) => {
                self.handle_event(event);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    fn handle_event(&mut self, event: DecodeEvent) {
        match event {
            DecodeEvent::Opened { size } => self.on_opened(size),
            DecodeEvent::OpenFailed { message } => self.on_open_failed(message),
            DecodeEvent::Started {
                key,
                generation,
                ticket,
            } => self.on_started(key, generation, ticket),
            DecodeEvent::Completed(result) => self.on_tile_ready(result),
        }
    }

    fn on_opened(&mut self, size: Size) {
        debug!(source = %self.source_name, size = %size, "decoder ready");
        self.decoder_size = Some(size);
    }

    fn on_started(&mut self, key: TileKey, generation: u64, ticket: u64) {
        if let Some(tile) = self.tiles.get_mut(&key) {
            if tile.generation == generation
                && tile.ticket == Some(ticket)
                && tile.state == TileState::Pending
            {
                tile.state = TileState::Loading;
            }
        }
    }

    fn on_open_failed(&mut self, message: String) {
        if matches!(self.state, SessionState::Failed | SessionState::Destroyed) {
            return;
        }
        warn!(source = %self.source_name, %message, "session failed");
        self.state = SessionState::Failed;
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.cancel_all();
        }
        for tile in self.tiles.values_mut() {
            if let Some(buffer) = tile.buffer.take() {
                self.pool.release(buffer);
            }
            tile.state = TileState::Failed;
        }
        self.send(ViewerEvent::SessionFailed { message });
        self.send(ViewerEvent::Invalidate);
    }

    /// Apply one decode result. Stale results, results for tiles no longer
    /// cached, and results of a request the tile is no longer waiting on are
    /// dropped and their buffer returned to the pool.
    pub fn on_tile_ready(&mut self, result: TileResult) {
        let TileResult {
            key,
            generation,
            ticket,
            outcome,
        } = result;

        let live = self.generation.is_live(generation) && self.state == SessionState::Active;
        let tile = self.tiles.get_mut(&key).filter(|t| {
            live && t.generation == generation && t.ticket == Some(ticket) && t.is_in_flight()
        });
        let Some(tile) = tile else {
            debug!(rect = %key.cell, generation, "discarding stale decode result");
            if let Ok(buffer) = outcome {
                self.pool.release(buffer);
            }
            return;
        };

        match outcome {
            Ok(buffer) => {
                trace!(rect = %key.cell, sample_size = key.sample_size, "tile ready");
                tile.state = TileState::Ready;
                tile.ticket = None;
                tile.buffer = Some(buffer);
                self.consecutive_failures = 0;
                self.failures_reported = false;
                self.prune_superseded();
            }
            Err(e) => {
                tile.state = TileState::Failed;
                tile.ticket = None;
                tile.attempts += 1;
                let attempts = tile.attempts;
                warn!(rect = %key.cell, attempts, error = %e, "tile decode failed");
                if attempts >= self.config.max_tile_attempts {
                    warn!(rect = %key.cell, "giving up on tile");
                }
                self.consecutive_failures += 1;
                let threshold = self.config.failure_notify_threshold;
                if threshold > 0 && self.consecutive_failures >= threshold && !self.failures_reported {
                    self.failures_reported = true;
                    self.send(ViewerEvent::DecodeFailures {
                        consecutive: self.consecutive_failures,
                    });
                }
            }
        }
        self.send(ViewerEvent::Invalidate);
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Stop decoding. Queued and running decodes are invalidated; ready tiles
    /// stay drawable.
    pub fn pause(&mut self) {
        if self.state != SessionState::Active {
            return;
        }
        self.generation.advance();
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.cancel_all();
        }
        let dropped = self.evict_where(|t| t.is_in_flight());
        self.state = SessionState::Paused;
        debug!(dropped, kept = self.tiles.len(), "paused");
    }

    pub fn resume(&mut self, viewport: &Viewport, motion: MotionState) {
        if self.state != SessionState::Paused {
            return;
        }
        self.state = SessionState::Active;
        debug!("resumed");
        self.refresh(viewport, motion);
    }

    /// Tear the session down: evict everything, invalidate in-flight work and
    /// stop the worker, which closes the decoder.
    pub fn destroy(&mut self) {
        if self.state == SessionState::Destroyed {
            return;
        }
        let evicted = self.evict_where(|_| true);
        self.generation.advance();
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.shutdown();
        }
        self.state = SessionState::Destroyed;
        self.grid = None;
        self.visible = Rect::default();
        // Results that raced the shutdown.
        let drained = self.pump();
        info!(source = %self.source_name, evicted, drained, "tile session destroyed");
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn enqueue(&mut self, key: TileKey, source_rect: Rect, generation: u64) {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return;
        };
        let request = DecodeRequest {
            key,
            source_rect,
            generation,
        };
        match scheduler.enqueue(request) {
            Ok(ticket) => {
                if let Some(tile) = self.tiles.get_mut(&key) {
                    tile.ticket = Some(ticket);
                }
            }
            Err(e) => warn!(rect = %key.cell, error = %e, "decode request rejected"),
        }
    }

    /// Remove every tile matching `evict`, returning its buffer to the pool.
    fn evict_where(&mut self, mut evict: impl FnMut(&Tile) -> bool) -> usize {
        let keys: Vec<TileKey> = self
            .tiles
            .values()
            .filter(|t| evict(t))
            .map(|t| t.key)
            .collect();
        for key in &keys {
            self.evict(key);
        }
        keys.len()
    }

    fn evict(&mut self, key: &TileKey) {
        let Some(mut tile) = self.tiles.remove(key) else {
            return;
        };
        if tile.is_in_flight() {
            if let Some(scheduler) = self.scheduler.as_mut() {
                scheduler.cancel(key);
            }
        }
        if let Some(buffer) = tile.buffer.take() {
            self.pool.release(buffer);
        }
    }

    fn clear(&mut self) {
        let evicted = self.evict_where(|_| true);
        self.grid = None;
        self.visible = Rect::default();
        if evicted > 0 {
            self.send(ViewerEvent::Invalidate);
        }
    }

    /// Drop tiles left over from a previous grid once every current tile
    /// covering their visible part is ready.
    fn prune_superseded(&mut self) {
        let Some(grid) = self.grid.as_ref() else {
            return;
        };
        let sample_size = grid.sample_size;
        let stale: Vec<TileKey> = self
            .tiles
            .values()
            .filter(|t| !grid.contains_key(&t.key))
            .filter(|t| match t.cell().intersection(&self.visible) {
                None => true,
                Some(shown) => grid.covering(&shown).all(|g| {
                    self.tiles
                        .get(&TileKey::new(g.cell, sample_size))
                        .is_some_and(Tile::is_ready)
                }),
            })
            .map(|t| t.key)
            .collect();
        if stale.is_empty() {
            return;
        }
        trace!(count = stale.len(), "pruning superseded tiles");
        for key in &stale {
            self.evict(key);
        }
    }

    /// Whether `tile` is a cell of the grid of the last refresh.
    fn is_current(&self, tile: &Tile) -> bool {
        self.grid.as_ref().is_some_and(|g| g.contains_key(&tile.key))
    }

    fn send(&self, event: ViewerEvent) {
        let _ = self.viewer_events.send(event);
    }
}

impl Drop for TileManager {
    fn drop(&mut self) {
        self.destroy();
    }
}
