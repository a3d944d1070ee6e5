use crate::geometry::Rect;
use crate::pool::PixelBuffer;

/// Cache identity of a tile: its grid cell plus the sample level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    pub cell: Rect,
    pub sample_size: u32,
}

impl TileKey {
    pub fn new(cell: Rect, sample_size: u32) -> Self {
        Self { cell, sample_size }
    }
}

/// Lifecycle of a cached tile: `Pending -> Loading -> Ready | Failed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileState {
    /// Queued for decode, not yet picked up by the worker.
    Pending,
    /// The worker is decoding it.
    Loading,
    Ready,
    Failed,
}

/// A decoded (or to-be-decoded) piece of the image.
///
/// The buffer is owned by the tile until eviction, when it goes back to the
/// pool. Tiles hold no reference to their manager.
#[derive(Debug)]
pub struct Tile {
    pub key: TileKey,
    /// Region decoded for this tile, the cell plus any border overlap.
    pub source_rect: Rect,
    pub state: TileState,
    pub(crate) buffer: Option<PixelBuffer>,
    /// Session generation the current decode was requested under.
    pub generation: u64,
    /// Failed decode attempts so far.
    pub attempts: u32,
    /// Scheduler ticket of the decode this tile is waiting on. Only the
    /// result carrying this ticket is applied.
    pub ticket: Option<u64>,
}

impl Tile {
    pub(crate) fn pending(key: TileKey, source_rect: Rect, generation: u64) -> Self {
        Self {
            key,
            source_rect,
            state: TileState::Pending,
            buffer: None,
            generation,
            attempts: 0,
            ticket: None,
        }
    }

    pub fn cell(&self) -> Rect {
        self.key.cell
    }

    pub fn sample_size(&self) -> u32 {
        self.key.sample_size
    }

    pub fn buffer(&self) -> Option<&PixelBuffer> {
        self.buffer.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.state == TileState::Ready && self.buffer.is_some()
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.state, TileState::Pending | TileState::Loading)
    }
}

/// Tile state as shown by a diagnostics overlay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileStatus {
    /// Cached tile from a previous grid, kept until its replacement is ready.
    Unneeded,
    Pending,
    Loading,
    Ready,
    Failed,
}

impl From<TileState> for TileStatus {
    fn from(state: TileState) -> Self {
        match state {
            TileState::Pending => Self::Pending,
            TileState::Loading => Self::Loading,
            TileState::Ready => Self::Ready,
            TileState::Failed => Self::Failed,
        }
    }
}

impl std::fmt::Display for TileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unneeded => write!(f, "Unneeded"),
            Self::Pending => write!(f, "Pending"),
            Self::Loading => write!(f, "Loading"),
            Self::Ready => write!(f, "Ready"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}
