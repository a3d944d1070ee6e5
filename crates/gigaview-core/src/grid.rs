//! Tile grid computation.
//!
//! The grid is a pure function of image size, surface size and scale. Cells
//! are anchored at the image origin, so panning never shifts them.

use crate::config::ViewerConfig;
use crate::consts::{MIN_TILE_SIZE, SCALE_EPSILON};
use crate::geometry::{Rect, Size};
use crate::tile::TileKey;

/// Inputs to [`compute_grid`] taken from the viewer config.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridParams {
    /// Tile edge in decoded pixels.
    pub tile_size: u32,
    /// Overlap on each side in decoded pixels.
    pub tile_border: u32,
    pub max_oversample: f64,
}

impl From<&ViewerConfig> for GridParams {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            tile_size: config.tile_size,
            tile_border: config.tile_border,
            max_oversample: config.max_oversample,
        }
    }
}

impl Default for GridParams {
    fn default() -> Self {
        Self::from(&ViewerConfig::default())
    }
}

/// One cell of the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridTile {
    pub col: u32,
    pub row: u32,
    /// Partition cell; cells of one grid never overlap.
    pub cell: Rect,
    /// Region handed to the decoder: the cell plus the border overlap.
    pub source_rect: Rect,
}

/// Partition of the image into fixed-size tiles at one sample level.
#[derive(Clone, Debug, PartialEq)]
pub struct TileGrid {
    pub sample_size: u32,
    /// Tile edge in source pixels.
    pub tile_edge: u32,
    /// Border overlap in source pixels.
    pub border: u32,
    pub columns: u32,
    pub rows: u32,
    pub tiles: Vec<GridTile>,
}

impl TileGrid {
    fn empty() -> Self {
        Self {
            sample_size: 1,
            tile_edge: 0,
            border: 0,
            columns: 0,
            rows: 0,
            tiles: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, col: u32, row: u32) -> Option<&GridTile> {
        if col >= self.columns || row >= self.rows {
            return None;
        }
        self.tiles.get((row * self.columns + col) as usize)
    }

    /// Whether `key` names a cell of this grid at this grid's sample size.
    /// A cell of a different tile edge is not part of the grid even when it
    /// shares the sample size.
    pub fn contains_key(&self, key: &TileKey) -> bool {
        if key.sample_size != self.sample_size || self.tile_edge == 0 {
            return false;
        }
        let (col, row) = (key.cell.left / self.tile_edge, key.cell.top / self.tile_edge);
        self.get(col, row).is_some_and(|t| t.cell == key.cell)
    }

    /// Tiles whose cell intersects `rect`, found by index arithmetic.
    pub fn covering(&self, rect: &Rect) -> impl Iterator<Item = &GridTile> + '_ {
        let (cols, rows) = if rect.is_empty() || self.tile_edge == 0 {
            (0..0, 0..0)
        } else {
            let edge = self.tile_edge;
            (
                rect.left / edge..rect.right.div_ceil(edge).min(self.columns),
                rect.top / edge..rect.bottom.div_ceil(edge).min(self.rows),
            )
        };
        rows.flat_map(move |row| cols.clone().map(move |col| (col, row)))
            .filter_map(move |(col, row)| self.get(col, row))
    }
}

/// Smallest power-of-two sample size keeping the decoded density at or
/// below `max_oversample` decoded pixels per device pixel, capped so the
/// decoded image is at least one pixel wide.
pub fn sample_size_for(image: Size, scale: f64, max_oversample: f64) -> u32 {
    let cap = image.width.max(image.height).max(1).next_power_of_two();
    if !(scale.is_finite() && scale > 0.0) {
        return cap;
    }
    let mut sample = 1u32;
    while sample < cap && (sample as f64) * scale * max_oversample < 1.0 - SCALE_EPSILON {
        sample *= 2;
    }
    sample
}

/// Partition `image` into tiles for display at `scale` on `surface`.
///
/// Pure: identical inputs always give an identical grid. The grid origin is
/// pinned at (0, 0) so cells do not move as the viewport pans.
pub fn compute_grid(image: Size, surface: Size, scale: f64, params: &GridParams) -> TileGrid {
    if image.is_empty() || surface.is_empty() {
        return TileGrid::empty();
    }

    let sample_size = sample_size_for(image, scale, params.max_oversample);

    // Tiles never need to be larger than the surface itself.
    let surface_edge = surface.width.max(surface.height).next_power_of_two();
    let decoded_edge = params.tile_size.min(surface_edge).max(MIN_TILE_SIZE);
    let decoded_border = params.tile_border.min((decoded_edge - 1) / 2);

    let clamp_u32 = |v: u64| v.min(u32::MAX as u64) as u32;
    let tile_edge = clamp_u32(decoded_edge as u64 * sample_size as u64);
    let border = clamp_u32(decoded_border as u64 * sample_size as u64);
    let columns = image.width.div_ceil(tile_edge);
    let rows = image.height.div_ceil(tile_edge);

    let mut tiles = Vec::with_capacity(columns as usize * rows as usize);
    for row in 0..rows {
        for col in 0..columns {
            let left = col * tile_edge;
            let top = row * tile_edge;
            let cell = Rect::new(
                left,
                top,
                left.saturating_add(tile_edge).min(image.width),
                top.saturating_add(tile_edge).min(image.height),
            );
            tiles.push(GridTile {
                col,
                row,
                cell,
                source_rect: cell.expand(border, image),
            });
        }
    }

    TileGrid {
        sample_size,
        tile_edge,
        border,
        columns,
        rows,
        tiles,
    }
}
