use image::RgbaImage;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;
use crate::error::{GigaviewError, Result};
use crate::geometry::{PointF, Rect, RectF, Size};
use crate::manager::TileDraw;
use crate::tile::{Tile, TileState, TileStatus};
use crate::viewport::{Transform, Viewport};

/// Fill for tiles whose decode failed and nothing else covers.
pub const FAILED_PLACEHOLDER: [u8; 4] = [96, 32, 32, 255];

pub const OVERLAY_UNNEEDED: [u8; 4] = [0x00, 0xBF, 0xFF, 255];
pub const OVERLAY_PENDING: [u8; 4] = [0x80, 0x80, 0x80, 255];
pub const OVERLAY_LOADING: [u8; 4] = [0xFF, 0xFF, 0x00, 255];
pub const OVERLAY_READY: [u8; 4] = [0x00, 0xFF, 0x00, 255];
pub const OVERLAY_FAILED: [u8; 4] = [0xFF, 0x00, 0x00, 255];
pub const OVERLAY_VISIBLE_RECT: [u8; 4] = [0xFF, 0x00, 0xFF, 255];

pub fn status_color(status: TileStatus) -> [u8; 4] {
    match status {
        TileStatus::Unneeded => OVERLAY_UNNEEDED,
        TileStatus::Pending => OVERLAY_PENDING,
        TileStatus::Loading => OVERLAY_LOADING,
        TileStatus::Ready => OVERLAY_READY,
        TileStatus::Failed => OVERLAY_FAILED,
    }
}

/// RGBA frame the size of the surface.
pub struct Canvas {
    size: Size,
    data: Vec<u8>,
}

impl Canvas {
    pub fn new(size: Size, background: [u8; 4]) -> Self {
        let pixels = size.width as usize * size.height as usize;
        Self {
            size,
            data: background.repeat(pixels),
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.size.width || y >= self.size.height {
            return None;
        }
        let i = (y as usize * self.size.width as usize + x as usize) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    pub fn into_image(self) -> Result<RgbaImage> {
        let Size { width, height } = self.size;
        RgbaImage::from_raw(width, height, self.data)
            .ok_or(GigaviewError::InvalidDimensions { width, height })
    }

    /// Paint a snapshot. Each device pixel is mapped back into the source
    /// and takes its colour from the topmost ready tile covering that point,
    /// so rotation and partially loaded levels come out right.
    pub fn paint(&mut self, viewport: &Viewport, draws: &[TileDraw<'_>]) {
        let transform = viewport.transform();
        if transform.is_degenerate() || self.size.is_empty() {
            return;
        }
        // Topmost first: the current grid, then leftovers finest first.
        let layers: Vec<(RectF, &Tile)> = draws
            .iter()
            .rev()
            .filter(|d| matches!(d.tile.state, TileState::Ready | TileState::Failed))
            .map(|d| (d.device_rect, d.tile))
            .collect();
        if layers.is_empty() {
            return;
        }

        let w = self.size.width as usize;
        let h = self.size.height as usize;
        let row_bytes = w * 4;
        let render_row = |(y, row): (usize, &mut [u8])| {
            paint_row(&transform, &layers, y, row);
        };
        if h * w >= PARALLEL_PIXEL_THRESHOLD {
            self.data
                .par_chunks_exact_mut(row_bytes)
                .enumerate()
                .for_each(render_row);
        } else {
            self.data
                .chunks_exact_mut(row_bytes)
                .enumerate()
                .for_each(render_row);
        }
    }

    /// One-pixel outline of `rect`, clipped to the canvas.
    pub fn stroke_rect(&mut self, rect: &RectF, color: [u8; 4], thickness: u32) {
        if !rect.is_finite() || rect.is_empty() {
            return;
        }
        let bounds = Rect::from_size(self.size);
        let outer = rect.round_out(self.size);
        let Some(outer) = outer.intersection(&bounds) else {
            return;
        };
        let t = thickness.max(1);
        for y in outer.top..outer.bottom {
            for x in outer.left..outer.right {
                let on_edge = x < outer.left + t
                    || x + t >= outer.right
                    || y < outer.top + t
                    || y + t >= outer.bottom;
                if on_edge {
                    self.put(x, y, color);
                }
            }
        }
    }

    fn put(&mut self, x: u32, y: u32, color: [u8; 4]) {
        let i = (y as usize * self.size.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&color);
    }
}

fn paint_row(transform: &Transform, layers: &[(RectF, &Tile)], y: usize, row: &mut [u8]) {
    let cy = y as f64 + 0.5;
    let in_row: Vec<&(RectF, &Tile)> = layers
        .iter()
        .filter(|(r, _)| cy >= r.top && cy < r.bottom)
        .collect();
    if in_row.is_empty() {
        return;
    }
    for (x, px) in row.chunks_exact_mut(4).enumerate() {
        let cx = x as f64 + 0.5;
        let Some(p) = transform.invert_point(PointF::new(cx, cy)) else {
            continue;
        };
        let mut hit = None;
        let mut failed = false;
        for &&(r, tile) in &in_row {
            if cx < r.left || cx >= r.right || !tile.source_rect.to_f64().contains_point(p) {
                continue;
            }
            hit = sample_tile(tile, p);
            if hit.is_some() {
                break;
            }
            failed |= tile.state == TileState::Failed;
        }
        if hit.is_none() && failed {
            hit = Some(FAILED_PLACEHOLDER);
        }
        if let Some(color) = hit {
            px.copy_from_slice(&color);
        }
    }
}

fn sample_tile(tile: &Tile, p: PointF) -> Option<[u8; 4]> {
    let buffer = tile.buffer().filter(|b| b.width() > 0 && b.height() > 0)?;
    let s = tile.sample_size() as f64;
    let bx = (((p.x - tile.source_rect.left as f64) / s) as u32).min(buffer.width() - 1);
    let by = (((p.y - tile.source_rect.top as f64) / s) as u32).min(buffer.height() - 1);
    Some(buffer.rgba_at(bx, by))
}

/// Outline every tile in its status colour and the visible rect in magenta.
pub fn draw_overlay(
    canvas: &mut Canvas,
    viewport: &Viewport,
    statuses: &[(Rect, TileStatus)],
) {
    let transform = viewport.transform();
    if transform.is_degenerate() {
        return;
    }
    for (rect, status) in statuses {
        if let Some(device) = transform.map_rect(rect) {
            canvas.stroke_rect(&device, status_color(*status), 1);
        }
    }
    let visible = viewport.visible_source_rect();
    if !visible.is_empty() {
        if let Some(device) = transform.map_rect(&visible) {
            canvas.stroke_rect(&device, OVERLAY_VISIBLE_RECT, 2);
        }
    }
}
