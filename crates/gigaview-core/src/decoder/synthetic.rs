use crate::error::{GigaviewError, Result};
use crate::geometry::{Rect, Size};
use crate::pool::{BufferPool, PixelBuffer, PixelFormat};

use super::{check_region, downsample_region, ImageSource, RegionDecoder};

const CHECKER_CELL: u32 = 256;
const GRID_LINE_SPACING: u32 = 1024;

/// Procedural test image of any size. Nothing is stored; every pixel is a
/// function of its coordinates.
pub struct SyntheticSource {
    size: Size,
}

impl SyntheticSource {
    pub fn new(size: Size) -> Self {
        Self { size }
    }
}

/// Colour of the synthetic pattern at `(x, y)` in an image of `size`:
/// a horizontal/vertical gradient, a checkerboard, and grid lines.
pub fn pattern_pixel(x: u32, y: u32, size: Size) -> [u8; 4] {
    if x % GRID_LINE_SPACING < 2 || y % GRID_LINE_SPACING < 2 {
        return [255, 255, 255, 255];
    }
    let r = (x as u64 * 255 / size.width.max(1) as u64) as u8;
    let g = (y as u64 * 255 / size.height.max(1) as u64) as u8;
    let dark = ((x / CHECKER_CELL) + (y / CHECKER_CELL)) % 2 == 0;
    let b = if dark { 64 } else { 192 };
    [r, g, b, 255]
}

impl ImageSource for SyntheticSource {
    fn name(&self) -> String {
        format!("synthetic:{}", self.size)
    }

    fn probe(&self) -> Result<Size> {
        if self.size.is_empty() {
            return Err(GigaviewError::InvalidDimensions {
                width: self.size.width,
                height: self.size.height,
            });
        }
        Ok(self.size)
    }

    fn open(&self) -> Result<Box<dyn RegionDecoder>> {
        self.probe()
            .map_err(|e| GigaviewError::Open(e.to_string()))?;
        Ok(Box::new(SyntheticDecoder { size: self.size }))
    }
}

struct SyntheticDecoder {
    size: Size,
}

impl RegionDecoder for SyntheticDecoder {
    fn image_size(&self) -> Size {
        self.size
    }

    fn decode_region(
        &mut self,
        rect: Rect,
        sample_size: u32,
        pool: &dyn BufferPool,
    ) -> Result<PixelBuffer> {
        check_region(&rect, self.size, sample_size)?;
        let size = self.size;
        Ok(downsample_region(
            &rect,
            sample_size,
            PixelFormat::Rgba8,
            pool,
            |x, y| pattern_pixel(x, y, size),
        ))
    }
}
