pub mod file;
pub mod raster;
pub mod synthetic;

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::consts::MAX_DOWNSAMPLE_TAPS;
use crate::error::{GigaviewError, Result};
use crate::geometry::{Rect, Size};
use crate::pool::{BufferPool, PixelBuffer, PixelFormat};

pub use file::ImageFileSource;
pub use raster::{write_raster, RasterSource, RasterWriter, RASTER_MAGIC};
pub use synthetic::SyntheticSource;

/// Decodes rectangular regions of one opened image.
///
/// Stateful and single-threaded: one instance is driven by exactly one
/// decode worker, one call at a time.
pub trait RegionDecoder {
    fn image_size(&self) -> Size;

    /// Decode `rect` (unrotated source pixels) downsampled by `sample_size`,
    /// into a buffer taken from `pool`.
    fn decode_region(
        &mut self,
        rect: Rect,
        sample_size: u32,
        pool: &dyn BufferPool,
    ) -> Result<PixelBuffer>;

    /// Release decoder resources. Called once, on the worker thread.
    fn close(&mut self) {}
}

/// An encoded image the viewer can be bound to.
pub trait ImageSource: Send + Sync {
    /// Human-readable identity for logs.
    fn name(&self) -> String;

    /// Cheap dimension query, run on the caller's thread at bind time.
    fn probe(&self) -> Result<Size>;

    /// Open a region decoder. Expensive; runs on the decode worker.
    fn open(&self) -> Result<Box<dyn RegionDecoder>>;
}

/// Pick a source implementation from the file's leading bytes.
pub fn open_source(path: &Path) -> Result<Arc<dyn ImageSource>> {
    let mut magic = [0u8; 8];
    let mut file = File::open(path)?;
    let n = file.read(&mut magic)?;
    if n == magic.len() && &magic == RASTER_MAGIC {
        Ok(Arc::new(RasterSource::new(path)))
    } else {
        Ok(Arc::new(ImageFileSource::new(path)))
    }
}

/// Size of `rect` once downsampled by `sample_size` (rounded up).
pub fn decoded_size(rect: &Rect, sample_size: u32) -> Size {
    let s = sample_size.max(1);
    Size::new(rect.width().div_ceil(s), rect.height().div_ceil(s))
}

/// Reject empty, out-of-bounds or non-power-of-two requests.
pub(crate) fn check_region(rect: &Rect, image: Size, sample_size: u32) -> Result<()> {
    if rect.is_empty() || !Rect::from_size(image).contains(rect) {
        return Err(GigaviewError::Decode {
            rect: *rect,
            message: format!("region outside {image} image"),
        });
    }
    if !sample_size.is_power_of_two() {
        return Err(GigaviewError::Decode {
            rect: *rect,
            message: format!("sample size {sample_size} is not a power of two"),
        });
    }
    Ok(())
}

/// Box-downsample `rect` through `sample`, which returns RGBA for a source
/// pixel. Each output pixel averages up to `MAX_DOWNSAMPLE_TAPS`^2 evenly
/// spaced taps of its block.
pub(crate) fn downsample_region(
    rect: &Rect,
    sample_size: u32,
    format: PixelFormat,
    pool: &dyn BufferPool,
    sample: impl Fn(u32, u32) -> [u8; 4],
) -> PixelBuffer {
    let out = decoded_size(rect, sample_size);
    let mut buffer = pool.acquire(out.width, out.height, format);
    let taps = sample_size.min(MAX_DOWNSAMPLE_TAPS);
    let step = (sample_size / taps).max(1);
    let bpp = format.bytes_per_pixel();
    let row_bytes = buffer.row_bytes();

    for (oy, row) in buffer.data_mut().chunks_exact_mut(row_bytes).enumerate() {
        let y0 = rect.top + oy as u32 * sample_size;
        for (ox, px) in row.chunks_exact_mut(bpp).enumerate() {
            let x0 = rect.left + ox as u32 * sample_size;
            let mut acc = [0u32; 4];
            let mut n = 0u32;
            for ty in 0..taps {
                let y = y0 + ty * step;
                if y >= rect.bottom {
                    break;
                }
                for tx in 0..taps {
                    let x = x0 + tx * step;
                    if x >= rect.right {
                        break;
                    }
                    let p = sample(x, y);
                    for c in 0..4 {
                        acc[c] += p[c] as u32;
                    }
                    n += 1;
                }
            }
            let n = n.max(1);
            match format {
                PixelFormat::Gray8 => px[0] = (acc[0] / n) as u8,
                PixelFormat::Rgba8 => {
                    for c in 0..4 {
                        px[c] = (acc[c] / n) as u8;
                    }
                }
            }
        }
    }

    buffer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::ReusePool;

    #[test]
    fn test_decoded_size_rounds_up() {
        assert_eq!(decoded_size(&Rect::new(0, 0, 513, 100), 2), Size::new(257, 50));
    }

    #[test]
    fn test_downsample_averages_block() {
        let pool = ReusePool::new(0);
        let buf = downsample_region(&Rect::new(0, 0, 2, 2), 2, PixelFormat::Gray8, &pool, |x, _| {
            if x == 0 {
                [0, 0, 0, 255]
            } else {
                [200, 200, 200, 255]
            }
        });
        assert_eq!(buf.data(), &[100]);
    }

    #[test]
    fn test_check_region_rejects_bad_sample() {
        let err = check_region(&Rect::new(0, 0, 10, 10), Size::new(10, 10), 3);
        assert!(err.is_err());
    }
}
