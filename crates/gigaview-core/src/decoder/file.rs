use std::path::{Path, PathBuf};

use image::RgbaImage;
use tracing::info;

use crate::error::{GigaviewError, Result};
use crate::geometry::{Rect, Size};
use crate::pool::{BufferPool, PixelBuffer, PixelFormat};

use super::{check_region, downsample_region, ImageSource, RegionDecoder};

/// Any file the `image` crate can read.
///
/// Probing reads only the header. Opening decodes the whole image once, so
/// this source suits files that fit in memory; gigapixel inputs should be
/// converted to a raster first.
pub struct ImageFileSource {
    path: PathBuf,
}

impl ImageFileSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }
}

impl ImageSource for ImageFileSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn probe(&self) -> Result<Size> {
        let (width, height) = image::image_dimensions(&self.path)?;
        Ok(Size::new(width, height))
    }

    fn open(&self) -> Result<Box<dyn RegionDecoder>> {
        let img = image::open(&self.path)
            .map_err(|e| GigaviewError::Open(format!("{}: {e}", self.path.display())))?;
        info!(
            path = %self.path.display(),
            width = img.width(),
            height = img.height(),
            "Decoded image file"
        );
        Ok(Box::new(ImageFileDecoder {
            image: img.to_rgba8(),
        }))
    }
}

struct ImageFileDecoder {
    image: RgbaImage,
}

impl RegionDecoder for ImageFileDecoder {
    fn image_size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    fn decode_region(
        &mut self,
        rect: Rect,
        sample_size: u32,
        pool: &dyn BufferPool,
    ) -> Result<PixelBuffer> {
        check_region(&rect, self.image_size(), sample_size)?;
        Ok(downsample_region(
            &rect,
            sample_size,
            PixelFormat::Rgba8,
            pool,
            |x, y| self.image.get_pixel(x, y).0,
        ))
    }
}
