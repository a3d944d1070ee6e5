//! Memory-mapped `GVRASTER` files: header, region reader and streaming writer.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use image::DynamicImage;
use memmap2::Mmap;
use tracing::{debug, info};

use crate::error::{GigaviewError, Result};
use crate::geometry::{Rect, Size};
use crate::pool::{BufferPool, PixelBuffer, PixelFormat};

use super::{check_region, downsample_region, ImageSource, RegionDecoder};

pub const RASTER_MAGIC: &[u8; 8] = b"GVRASTER";
pub const RASTER_HEADER_SIZE: usize = 32;
pub const RASTER_VERSION: u16 = 1;

/// Header of an uncompressed raster file (32 bytes, little-endian).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterHeader {
    pub version: u16,
    /// 1 (gray), 3 (RGB) or 4 (RGBA).
    pub channels: u16,
    pub width: u32,
    pub height: u32,
}

impl RasterHeader {
    pub fn new(width: u32, height: u32, channels: u16) -> Result<Self> {
        let header = Self {
            version: RASTER_VERSION,
            channels,
            width,
            height,
        };
        header.validate()?;
        Ok(header)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    /// Total pixel payload after the header.
    pub fn data_size(&self) -> usize {
        self.row_bytes()
            .checked_mul(self.height as usize)
            .unwrap_or(usize::MAX)
    }

    /// Buffers produced from this raster: gray stays gray, colour becomes RGBA.
    pub fn output_format(&self) -> PixelFormat {
        if self.channels == 1 {
            PixelFormat::Gray8
        } else {
            PixelFormat::Rgba8
        }
    }

    fn validate(&self) -> Result<()> {
        if self.version != RASTER_VERSION {
            return Err(GigaviewError::InvalidRaster(format!(
                "Unsupported version {}",
                self.version
            )));
        }
        if !matches!(self.channels, 1 | 3 | 4) {
            return Err(GigaviewError::InvalidRaster(format!(
                "Unsupported channel count {}",
                self.channels
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(GigaviewError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < RASTER_HEADER_SIZE {
            return Err(GigaviewError::InvalidRaster(
                "File too small for raster header".into(),
            ));
        }
        if &buf[0..8] != RASTER_MAGIC {
            return Err(GigaviewError::InvalidRaster("Missing GVRASTER magic".into()));
        }
        let mut cursor = std::io::Cursor::new(&buf[8..RASTER_HEADER_SIZE]);
        let version = cursor.read_u16::<LittleEndian>()?;
        let channels = cursor.read_u16::<LittleEndian>()?;
        let width = cursor.read_u32::<LittleEndian>()?;
        let height = cursor.read_u32::<LittleEndian>()?;
        let header = Self {
            version,
            channels,
            width,
            height,
        };
        header.validate()?;
        Ok(header)
    }

    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(RASTER_MAGIC)?;
        w.write_u16::<LittleEndian>(self.version)?;
        w.write_u16::<LittleEndian>(self.channels)?;
        w.write_u32::<LittleEndian>(self.width)?;
        w.write_u32::<LittleEndian>(self.height)?;
        w.write_all(&[0u8; 12])?;
        Ok(())
    }
}

/// Raster file on disk. Probing reads only the header.
pub struct RasterSource {
    path: PathBuf,
}

impl RasterSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn read_header(&self) -> Result<RasterHeader> {
        let mut buf = [0u8; RASTER_HEADER_SIZE];
        File::open(&self.path)?.read_exact(&mut buf)?;
        RasterHeader::parse(&buf)
    }
}

impl ImageSource for RasterSource {
    fn name(&self) -> String {
        self.path.display().to_string()
    }

    fn probe(&self) -> Result<Size> {
        Ok(self.read_header()?.size())
    }

    fn open(&self) -> Result<Box<dyn RegionDecoder>> {
        let reader = RasterReader::open(&self.path)
            .map_err(|e| GigaviewError::Open(format!("{}: {e}", self.path.display())))?;
        Ok(Box::new(reader))
    }
}

/// Memory-mapped raster. Regions are read straight from the mapping, so
/// only the pages covering a decoded region are ever touched.
pub struct RasterReader {
    mmap: Mmap,
    pub header: RasterHeader,
}

impl RasterReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let header = RasterHeader::parse(&mmap)?;

        let expected = RASTER_HEADER_SIZE.saturating_add(header.data_size());
        if mmap.len() < expected {
            return Err(GigaviewError::InvalidRaster(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected,
                mmap.len()
            )));
        }
        info!(
            path = %path.display(),
            width = header.width,
            height = header.height,
            channels = header.channels,
            "Opened raster"
        );
        Ok(Self { mmap, header })
    }

    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let channels = self.header.channels as usize;
        let offset =
            RASTER_HEADER_SIZE + y as usize * self.header.row_bytes() + x as usize * channels;
        let p = &self.mmap[offset..offset + channels];
        match channels {
            1 => [p[0], p[0], p[0], 255],
            3 => [p[0], p[1], p[2], 255],
            _ => [p[0], p[1], p[2], p[3]],
        }
    }
}

impl RegionDecoder for RasterReader {
    fn image_size(&self) -> Size {
        self.header.size()
    }

    fn decode_region(
        &mut self,
        rect: Rect,
        sample_size: u32,
        pool: &dyn BufferPool,
    ) -> Result<PixelBuffer> {
        check_region(&rect, self.header.size(), sample_size)?;
        Ok(downsample_region(
            &rect,
            sample_size,
            self.header.output_format(),
            pool,
            |x, y| self.pixel(x, y),
        ))
    }
}

/// Streaming writer: header first, then exactly `height` rows.
pub struct RasterWriter {
    writer: BufWriter<File>,
    header: RasterHeader,
    rows_written: u32,
}

impl RasterWriter {
    pub fn create(path: &Path, width: u32, height: u32, channels: u16) -> Result<Self> {
        let header = RasterHeader::new(width, height, channels)?;
        let mut writer = BufWriter::new(File::create(path)?);
        header.write_to(&mut writer)?;
        Ok(Self {
            writer,
            header,
            rows_written: 0,
        })
    }

    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    pub fn write_row(&mut self, row: &[u8]) -> Result<()> {
        if row.len() != self.header.row_bytes() {
            return Err(GigaviewError::InvalidRaster(format!(
                "Row length {} does not match expected {}",
                row.len(),
                self.header.row_bytes()
            )));
        }
        if self.rows_written >= self.header.height {
            return Err(GigaviewError::InvalidRaster(
                "More rows than the header declares".into(),
            ));
        }
        self.writer.write_all(row)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        if self.rows_written != self.header.height {
            return Err(GigaviewError::InvalidRaster(format!(
                "Wrote {} rows, header declares {}",
                self.rows_written, self.header.height
            )));
        }
        self.writer.flush()?;
        debug!(rows = self.rows_written, "Raster written");
        Ok(())
    }
}

/// Write an in-memory image as a raster, keeping gray images single-channel.
pub fn write_raster(img: &DynamicImage, path: &Path) -> Result<()> {
    let (width, height) = (img.width(), img.height());
    match img {
        DynamicImage::ImageLuma8(gray) => {
            let mut writer = RasterWriter::create(path, width, height, 1)?;
            for row in gray.as_raw().chunks_exact(width as usize) {
                writer.write_row(row)?;
            }
            writer.finish()
        }
        _ => {
            let rgba = img.to_rgba8();
            let mut writer = RasterWriter::create(path, width, height, 4)?;
            for row in rgba.as_raw().chunks_exact(width as usize * 4) {
                writer.write_row(row)?;
            }
            writer.finish()
        }
    }
}
