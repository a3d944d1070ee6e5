use std::fs;
use std::path::Path;

use gigaview_core::decoder::raster::{RasterHeader, RASTER_HEADER_SIZE};
use gigaview_core::decoder::synthetic::pattern_pixel;
use gigaview_core::decoder::{
    decoded_size, open_source, write_raster, ImageSource, RasterSource, RasterWriter, RegionDecoder,
    SyntheticSource,
};
use gigaview_core::error::GigaviewError;
use gigaview_core::geometry::{Rect, Size};
use gigaview_core::pool::{PixelFormat, ReusePool};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};

fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 10) as u8, (y * 20) as u8, (x + y) as u8, 255])
    })
}

fn write_rgba_raster(dir: &Path, img: &RgbaImage) -> std::path::PathBuf {
    let path = dir.join("image.gvr");
    write_raster(&DynamicImage::ImageRgba8(img.clone()), &path).unwrap();
    path
}

// ---------------------------------------------------------------------------
// Raster header
// ---------------------------------------------------------------------------

#[test]
fn test_header_round_trip() {
    let header = RasterHeader::new(640, 480, 3).unwrap();
    let mut buf = Vec::new();
    header.write_to(&mut buf).unwrap();
    assert_eq!(buf.len(), RASTER_HEADER_SIZE);
    assert_eq!(RasterHeader::parse(&buf).unwrap(), header);
}

#[test]
fn test_header_rejects_bad_magic() {
    let buf = [0u8; RASTER_HEADER_SIZE];
    let err = RasterHeader::parse(&buf).unwrap_err();
    assert!(matches!(err, GigaviewError::InvalidRaster(_)));
}

#[test]
fn test_header_rejects_short_buffer() {
    assert!(RasterHeader::parse(b"GVRASTER").is_err());
}

#[test]
fn test_header_rejects_bad_channels_and_size() {
    assert!(matches!(
        RasterHeader::new(10, 10, 2),
        Err(GigaviewError::InvalidRaster(_))
    ));
    assert!(matches!(
        RasterHeader::new(0, 10, 1),
        Err(GigaviewError::InvalidDimensions { width: 0, height: 10 })
    ));
}

// ---------------------------------------------------------------------------
// Raster source
// ---------------------------------------------------------------------------

#[test]
fn test_raster_probe_reads_header_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("truncated.gvr");
    let mut bytes = Vec::new();
    RasterHeader::new(10, 10, 1).unwrap().write_to(&mut bytes).unwrap();
    bytes.extend_from_slice(&[0u8; 5]);
    fs::write(&path, &bytes).unwrap();

    let source = RasterSource::new(&path);
    assert_eq!(source.probe().unwrap(), Size::new(10, 10));
    let err = source.open().err().unwrap();
    assert!(matches!(err, GigaviewError::Open(_)), "{err}");
}

#[test]
fn test_raster_full_region_matches_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let img = gradient_rgba(6, 4);
    let path = write_rgba_raster(dir.path(), &img);

    let mut decoder = RasterSource::new(&path).open().unwrap();
    assert_eq!(decoder.image_size(), Size::new(6, 4));
    let pool = ReusePool::new(0);
    let buf = decoder
        .decode_region(Rect::new(0, 0, 6, 4), 1, &pool)
        .unwrap();
    assert_eq!(buf.format(), PixelFormat::Rgba8);
    assert_eq!(buf.data(), img.as_raw().as_slice());
}

#[test]
fn test_raster_sub_region_offsets() {
    let dir = tempfile::tempdir().unwrap();
    let img = gradient_rgba(6, 4);
    let path = write_rgba_raster(dir.path(), &img);

    let mut decoder = RasterSource::new(&path).open().unwrap();
    let pool = ReusePool::new(0);
    let buf = decoder
        .decode_region(Rect::new(2, 1, 5, 3), 1, &pool)
        .unwrap();
    assert_eq!((buf.width(), buf.height()), (3, 2));
    assert_eq!(buf.rgba_at(0, 0), img.get_pixel(2, 1).0);
    assert_eq!(buf.rgba_at(2, 1), img.get_pixel(4, 2).0);
}

#[test]
fn test_raster_gray_downsample_averages_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gray.gvr");
    let values = [[0u8, 100, 200, 40], [20, 60, 0, 0]];
    let img = GrayImage::from_fn(4, 2, |x, y| Luma([values[y as usize][x as usize]]));
    write_raster(&DynamicImage::ImageLuma8(img), &path).unwrap();

    let mut decoder = RasterSource::new(&path).open().unwrap();
    let pool = ReusePool::new(0);
    let buf = decoder
        .decode_region(Rect::new(0, 0, 4, 2), 2, &pool)
        .unwrap();
    assert_eq!(buf.format(), PixelFormat::Gray8);
    assert_eq!(buf.data(), &[45, 60]);
}

#[test]
fn test_raster_rgb_expands_to_rgba() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.gvr");
    let mut writer = RasterWriter::create(&path, 2, 1, 3).unwrap();
    writer.write_row(&[1, 2, 3, 4, 5, 6]).unwrap();
    writer.finish().unwrap();

    let mut decoder = RasterSource::new(&path).open().unwrap();
    let buf = decoder
        .decode_region(Rect::new(0, 0, 2, 1), 1, &ReusePool::new(0))
        .unwrap();
    assert_eq!(buf.data(), &[1, 2, 3, 255, 4, 5, 6, 255]);
}

#[test]
fn test_raster_region_out_of_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgba_raster(dir.path(), &gradient_rgba(6, 4));
    let mut decoder = RasterSource::new(&path).open().unwrap();
    let pool = ReusePool::new(0);

    let err = decoder
        .decode_region(Rect::new(4, 0, 7, 4), 1, &pool)
        .unwrap_err();
    assert!(matches!(err, GigaviewError::Decode { .. }));
    assert!(decoder.decode_region(Rect::new(0, 0, 4, 4), 3, &pool).is_err());
    assert!(decoder.decode_region(Rect::new(2, 2, 2, 4), 1, &pool).is_err());
}

#[test]
fn test_writer_checks_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.gvr");

    let mut writer = RasterWriter::create(&path, 2, 2, 1).unwrap();
    assert!(writer.write_row(&[1, 2, 3]).is_err());
    writer.write_row(&[1, 2]).unwrap();
    assert!(writer.finish().is_err());

    let mut writer = RasterWriter::create(&path, 2, 1, 1).unwrap();
    writer.write_row(&[1, 2]).unwrap();
    assert!(writer.write_row(&[3, 4]).is_err());
    writer.finish().unwrap();
}

// ---------------------------------------------------------------------------
// Source selection
// ---------------------------------------------------------------------------

#[test]
fn test_open_source_detects_raster() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_rgba_raster(dir.path(), &gradient_rgba(6, 4));
    let source = open_source(&path).unwrap();
    assert_eq!(source.probe().unwrap(), Size::new(6, 4));
}

#[test]
fn test_open_source_falls_back_to_image_file() {
    let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    let img = gradient_rgba(9, 5);
    img.save(file.path()).unwrap();

    let source = open_source(file.path()).unwrap();
    assert!(source.name().ends_with(".png"));
    assert_eq!(source.probe().unwrap(), Size::new(9, 5));

    let mut decoder = source.open().unwrap();
    let buf = decoder
        .decode_region(Rect::new(3, 2, 9, 5), 1, &ReusePool::new(0))
        .unwrap();
    assert_eq!((buf.width(), buf.height()), (6, 3));
    assert_eq!(buf.rgba_at(0, 0), img.get_pixel(3, 2).0);
}

#[test]
fn test_open_source_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = open_source(&dir.path().join("missing.png")).err().unwrap();
    assert!(matches!(err, GigaviewError::Io(_)));
}

#[test]
fn test_unreadable_image_fails_probe() {
    let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    fs::write(file.path(), b"definitely not a png").unwrap();
    let source = open_source(file.path()).unwrap();
    assert!(source.probe().is_err());
    assert!(matches!(source.open().err().unwrap(), GigaviewError::Open(_)));
}

// ---------------------------------------------------------------------------
// Synthetic source
// ---------------------------------------------------------------------------

#[test]
fn test_synthetic_decodes_pattern() {
    let size = Size::new(5000, 3000);
    let source = SyntheticSource::new(size);
    assert_eq!(source.name(), format!("synthetic:{size}"));
    assert_eq!(source.probe().unwrap(), size);

    let mut decoder = source.open().unwrap();
    let buf = decoder
        .decode_region(Rect::new(1000, 500, 1100, 600), 1, &ReusePool::new(0))
        .unwrap();
    assert_eq!(buf.rgba_at(0, 0), pattern_pixel(1000, 500, size));
    assert_eq!(buf.rgba_at(50, 20), pattern_pixel(1050, 520, size));
}

#[test]
fn test_synthetic_grid_lines_are_white() {
    let size = Size::new(4096, 4096);
    assert_eq!(pattern_pixel(1024, 7, size), [255, 255, 255, 255]);
    assert_ne!(pattern_pixel(1030, 7, size), [255, 255, 255, 255]);
}

#[test]
fn test_synthetic_downsample_size() {
    let size = Size::new(5000, 3000);
    let mut decoder = SyntheticSource::new(size).open().unwrap();
    let rect = Rect::new(0, 0, 5000, 3000);
    let buf = decoder.decode_region(rect, 16, &ReusePool::new(0)).unwrap();
    assert_eq!(Size::new(buf.width(), buf.height()), decoded_size(&rect, 16));
    assert_eq!((buf.width(), buf.height()), (313, 188));
}

#[test]
fn test_synthetic_empty_size_rejected() {
    let source = SyntheticSource::new(Size::new(0, 10));
    assert!(source.probe().is_err());
    assert!(matches!(source.open().err().unwrap(), GigaviewError::Open(_)));
}
