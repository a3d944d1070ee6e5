use thiserror::Error;

use crate::geometry::Rect;

#[derive(Error, Debug)]
pub enum GigaviewError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Failed to open image source: {0}")]
    Open(String),

    #[error("Failed to decode region {rect}: {message}")]
    Decode { rect: Rect, message: String },

    #[error("Rotation must be a multiple of 90 degrees, got {degrees}")]
    InvalidRotation { degrees: i32 },

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Invalid raster file: {0}")]
    InvalidRaster(String),

    #[error("Invalid viewer config: {0}")]
    InvalidConfig(String),

    #[error("Decode session is closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, GigaviewError>;
