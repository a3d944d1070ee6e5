use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_EVICTION_MARGIN_TILES, DEFAULT_FAILURE_NOTIFY_THRESHOLD, DEFAULT_MAX_OVERSAMPLE,
    DEFAULT_MAX_TILE_ATTEMPTS, DEFAULT_MAX_ZOOM_OVER_ORIGIN, DEFAULT_SHUTDOWN_TIMEOUT_MS,
    DEFAULT_TILE_SIZE, DEFAULT_ZOOM_ANIMATION_MS, MIN_TILE_SIZE,
};
use crate::error::{GigaviewError, Result};

/// Tuning for the tiled viewer. Every field has a default, so a partial TOML
/// table is a valid config.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Tile edge in decoded pixels.
    pub tile_size: u32,
    /// Overlap added on each side of a tile, in decoded pixels.
    pub tile_border: u32,
    /// Decoded pixels allowed per device pixel before the sample size doubles.
    pub max_oversample: f64,
    /// Tile edges kept around the visible rect before a tile is evicted.
    pub eviction_margin_tiles: u32,
    /// Decode attempts per tile before it is left `Failed`.
    pub max_tile_attempts: u32,
    /// Consecutive failures that raise one session-level notification.
    pub failure_notify_threshold: u32,
    /// Bounded wait for the decode worker during shutdown.
    pub shutdown_timeout_ms: u64,
    /// Max scale as a multiple of max(fill scale, 1:1).
    pub max_zoom_over_origin: f64,
    pub zoom_animation_ms: u64,
    /// Drop tiles while the viewport rests at min scale.
    pub clear_at_min_scale: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            tile_border: 0,
            max_oversample: DEFAULT_MAX_OVERSAMPLE,
            eviction_margin_tiles: DEFAULT_EVICTION_MARGIN_TILES,
            max_tile_attempts: DEFAULT_MAX_TILE_ATTEMPTS,
            failure_notify_threshold: DEFAULT_FAILURE_NOTIFY_THRESHOLD,
            shutdown_timeout_ms: DEFAULT_SHUTDOWN_TIMEOUT_MS,
            max_zoom_over_origin: DEFAULT_MAX_ZOOM_OVER_ORIGIN,
            zoom_animation_ms: DEFAULT_ZOOM_ANIMATION_MS,
            clear_at_min_scale: false,
        }
    }
}

impl ViewerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tile_size < MIN_TILE_SIZE {
            return Err(GigaviewError::InvalidConfig(format!(
                "tile_size must be at least {MIN_TILE_SIZE}, got {}",
                self.tile_size
            )));
        }
        if self.tile_border.saturating_mul(2) >= self.tile_size {
            return Err(GigaviewError::InvalidConfig(format!(
                "tile_border ({}) must be less than half of tile_size ({})",
                self.tile_border, self.tile_size
            )));
        }
        if !self.max_oversample.is_finite() || self.max_oversample < 1.0 {
            return Err(GigaviewError::InvalidConfig(format!(
                "max_oversample must be >= 1.0, got {}",
                self.max_oversample
            )));
        }
        if self.max_tile_attempts == 0 {
            return Err(GigaviewError::InvalidConfig(
                "max_tile_attempts must be > 0".into(),
            ));
        }
        if !self.max_zoom_over_origin.is_finite() || self.max_zoom_over_origin < 1.0 {
            return Err(GigaviewError::InvalidConfig(format!(
                "max_zoom_over_origin must be >= 1.0, got {}",
                self.max_zoom_over_origin
            )));
        }
        Ok(())
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn zoom_animation(&self) -> Duration {
        Duration::from_millis(self.zoom_animation_ms)
    }
}
