use std::time::Duration;

/// Default tile edge length in decoded pixels. The source-space edge is this
/// times the sample size.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Smallest tile edge accepted by config validation.
pub const MIN_TILE_SIZE: u32 = 16;

/// Default decoded-pixel budget per device pixel. A tile is never decoded at
/// more than this many pixels per displayed pixel along each axis.
pub const DEFAULT_MAX_OVERSAMPLE: f64 = 2.0;

/// Default number of tile edges kept around the visible rect before eviction.
pub const DEFAULT_EVICTION_MARGIN_TILES: u32 = 1;

/// Default number of decode attempts per tile before it stays `Failed`.
pub const DEFAULT_MAX_TILE_ATTEMPTS: u32 = 3;

/// Default consecutive decode failures before a session-level notification.
pub const DEFAULT_FAILURE_NOTIFY_THRESHOLD: u32 = 8;

/// Default bounded wait for the decode worker during shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 500;

/// Default maximum zoom relative to the larger of origin (1:1) and fill scale.
pub const DEFAULT_MAX_ZOOM_OVER_ORIGIN: f64 = 2.0;

/// Default zoom animation duration.
pub const DEFAULT_ZOOM_ANIMATION_MS: u64 = 200;

/// Scale at which one source pixel covers one device pixel.
pub const ORIGIN_SCALE: f64 = 1.0;

/// Maximum taps per axis when box-averaging a downsampled pixel.
pub const MAX_DOWNSAMPLE_TAPS: u32 = 4;

/// Fling velocity (device px/s) below which a fling stops.
pub const FLING_MIN_VELOCITY: f64 = 50.0;

/// Fraction of fling velocity retained after one second.
pub const FLING_FRICTION_PER_SECOND: f64 = 0.05;

/// Two scales closer than this are considered equal.
pub const SCALE_EPSILON: f64 = 1e-6;

/// Minimum pixel count (h*w) to use row-level Rayon parallelism when
/// compositing.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Name given to per-session decode worker threads.
pub const DECODE_THREAD_NAME: &str = "gigaview-decode";

/// Upper bound on a single poll of the worker event channel when the host
/// waits for decodes.
pub const MAX_PUMP_WAIT: Duration = Duration::from_secs(5);
