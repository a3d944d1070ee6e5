use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Pixel layout of a decoded buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Gray8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgba8 => 4,
        }
    }
}

static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// An owned block of decoded pixels, row-major with no padding.
///
/// The id is assigned at allocation and survives reuse, which lets pools and
/// tests follow a buffer through acquire/release cycles.
#[derive(Debug)]
pub struct PixelBuffer {
    id: u64,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn capacity_bytes(&self) -> usize {
        self.data.capacity()
    }

    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /// Pixel as RGBA, gray expanded. Panics when out of bounds.
    pub fn rgba_at(&self, x: u32, y: u32) -> [u8; 4] {
        let bpp = self.format.bytes_per_pixel();
        let i = (y as usize * self.width as usize + x as usize) * bpp;
        match self.format {
            PixelFormat::Gray8 => {
                let v = self.data[i];
                [v, v, v, 255]
            }
            PixelFormat::Rgba8 => [
                self.data[i],
                self.data[i + 1],
                self.data[i + 2],
                self.data[i + 3],
            ],
        }
    }

    /// Reshape in place for reuse, keeping the allocation when it is large enough.
    fn reshape(&mut self, width: u32, height: u32, format: PixelFormat) {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        self.width = width;
        self.height = height;
        self.format = format;
        self.data.clear();
        self.data.resize(len, 0);
    }
}

/// Source of pixel buffers shared by the decode worker and the tile cache.
///
/// `release` takes the buffer by value, so a buffer can be handed back at
/// most once and is unreachable to the caller afterwards.
pub trait BufferPool: Send + Sync {
    fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> PixelBuffer;
    fn release(&self, buffer: PixelBuffer);
}

/// Counters for [`ReusePool`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    pub released: u64,
    pub dropped: u64,
    pub pooled_bytes: usize,
}

struct PoolInner {
    free: VecDeque<PixelBuffer>,
    stats: PoolStats,
}

/// Byte-budgeted free list. Released buffers are kept newest-first and the
/// oldest are dropped once the budget is exceeded.
pub struct ReusePool {
    max_bytes: usize,
    inner: Mutex<PoolInner>,
}

impl ReusePool {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            inner: Mutex::new(PoolInner {
                free: VecDeque::new(),
                stats: PoolStats::default(),
            }),
        }
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.free.clear();
        inner.stats.pooled_bytes = 0;
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BufferPool for ReusePool {
    fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        let needed = width as usize * height as usize * format.bytes_per_pixel();
        let mut inner = self.lock();
        let found = inner
            .free
            .iter()
            .position(|b| b.capacity_bytes() >= needed);
        match found.and_then(|i| inner.free.remove(i)) {
            Some(mut buffer) => {
                inner.stats.hits += 1;
                inner.stats.pooled_bytes -= buffer.capacity_bytes();
                buffer.reshape(width, height, format);
                trace!(id = buffer.id(), width, height, "pool hit");
                buffer
            }
            None => {
                inner.stats.misses += 1;
                drop(inner);
                PixelBuffer::new(width, height, format)
            }
        }
    }

    fn release(&self, buffer: PixelBuffer) {
        let mut inner = self.lock();
        inner.stats.released += 1;
        inner.stats.pooled_bytes += buffer.capacity_bytes();
        inner.free.push_front(buffer);
        while inner.stats.pooled_bytes > self.max_bytes {
            let Some(oldest) = inner.free.pop_back() else {
                break;
            };
            inner.stats.pooled_bytes -= oldest.capacity_bytes();
            inner.stats.dropped += 1;
        }
    }
}
