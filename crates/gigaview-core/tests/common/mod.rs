#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use gigaview_core::decoder::{decoded_size, ImageSource, RegionDecoder};
use gigaview_core::error::{GigaviewError, Result};
use gigaview_core::geometry::{Rect, Size};
use gigaview_core::pool::{BufferPool, PixelBuffer, PixelFormat};

/// Colour every scripted decode fills its buffer with.
pub const TILE_COLOR: [u8; 4] = [10, 200, 30, 255];

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Blocks scripted decodes until opened.
#[derive(Clone)]
pub struct Gate {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn open() -> Self {
        Self {
            state: Arc::new((Mutex::new(true), Condvar::new())),
        }
    }

    pub fn closed() -> Self {
        Self {
            state: Arc::new((Mutex::new(false), Condvar::new())),
        }
    }

    pub fn close(&self) {
        *self.state.0.lock().unwrap() = false;
    }

    pub fn release(&self) {
        let (lock, cvar) = &*self.state;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    pub fn wait(&self) {
        let (lock, cvar) = &*self.state;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cvar.wait(open).unwrap();
        }
    }
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// Shared knobs and counters of a [`ScriptedSource`].
pub struct Script {
    pub size: Size,
    pub gate: Gate,
    pub fail_open: AtomicBool,
    pub fail_decodes: AtomicBool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    /// Decodes that reached the decoder, gated or not.
    pub entered: AtomicUsize,
    pub decoded: Mutex<Vec<(Rect, u32)>>,
}

impl Script {
    pub fn decoded(&self) -> Vec<(Rect, u32)> {
        self.decoded.lock().unwrap().clone()
    }
}

/// In-memory source whose decoder can be blocked and made to fail.
#[derive(Clone)]
pub struct ScriptedSource {
    pub script: Arc<Script>,
}

impl ScriptedSource {
    pub fn new(size: Size) -> Self {
        Self::with_gate(size, Gate::open())
    }

    pub fn with_gate(size: Size, gate: Gate) -> Self {
        Self {
            script: Arc::new(Script {
                size,
                gate,
                fail_open: AtomicBool::new(false),
                fail_decodes: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                entered: AtomicUsize::new(0),
                decoded: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn failing_open(size: Size) -> Self {
        let source = Self::new(size);
        source.script.fail_open.store(true, Ordering::SeqCst);
        source
    }

    pub fn shared(&self) -> Arc<dyn ImageSource> {
        Arc::new(self.clone())
    }
}

impl ImageSource for ScriptedSource {
    fn name(&self) -> String {
        format!("scripted:{}", self.script.size)
    }

    fn probe(&self) -> Result<Size> {
        Ok(self.script.size)
    }

    fn open(&self) -> Result<Box<dyn RegionDecoder>> {
        self.script.opens.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_open.load(Ordering::SeqCst) {
            return Err(GigaviewError::Open("scripted open failure".into()));
        }
        Ok(Box::new(ScriptedDecoder {
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedDecoder {
    script: Arc<Script>,
}

impl RegionDecoder for ScriptedDecoder {
    fn image_size(&self) -> Size {
        self.script.size
    }

    fn decode_region(
        &mut self,
        rect: Rect,
        sample_size: u32,
        pool: &dyn BufferPool,
    ) -> Result<PixelBuffer> {
        self.script.entered.fetch_add(1, Ordering::SeqCst);
        self.script.gate.wait();
        self.script.decoded.lock().unwrap().push((rect, sample_size));
        if self.script.fail_decodes.load(Ordering::SeqCst) {
            return Err(GigaviewError::Decode {
                rect,
                message: "scripted decode failure".into(),
            });
        }
        let out = decoded_size(&rect, sample_size);
        let mut buffer = pool.acquire(out.width, out.height, PixelFormat::Rgba8);
        for px in buffer.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&TILE_COLOR);
        }
        Ok(buffer)
    }

    fn close(&mut self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Counting pool
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PoolLedger {
    outstanding: HashSet<u64>,
    acquired: usize,
    released: usize,
    double_releases: usize,
}

/// Pool that never reuses buffers and records every acquire and release by
/// buffer id, so a second release of the same buffer is caught.
#[derive(Default)]
pub struct CountingPool {
    ledger: Mutex<PoolLedger>,
}

impl CountingPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn acquired(&self) -> usize {
        self.ledger.lock().unwrap().acquired
    }

    pub fn released(&self) -> usize {
        self.ledger.lock().unwrap().released
    }

    pub fn outstanding(&self) -> usize {
        self.ledger.lock().unwrap().outstanding.len()
    }

    pub fn double_releases(&self) -> usize {
        self.ledger.lock().unwrap().double_releases
    }
}

impl BufferPool for CountingPool {
    fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        let buffer = PixelBuffer::new(width, height, format);
        let mut ledger = self.ledger.lock().unwrap();
        ledger.acquired += 1;
        ledger.outstanding.insert(buffer.id());
        buffer
    }

    fn release(&self, buffer: PixelBuffer) {
        let mut ledger = self.ledger.lock().unwrap();
        ledger.released += 1;
        if !ledger.outstanding.remove(&buffer.id()) {
            ledger.double_releases += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Poll `cond` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub const WAIT: Duration = Duration::from_secs(5);
