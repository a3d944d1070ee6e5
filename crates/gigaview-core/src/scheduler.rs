//! Serial decode worker for one session.
//!
//! Requests are tagged with the session generation and checked against it
//! both before and after the decoder runs, so advancing the generation is
//! enough to cancel everything in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::consts::DECODE_THREAD_NAME;
use crate::decoder::{ImageSource, RegionDecoder};
use crate::error::{GigaviewError, Result};
use crate::geometry::{Rect, Size};
use crate::pool::{BufferPool, PixelBuffer};
use crate::tile::TileKey;

/// Wake-up hook run on the worker thread after each event is sent, so a host
/// event loop knows to call `pump`.
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Shared session generation counter.
///
/// Clones share one counter. Advancing it invalidates every request tagged
/// with an older value, on every thread, without touching the requests.
#[derive(Clone, Debug, Default)]
pub struct Generation(Arc<AtomicU64>);

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Bump the counter and return the new live value.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn is_live(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

/// One region to decode, tagged with the generation it was requested under.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeRequest {
    pub key: TileKey,
    pub source_rect: Rect,
    pub generation: u64,
}

/// Outcome of one decode, delivered back to the owning thread.
#[derive(Debug)]
pub struct TileResult {
    pub key: TileKey,
    pub generation: u64,
    /// Ticket returned by [`DecodeScheduler::enqueue`] for this request.
    pub ticket: u64,
    pub outcome: Result<PixelBuffer>,
}

/// Messages from the decode worker to the thread owning the tiles.
#[derive(Debug)]
pub enum DecodeEvent {
    /// The region decoder opened.
    Opened { size: Size },
    /// The region decoder could not be opened. Sent at most once.
    OpenFailed { message: String },
    /// The worker picked up a request and is decoding it.
    Started {
        key: TileKey,
        generation: u64,
        ticket: u64,
    },
    Completed(TileResult),
}

enum WorkerCommand {
    Decode { request: DecodeRequest, ticket: u64 },
    Shutdown,
}

/// Latest ticket per key still waiting in the queue. A request whose ticket
/// is no longer here was superseded or cancelled.
type PendingMap = Arc<Mutex<HashMap<TileKey, u64>>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<TileKey, u64>> {
    pending.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Serial decode queue bound to one region decoder on one worker thread.
///
/// Requests run in enqueue order, one at a time. The decoder is opened on
/// the worker when the first request arrives and closed there on shutdown.
pub struct DecodeScheduler {
    commands: mpsc::Sender<WorkerCommand>,
    pending: PendingMap,
    generation: Generation,
    next_ticket: u64,
    handle: Option<JoinHandle<()>>,
    done: mpsc::Receiver<()>,
    shutdown_timeout: Duration,
}

impl DecodeScheduler {
    /// Start the worker thread for `source`. Decode events are sent on
    /// `events`; `notify` is run after each one.
    pub fn spawn(
        source: Arc<dyn ImageSource>,
        pool: Arc<dyn BufferPool>,
        generation: Generation,
        events: mpsc::Sender<DecodeEvent>,
        notify: Option<Notify>,
        shutdown_timeout: Duration,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel::<WorkerCommand>();
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let pending = PendingMap::default();

        let worker_generation = generation.clone();
        let worker_pending = Arc::clone(&pending);
        let handle = std::thread::Builder::new()
            .name(DECODE_THREAD_NAME.into())
            .spawn(move || {
                // The decoder lives and dies on this thread.
                let worker = Worker {
                    source,
                    pool,
                    generation: worker_generation,
                    pending: worker_pending,
                    events,
                    notify,
                    decoder: None,
                    open_failed: false,
                };
                worker.run(cmd_rx);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            commands: cmd_tx,
            pending,
            generation,
            next_ticket: 0,
            handle: Some(handle),
            done: done_rx,
            shutdown_timeout,
        })
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Queue a decode without blocking. A request already waiting for the
    /// same key is superseded. Returns the request's ticket, echoed in its
    /// `Started` and `Completed` events. Tickets start at 1.
    pub fn enqueue(&mut self, request: DecodeRequest) -> Result<u64> {
        if self.handle.is_none() {
            return Err(GigaviewError::SessionClosed);
        }
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        if lock(&self.pending).insert(request.key, ticket).is_some() {
            trace!(rect = %request.key.cell, "coalesced decode request");
        }
        if self
            .commands
            .send(WorkerCommand::Decode { request, ticket })
            .is_err()
        {
            lock(&self.pending).remove(&request.key);
            return Err(GigaviewError::SessionClosed);
        }
        Ok(ticket)
    }

    /// Drop the queued request for `key`, if any.
    pub fn cancel(&mut self, key: &TileKey) -> bool {
        lock(&self.pending).remove(key).is_some()
    }

    /// Drop every queued request. A decode already running finishes and is
    /// filtered by its generation.
    pub fn cancel_all(&mut self) -> usize {
        let mut pending = lock(&self.pending);
        let dropped = pending.len();
        pending.clear();
        if dropped > 0 {
            debug!(dropped, "cancelled queued decodes");
        }
        dropped
    }

    /// Requests queued and not yet picked up by the worker.
    pub fn queued(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the worker, waiting at most the configured timeout for it to
    /// finish its current decode and close the decoder. Past the timeout the
    /// worker is detached and closes the decoder on its own.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.cancel_all();
        let _ = self.commands.send(WorkerCommand::Shutdown);
        match self.done.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    warn!("decode worker panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = self.shutdown_timeout.as_millis() as u64,
                    "decode worker still busy, detaching"
                );
            }
        }
    }
}

impl Drop for DecodeScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct Worker {
    source: Arc<dyn ImageSource>,
    pool: Arc<dyn BufferPool>,
    generation: Generation,
    pending: PendingMap,
    events: mpsc::Sender<DecodeEvent>,
    notify: Option<Notify>,
    decoder: Option<Box<dyn RegionDecoder>>,
    open_failed: bool,
}

impl Worker {
    fn run(mut self, commands: mpsc::Receiver<WorkerCommand>) {
        while let Ok(command) = commands.recv() {
            match command {
                WorkerCommand::Decode { request, ticket } => self.handle(request, ticket),
                WorkerCommand::Shutdown => break,
            }
        }
        if let Some(mut decoder) = self.decoder.take() {
            decoder.close();
            debug!(source = %self.source.name(), "region decoder closed");
        }
    }

    fn handle(&mut self, request: DecodeRequest, ticket: u64) {
        {
            let mut pending = lock(&self.pending);
            if pending.get(&request.key) != Some(&ticket) {
                trace!(rect = %request.key.cell, "skipping superseded request");
                return;
            }
            pending.remove(&request.key);
        }
        if !self.generation.is_live(request.generation) || self.open_failed {
            trace!(rect = %request.key.cell, "skipping stale request");
            return;
        }

        if !self.ensure_open() {
            return;
        }
        self.send(DecodeEvent::Started {
            key: request.key,
            generation: request.generation,
            ticket,
        });

        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        let outcome = decoder.decode_region(
            request.source_rect,
            request.key.sample_size,
            self.pool.as_ref(),
        );

        if !self.generation.is_live(request.generation) {
            trace!(rect = %request.key.cell, "dropping decode finished after cancellation");
            if let Ok(buffer) = outcome {
                self.pool.release(buffer);
            }
            return;
        }
        self.send(DecodeEvent::Completed(TileResult {
            key: request.key,
            generation: request.generation,
            ticket,
            outcome,
        }));
    }

    /// Open the decoder on first use. False once opening has failed.
    fn ensure_open(&mut self) -> bool {
        if self.decoder.is_some() {
            return true;
        }
        match self.source.open() {
            Ok(decoder) => {
                let size = decoder.image_size();
                info!(source = %self.source.name(), size = %size, "region decoder opened");
                self.decoder = Some(decoder);
                self.send(DecodeEvent::Opened { size });
                true
            }
            Err(e) => {
                warn!(source = %self.source.name(), error = %e, "region decoder failed to open");
                self.open_failed = true;
                self.send(DecodeEvent::OpenFailed {
                    message: e.to_string(),
                });
                false
            }
        }
    }

    fn send(&self, event: DecodeEvent) {
        if let Err(mpsc::SendError(event)) = self.events.send(event) {
            // Receiver is gone; the buffer still goes back to the pool.
            if let DecodeEvent::Completed(TileResult {
                outcome: Ok(buffer),
                ..
            }) = event
            {
                self.pool.release(buffer);
            }
            return;
        }
        if let Some(notify) = &self.notify {
            notify();
        }
    }
}
