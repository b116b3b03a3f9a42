//! Background flush orchestration
//!
//! The [`FlushManager`] owns the periodic flush ticker and a worker
//! thread fed by a channel of flush requests. Writers register through
//! two capability traits: [`BufferedWriter`] for components with
//! user-space buffers to drain, and [`DurableWriter`] for components that
//! can force bytes to stable storage. A flush pass drains every buffered
//! writer, then fsyncs every durable writer when the durability level
//! requires it.
//!
//! Priorities:
//! - `critical` bypasses the in-progress guard and runs inline
//! - `normal` / `high` run inline when the last flush is old enough and
//!   nothing is in flight, otherwise they are deferred on a single-shot
//!   timer
//! - `low` is queued for the worker
//!
//! Background flush failures are logged, never fatal; the consecutive
//! failure count is the durability manager's health signal.

use crate::config::Tunables;
use basalt_core::{CancelToken, Error, Result};

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::{error, warn};
use parking_lot::Mutex;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Hard ceiling on how long a flush completion-wait may block
pub const FLUSH_WAIT_CEILING: Duration = Duration::from_secs(30);

/// A component holding user-space buffers the flush pass must drain
pub trait BufferedWriter: Send + Sync {
    fn flush_file(&self, path: &Path) -> Result<()>;
    fn flush_all(&self) -> Result<()>;
}

/// A component that can force written bytes to stable storage
pub trait DurableWriter: Send + Sync {
    fn fsync_file(&self, path: &Path) -> Result<()>;
    fn fsync_all(&self) -> Result<()>;
}

/// Urgency of a flush request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushPriority {
    Low,
    Normal,
    High,
    Critical,
}

/// Counters for the flush machinery
#[derive(Debug, Default)]
pub struct FlushMetrics {
    flushes_requested: AtomicU64,
    flushes_completed: AtomicU64,
    flushes_deferred: AtomicU64,
    flushes_skipped: AtomicU64,
    flush_failures: AtomicU64,
}

impl FlushMetrics {
    pub fn flushes_requested(&self) -> u64 {
        self.flushes_requested.load(Ordering::Relaxed)
    }

    pub fn flushes_completed(&self) -> u64 {
        self.flushes_completed.load(Ordering::Relaxed)
    }

    pub fn flushes_deferred(&self) -> u64 {
        self.flushes_deferred.load(Ordering::Relaxed)
    }

    /// Flushes skipped because another flush was already in progress
    pub fn flushes_skipped(&self) -> u64 {
        self.flushes_skipped.load(Ordering::Relaxed)
    }

    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }
}

enum Command {
    Flush {
        paths: Option<Vec<PathBuf>>,
        completion: Option<Sender<Result<()>>>,
    },
    Schedule {
        delay: Duration,
        paths: Option<Vec<PathBuf>>,
    },
    Shutdown,
}

struct FlushShared {
    buffered: Vec<Arc<dyn BufferedWriter>>,
    durable: Vec<Arc<dyn DurableWriter>>,
    fsync_on_flush: bool,
    tunables: Arc<Tunables>,
    flush_in_progress: AtomicBool,
    last_flush: Mutex<Instant>,
    consecutive_failures: AtomicU32,
    metrics: FlushMetrics,
}

impl FlushShared {
    /// Runs one flush pass: drain buffers, then fsync when the policy
    /// requires it. Errors are accumulated and the last one returned
    /// after every writer has been attempted.
    fn run_writers(&self, paths: Option<&[PathBuf]>) -> Result<()> {
        let mut last_error = None;

        for writer in &self.buffered {
            let result = match paths {
                Some(paths) => paths.iter().try_for_each(|path| writer.flush_file(path)),
                None => writer.flush_all(),
            };
            if let Err(err) = result {
                last_error = Some(err);
            }
        }

        if self.fsync_on_flush {
            for writer in &self.durable {
                if let Err(err) = writer.fsync_all() {
                    last_error = Some(err);
                }
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Executes a flush, with or without the in-progress admission guard
    ///
    /// Returns `Ok(false)` when the guard was respected and another flush
    /// was already running (success-no-op for the caller).
    fn execute(&self, paths: Option<&[PathBuf]>, respect_guard: bool) -> Result<bool> {
        let owns_guard = self
            .flush_in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if respect_guard && !owns_guard {
            self.metrics.flushes_skipped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        let result = self.run_writers(paths);
        if owns_guard {
            self.flush_in_progress.store(false, Ordering::SeqCst);
        }
        *self.last_flush.lock() = Instant::now();

        match result {
            Ok(()) => {
                self.metrics.flushes_completed.fetch_add(1, Ordering::Relaxed);
                self.consecutive_failures.store(0, Ordering::SeqCst);
                Ok(true)
            }
            Err(err) => {
                self.metrics.flush_failures.fetch_add(1, Ordering::Relaxed);
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                error!("flush pass failed ({} consecutive): {}", failures, err);
                Err(err)
            }
        }
    }
}

/// Owns the flush worker thread and the request queue
pub struct FlushManager {
    tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shared: Arc<FlushShared>,
}

impl FlushManager {
    /// Builds the manager and spawns its worker
    ///
    /// With `periodic` set, the worker ticks every `flush_interval` and
    /// runs a full flush pass on its own.
    pub fn new(
        buffered: Vec<Arc<dyn BufferedWriter>>,
        durable: Vec<Arc<dyn DurableWriter>>,
        fsync_on_flush: bool,
        tunables: Arc<Tunables>,
        periodic: bool,
    ) -> Self {
        let shared = Arc::new(FlushShared {
            buffered,
            durable,
            fsync_on_flush,
            tunables,
            flush_in_progress: AtomicBool::new(false),
            last_flush: Mutex::new(Instant::now()),
            consecutive_failures: AtomicU32::new(0),
            metrics: FlushMetrics::default(),
        });

        let (tx, rx) = unbounded();
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::spawn(move || worker_loop(rx, worker_shared, periodic));

        Self {
            tx,
            worker: Mutex::new(Some(worker)),
            shared,
        }
    }

    /// Requests a flush of the given paths (or everything) at a priority
    pub fn request_flush(
        &self,
        paths: Option<Vec<PathBuf>>,
        priority: FlushPriority,
    ) -> Result<()> {
        self.shared
            .metrics
            .flushes_requested
            .fetch_add(1, Ordering::Relaxed);

        match priority {
            FlushPriority::Critical => self.shared.execute(paths.as_deref(), false).map(|_| ()),
            FlushPriority::Normal | FlushPriority::High => {
                let interval = self.shared.tunables.flush_interval();
                let since_last = self.shared.last_flush.lock().elapsed();
                let busy = self.shared.flush_in_progress.load(Ordering::SeqCst);

                if since_last >= interval / 2 && !busy {
                    self.shared.execute(paths.as_deref(), true).map(|_| ())
                } else {
                    self.shared
                        .metrics
                        .flushes_deferred
                        .fetch_add(1, Ordering::Relaxed);
                    let delay = (interval / 2).saturating_sub(since_last);
                    self.send(Command::Schedule { delay, paths })
                }
            }
            FlushPriority::Low => self.send(Command::Flush {
                paths,
                completion: None,
            }),
        }
    }

    /// Flushes everything and waits for completion
    ///
    /// The request is serialized through the worker, so concurrent
    /// callers each get a completed flush without racing the guard. The
    /// wait is bounded by the token's deadline and the 30-second ceiling.
    pub fn force_flush(&self, token: &CancelToken) -> Result<()> {
        token.checkpoint()?;

        let (completion_tx, completion_rx) = bounded(1);
        self.send(Command::Flush {
            paths: None,
            completion: Some(completion_tx),
        })?;

        let ceiling = match token.remaining() {
            Some(remaining) => remaining.min(FLUSH_WAIT_CEILING),
            None => FLUSH_WAIT_CEILING,
        };
        match completion_rx.recv_timeout(ceiling) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Cancelled(format!(
                "flush completion wait exceeded {:?}",
                ceiling
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::IoPermanent("flush worker is gone".to_string()))
            }
        }
    }

    /// Schedules a flush to run after `delay`
    pub fn schedule_flush(&self, delay: Duration, paths: Option<Vec<PathBuf>>) -> Result<()> {
        self.shared
            .metrics
            .flushes_deferred
            .fetch_add(1, Ordering::Relaxed);
        self.send(Command::Schedule { delay, paths })
    }

    /// Stops the ticker and joins the worker; idempotent
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = self.tx.send(Command::Shutdown);
            if worker.join().is_err() {
                warn!("flush worker panicked during shutdown");
            }
        }
    }

    /// Consecutive background flush failures since the last success
    pub fn consecutive_failures(&self) -> u32 {
        self.shared.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn metrics(&self) -> &FlushMetrics {
        &self.shared.metrics
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::NotReady)
    }
}

impl Drop for FlushManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(rx: Receiver<Command>, shared: Arc<FlushShared>, periodic: bool) {
    let mut deferred: Vec<(Instant, Option<Vec<PathBuf>>)> = Vec::new();
    let mut next_tick = next_tick_after(&shared, periodic, Instant::now());

    loop {
        let deadline = match (next_tick, deferred.iter().map(|(at, _)| *at).min()) {
            (Some(tick), Some(deferred_at)) => Some(tick.min(deferred_at)),
            (tick, deferred_at) => tick.or(deferred_at),
        };

        let command = match deadline {
            Some(deadline) => match rx.recv_deadline(deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            },
        };

        match command {
            Some(Command::Flush { paths, completion }) => {
                let result = shared.execute(paths.as_deref(), false).map(|_| ());
                if let Some(completion) = completion {
                    let _ = completion.send(result);
                }
            }
            Some(Command::Schedule { delay, paths }) => {
                deferred.push((Instant::now() + delay, paths));
            }
            Some(Command::Shutdown) => return,
            None => {
                let now = Instant::now();

                if let Some(tick) = next_tick {
                    if now >= tick {
                        // Periodic pass: failures are logged inside execute
                        let _ = shared.execute(None, true);
                        next_tick = next_tick_after(&shared, periodic, now);
                    }
                }

                let mut due = Vec::new();
                deferred.retain(|(at, paths)| {
                    if *at <= now {
                        due.push(paths.clone());
                        false
                    } else {
                        true
                    }
                });
                for paths in due {
                    let _ = shared.execute(paths.as_deref(), true);
                }
            }
        }
    }
}

fn next_tick_after(shared: &FlushShared, periodic: bool, now: Instant) -> Option<Instant> {
    if !periodic {
        return None;
    }
    let interval = shared.tunables.flush_interval();
    if interval.is_zero() {
        return None;
    }
    Some(now + interval)
}
