//! Synchronous file writer with fsync and barrier semantics
//!
//! [`SyncFileWriter`] is the fully-durable half of the write path: a call
//! returns only once the bytes are on stable storage (or the retry budget
//! for a transient failure is exhausted). Under the `strict` durability
//! level files are opened with the OS synchronous-write flag and every
//! write is bracketed by fsync barriers, imposing a total durable order.
//!
//! File handles are cached in a path-keyed map behind a read/write lock
//! with a double-checked lookup on open, so the hot path is a shared read
//! lock plus a per-file mutex.

use crate::config::Tunables;
use crate::flush::DurableWriter;
use crate::retry::RetryPolicy;
use crate::testing::FaultInjector;
use basalt_core::{CancelToken, DurabilityLevel, Result};

use parking_lot::{Mutex, RwLock};

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// One write inside a [`SyncFileWriter::batch_write_sync`] submission
#[derive(Debug, Clone)]
pub struct BatchWrite {
    pub path: PathBuf,
    pub data: Vec<u8>,
    /// Absolute offset, or `None` to append
    pub offset: Option<u64>,
}

/// Metrics for the synchronous write path
#[derive(Debug, Default)]
pub struct SyncWriterMetrics {
    sync_operations: AtomicU64,
    total_latency_us: AtomicU64,
    barrier_operations: AtomicU64,
    fsync_errors: AtomicU64,
}

impl SyncWriterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record_sync(&self, latency_us: u64) {
        self.sync_operations.fetch_add(1, Ordering::Relaxed);
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);
    }

    fn record_barrier(&self) {
        self.barrier_operations.fetch_add(1, Ordering::Relaxed);
    }

    fn record_fsync_error(&self) {
        self.fsync_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sync_operations(&self) -> u64 {
        self.sync_operations.load(Ordering::Relaxed)
    }

    pub fn total_latency_us(&self) -> u64 {
        self.total_latency_us.load(Ordering::Relaxed)
    }

    /// Mean latency of a completed sync write in microseconds
    pub fn average_latency_us(&self) -> f64 {
        let operations = self.sync_operations();
        if operations == 0 {
            0.0
        } else {
            self.total_latency_us() as f64 / operations as f64
        }
    }

    pub fn barrier_operations(&self) -> u64 {
        self.barrier_operations.load(Ordering::Relaxed)
    }

    pub fn fsync_errors(&self) -> u64 {
        self.fsync_errors.load(Ordering::Relaxed)
    }
}

struct FileHandle {
    file: Mutex<File>,
}

/// Performs synchronous writes with fsync, retries, and write barriers
pub struct SyncFileWriter {
    handles: RwLock<HashMap<PathBuf, Arc<FileHandle>>>,
    strict: bool,
    write_barriers: bool,
    sync_writes: bool,
    tunables: Arc<Tunables>,
    metrics: Arc<SyncWriterMetrics>,
    fault: FaultInjector,
}

impl SyncFileWriter {
    pub fn new(
        level: DurabilityLevel,
        sync_writes: bool,
        write_barriers: bool,
        tunables: Arc<Tunables>,
    ) -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
            strict: level == DurabilityLevel::Strict,
            write_barriers,
            sync_writes: sync_writes || level.requires_fsync(),
            tunables,
            metrics: Arc::new(SyncWriterMetrics::new()),
            fault: FaultInjector::new(),
        }
    }

    /// Writes `data` durably at `offset` (or appended) and returns only
    /// once it is on disk
    ///
    /// The sequence is: barrier fsync (if `write_barriers`), the write,
    /// fsync, and under `strict` a trailing barrier. Transient fsync
    /// failures are retried with exponential backoff; everything else
    /// fails fast.
    pub fn write_sync(
        &self,
        path: &Path,
        data: &[u8],
        offset: Option<u64>,
        token: &CancelToken,
    ) -> Result<()> {
        let started = Instant::now();
        let handle = self.handle(path)?;
        let mut file = handle.file.lock();

        if self.write_barriers {
            self.barrier_locked(&file, token)?;
        }

        match offset {
            Some(offset) => file.seek(SeekFrom::Start(offset))?,
            None => file.seek(SeekFrom::End(0))?,
        };
        file.write_all(data)?;

        if self.sync_writes {
            self.fsync_locked(&file, token)?;
        }
        if self.strict {
            self.barrier_locked(&file, token)?;
        }

        self.metrics
            .record_sync(started.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Writes a batch durably: one pre-barrier, all writes per file in
    /// submitted order, one fsync per file, one post-barrier under strict
    pub fn batch_write_sync(&self, writes: &[BatchWrite], token: &CancelToken) -> Result<()> {
        let started = Instant::now();

        // Group by path, preserving first-seen file order
        let mut order: Vec<&PathBuf> = Vec::new();
        let mut groups: HashMap<&PathBuf, Vec<&BatchWrite>> = HashMap::new();
        for write in writes {
            groups
                .entry(&write.path)
                .or_insert_with(|| {
                    order.push(&write.path);
                    Vec::new()
                })
                .push(write);
        }

        if self.write_barriers {
            for path in &order {
                let handle = self.handle(path)?;
                let file = handle.file.lock();
                self.barrier_locked(&file, token)?;
            }
        }

        for path in &order {
            let handle = self.handle(path)?;
            let mut file = handle.file.lock();

            for write in &groups[*path] {
                match write.offset {
                    Some(offset) => file.seek(SeekFrom::Start(offset))?,
                    None => file.seek(SeekFrom::End(0))?,
                };
                file.write_all(&write.data)?;
            }

            if self.sync_writes {
                self.fsync_locked(&file, token)?;
            }
            if self.strict {
                self.barrier_locked(&file, token)?;
            }
        }

        self.metrics
            .record_sync(started.elapsed().as_micros() as u64);
        Ok(())
    }

    /// Forces a file to stable storage; opens it if not already cached
    pub fn fsync_path(&self, path: &Path, token: &CancelToken) -> Result<()> {
        let handle = self.handle(path)?;
        let file = handle.file.lock();
        self.fsync_locked(&file, token)
    }

    /// Forces every cached file to stable storage
    ///
    /// Errors are accumulated; the last one is returned after all files
    /// have been attempted.
    pub fn fsync_all_files(&self, token: &CancelToken) -> Result<()> {
        let handles: Vec<Arc<FileHandle>> = self.handles.read().values().cloned().collect();

        let mut last_error = None;
        for handle in handles {
            let file = handle.file.lock();
            if let Err(err) = self.fsync_locked(&file, token) {
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Issues an ordering barrier with no payload
    ///
    /// With a path, the barrier covers that file; with `None` it covers
    /// every cached file, so the durability manager can impose a global
    /// order between writes it has already routed.
    pub fn write_barrier(&self, path: Option<&Path>, token: &CancelToken) -> Result<()> {
        match path {
            Some(path) => {
                let handle = self.handle(path)?;
                let file = handle.file.lock();
                self.barrier_locked(&file, token)
            }
            None => {
                let handles: Vec<Arc<FileHandle>> =
                    self.handles.read().values().cloned().collect();
                for handle in handles {
                    let file = handle.file.lock();
                    self.barrier_locked(&file, token)?;
                }
                Ok(())
            }
        }
    }

    pub fn metrics(&self) -> Arc<SyncWriterMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fault hooks for failure-path tests
    pub fn fault_injector(&self) -> &FaultInjector {
        &self.fault
    }

    /// Looks up or opens the cached handle for a path
    ///
    /// Double-checked: the common case takes only the read lock, and a
    /// racing open is resolved under the write lock.
    fn handle(&self, path: &Path) -> Result<Arc<FileHandle>> {
        if let Some(handle) = self.handles.read().get(path) {
            return Ok(Arc::clone(handle));
        }

        let mut handles = self.handles.write();
        if let Some(handle) = handles.get(path) {
            return Ok(Arc::clone(handle));
        }

        let file = self.open_file(path)?;
        let handle = Arc::new(FileHandle {
            file: Mutex::new(file),
        });
        handles.insert(path.to_path_buf(), Arc::clone(&handle));
        Ok(handle)
    }

    #[cfg(unix)]
    fn open_file(&self, path: &Path) -> Result<File> {
        use std::os::unix::fs::OpenOptionsExt;

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        if self.strict {
            options.custom_flags(libc::O_SYNC);
        }
        Ok(options.open(path)?)
    }

    #[cfg(not(unix))]
    fn open_file(&self, path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?)
    }

    fn fsync_locked(&self, file: &File, token: &CancelToken) -> Result<()> {
        self.retry_policy().run(token, || {
            if let Some(err) = self.fault.next_fsync_error() {
                self.metrics.record_fsync_error();
                return Err(err.into());
            }
            file.sync_data().map_err(|err| {
                self.metrics.record_fsync_error();
                err.into()
            })
        })
    }

    fn barrier_locked(&self, file: &File, token: &CancelToken) -> Result<()> {
        self.fsync_locked(file, token)?;
        self.metrics.record_barrier();
        Ok(())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.tunables.max_retries(), self.tunables.retry_delay())
    }
}

impl DurableWriter for SyncFileWriter {
    fn fsync_file(&self, path: &Path) -> Result<()> {
        self.fsync_path(path, &CancelToken::none())
    }

    fn fsync_all(&self) -> Result<()> {
        self.fsync_all_files(&CancelToken::none())
    }
}
