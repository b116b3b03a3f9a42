//! Buffered asynchronous file writer
//!
//! [`AsyncFileWriter`] accumulates writes in per-file buffers and flushes
//! them with a single underlying write when a trigger fires: the pending
//! count reaches `batch_size`, the oldest entry ages past
//! `batch_timeout`, or the buffer reaches `buffer_size`. The periodic
//! flush ticker (driven by the flush manager) drains whatever the
//! triggers have not.
//!
//! A buffer's mutex is held only across mutation and copy-out; the
//! underlying write happens outside it, serialized by a per-file I/O
//! lock, so appenders are never blocked behind disk. An append that would
//! overflow `buffer_size` first flushes inline — that blocking is the
//! backpressure signal, and the overflow counter is the tuning signal.

use crate::config::Tunables;
use crate::flush::BufferedWriter;
use crate::retry::RetryPolicy;
use basalt_core::{CancelToken, Error, Result};

use crc32fast::Hasher;
use parking_lot::{Mutex, RwLock};

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A single buffered write awaiting flush
#[derive(Debug, Clone)]
struct WriteEntry {
    data_len: usize,
    offset: Option<u64>,
    enqueued_at: Instant,
    checksum: u32,
}

#[derive(Default)]
struct BufferState {
    entries: Vec<WriteEntry>,
    buffered: Vec<u8>,
}

struct FileBuffer {
    path: PathBuf,
    pending: Mutex<BufferState>,
    // Serializes flushes per file and caches the open handle; appends to
    // `pending` proceed while a flush is writing.
    io: Mutex<Option<File>>,
}

/// Metrics for the buffered write path
#[derive(Debug, Default)]
pub struct AsyncWriterMetrics {
    writes_buffered: AtomicU64,
    flushes_total: AtomicU64,
    flushed_bytes: AtomicU64,
    buffer_overflows: AtomicU64,
    verify_failures: AtomicU64,
    flush_failures: AtomicU64,
}

impl AsyncWriterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes_buffered(&self) -> u64 {
        self.writes_buffered.load(Ordering::Relaxed)
    }

    pub fn flushes_total(&self) -> u64 {
        self.flushes_total.load(Ordering::Relaxed)
    }

    pub fn flushed_bytes(&self) -> u64 {
        self.flushed_bytes.load(Ordering::Relaxed)
    }

    pub fn buffer_overflows(&self) -> u64 {
        self.buffer_overflows.load(Ordering::Relaxed)
    }

    pub fn verify_failures(&self) -> u64 {
        self.verify_failures.load(Ordering::Relaxed)
    }

    pub fn flush_failures(&self) -> u64 {
        self.flush_failures.load(Ordering::Relaxed)
    }
}

/// Per-file buffered writer with bounded batching
pub struct AsyncFileWriter {
    buffers: RwLock<HashMap<PathBuf, Arc<FileBuffer>>>,
    fsync_on_flush: bool,
    tunables: Arc<Tunables>,
    metrics: Arc<AsyncWriterMetrics>,
}

impl AsyncFileWriter {
    pub fn new(fsync_on_flush: bool, tunables: Arc<Tunables>) -> Self {
        Self {
            buffers: RwLock::new(HashMap::new()),
            fsync_on_flush,
            tunables,
            metrics: Arc::new(AsyncWriterMetrics::new()),
        }
    }

    /// Buffers `data` for `path`, flushing first if it would overflow
    ///
    /// The append itself never blocks on disk unless the buffer is full;
    /// in that case the call performs the flush inline before buffering.
    pub fn write_async(&self, path: &Path, data: &[u8], offset: Option<u64>) -> Result<()> {
        let buffer = self.buffer(path);
        let buffer_size = self.tunables.buffer_size();

        loop {
            let flush_now = {
                let mut pending = buffer.pending.lock();

                if !pending.entries.is_empty()
                    && pending.buffered.len() + data.len() > buffer_size
                {
                    self.metrics.buffer_overflows.fetch_add(1, Ordering::Relaxed);
                    drop(pending);
                    // Backpressure: the overflowing append blocks on the
                    // inline flush rather than growing unbounded.
                    self.flush_buffer(&buffer)?;
                    continue;
                }

                pending.entries.push(WriteEntry {
                    data_len: data.len(),
                    offset,
                    enqueued_at: Instant::now(),
                    checksum: checksum_of(data),
                });
                pending.buffered.extend_from_slice(data);
                self.metrics.writes_buffered.fetch_add(1, Ordering::Relaxed);

                pending.entries.len() >= self.tunables.batch_size()
                    || pending.buffered.len() >= buffer_size
                    || pending.entries[0].enqueued_at.elapsed() >= self.tunables.batch_timeout()
            };

            if flush_now {
                self.flush_buffer(&buffer)?;
            }
            return Ok(());
        }
    }

    /// Forces a flush of one file's buffer, regardless of triggers
    pub fn flush_path(&self, path: &Path) -> Result<()> {
        let buffer = self.buffers.read().get(path).cloned();
        match buffer {
            Some(buffer) => self.flush_buffer(&buffer),
            None => Ok(()),
        }
    }

    /// Forces a flush of every buffer
    ///
    /// Errors are accumulated; the last one is returned after every
    /// buffer has been attempted.
    pub fn flush_all_buffers(&self) -> Result<()> {
        let buffers: Vec<Arc<FileBuffer>> = self.buffers.read().values().cloned().collect();

        let mut last_error = None;
        for buffer in buffers {
            if let Err(err) = self.flush_buffer(&buffer) {
                last_error = Some(err);
            }
        }

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Number of buffered writes not yet flushed, across all files
    pub fn pending_entries(&self) -> usize {
        self.buffers
            .read()
            .values()
            .map(|buffer| buffer.pending.lock().entries.len())
            .sum()
    }

    pub fn metrics(&self) -> Arc<AsyncWriterMetrics> {
        Arc::clone(&self.metrics)
    }

    fn buffer(&self, path: &Path) -> Arc<FileBuffer> {
        if let Some(buffer) = self.buffers.read().get(path) {
            return Arc::clone(buffer);
        }

        let mut buffers = self.buffers.write();
        Arc::clone(buffers.entry(path.to_path_buf()).or_insert_with(|| {
            Arc::new(FileBuffer {
                path: path.to_path_buf(),
                pending: Mutex::new(BufferState::default()),
                io: Mutex::new(None),
            })
        }))
    }

    fn flush_buffer(&self, buffer: &FileBuffer) -> Result<()> {
        let mut file_slot = buffer.io.lock();

        let (entries, bytes) = {
            let mut pending = buffer.pending.lock();
            if pending.entries.is_empty() {
                return Ok(());
            }
            (
                std::mem::take(&mut pending.entries),
                std::mem::take(&mut pending.buffered),
            )
        };

        let result = self.write_out(&buffer.path, &mut file_slot, &entries, &bytes);
        match result {
            Ok(()) => {
                self.metrics.flushes_total.fetch_add(1, Ordering::Relaxed);
                self.metrics
                    .flushed_bytes
                    .fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Ok(())
            }
            Err(err) => {
                self.metrics.flush_failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }

    fn write_out(
        &self,
        path: &Path,
        file_slot: &mut Option<File>,
        entries: &[WriteEntry],
        bytes: &[u8],
    ) -> Result<()> {
        if file_slot.is_none() {
            *file_slot = Some(OpenOptions::new().write(true).create(true).open(path)?);
        }
        let file = file_slot.as_mut().expect("file opened above");

        match entries[0].offset {
            Some(offset) => file.seek(SeekFrom::Start(offset))?,
            None => file.seek(SeekFrom::End(0))?,
        };
        file.write_all(bytes)?;

        if self.tunables.verify_writes() {
            if let Err(err) = verify_entries(entries, bytes) {
                self.metrics.verify_failures.fetch_add(1, Ordering::Relaxed);
                return Err(err);
            }
        }

        if self.fsync_on_flush {
            let retry =
                RetryPolicy::new(self.tunables.max_retries(), self.tunables.retry_delay());
            retry.run(&CancelToken::none(), || {
                file.sync_data().map_err(Error::from)
            })?;
        }

        Ok(())
    }
}

impl BufferedWriter for AsyncFileWriter {
    fn flush_file(&self, path: &Path) -> Result<()> {
        self.flush_path(path)
    }

    fn flush_all(&self) -> Result<()> {
        self.flush_all_buffers()
    }
}

fn checksum_of(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Re-derives each entry's checksum over its exact span of the
/// concatenated flush buffer
fn verify_entries(entries: &[WriteEntry], bytes: &[u8]) -> Result<()> {
    let mut start = 0;
    for (index, entry) in entries.iter().enumerate() {
        let end = start + entry.data_len;
        if end > bytes.len() {
            return Err(Error::Corruption(format!(
                "flush verification: entry {} overruns the buffer",
                index
            )));
        }
        let actual = checksum_of(&bytes[start..end]);
        if actual != entry.checksum {
            return Err(Error::Corruption(format!(
                "flush verification: entry {} checksum mismatch (expected {:#x}, got {:#x})",
                index, entry.checksum, actual
            )));
        }
        start = end;
    }

    if start != bytes.len() {
        return Err(Error::Corruption(format!(
            "flush verification: {} trailing bytes not covered by any entry",
            bytes.len() - start
        )));
    }
    Ok(())
}
