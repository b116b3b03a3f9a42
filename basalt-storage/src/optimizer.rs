//! Adaptive coalescing over the synchronous writer
//!
//! For non-strict sync writes, many small appends to the same file can
//! share one underlying write+fsync. The [`SyncOptimizer`] holds small
//! appends briefly in per-file pending groups — bounded by `batch_size`
//! entries or `batch_timeout` of age — concatenates each group, and
//! issues a single [`SyncFileWriter::write_sync`]. Every caller blocks on
//! its own completion channel until the combined write is durable, so the
//! sync-write contract is preserved.
//!
//! Coalescing is strictly append-only: a write carrying an explicit
//! offset, a write at least a quarter of `buffer_size`, and every write
//! under the `strict` level bypass the optimizer entirely. Nothing is
//! ever reordered.

use crate::config::Tunables;
use crate::sync_writer::SyncFileWriter;
use basalt_core::{CancelToken, Error, Result};

use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use log::warn;
use parking_lot::Mutex;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Ceiling on how long a coalesced caller waits for its group's write
const COALESCE_WAIT_CEILING: Duration = Duration::from_secs(30);

/// Counters for the coalescing layer
#[derive(Debug, Default)]
pub struct OptimizerMetrics {
    coalesced_writes: AtomicU64,
    coalesced_batches: AtomicU64,
    passthrough_writes: AtomicU64,
}

impl OptimizerMetrics {
    /// Writes that were combined with others into a shared write+fsync
    pub fn coalesced_writes(&self) -> u64 {
        self.coalesced_writes.load(Ordering::Relaxed)
    }

    /// Combined writes issued on behalf of coalesced groups
    pub fn coalesced_batches(&self) -> u64 {
        self.coalesced_batches.load(Ordering::Relaxed)
    }

    /// Writes forwarded directly to the sync writer
    pub fn passthrough_writes(&self) -> u64 {
        self.passthrough_writes.load(Ordering::Relaxed)
    }
}

enum Command {
    Submit {
        path: PathBuf,
        data: Vec<u8>,
        completion: Sender<Result<()>>,
    },
    Shutdown,
}

struct PendingGroup {
    chunks: Vec<Vec<u8>>,
    completions: Vec<Sender<Result<()>>>,
    first_at: Instant,
}

/// Coalesces small non-strict sync writes into shared write+fsync calls
pub struct SyncOptimizer {
    tx: Sender<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    writer: Arc<SyncFileWriter>,
    enabled: bool,
    tunables: Arc<Tunables>,
    metrics: Arc<OptimizerMetrics>,
}

impl SyncOptimizer {
    /// Builds the optimizer over a sync writer
    ///
    /// With `enabled = false` (the strict level) every write is forwarded
    /// directly and no worker is involved in the data path.
    pub fn new(writer: Arc<SyncFileWriter>, enabled: bool, tunables: Arc<Tunables>) -> Self {
        let (tx, rx) = unbounded();
        let metrics = Arc::new(OptimizerMetrics::default());

        let worker = if enabled {
            let worker_writer = Arc::clone(&writer);
            let worker_tunables = Arc::clone(&tunables);
            let worker_metrics = Arc::clone(&metrics);
            Some(std::thread::spawn(move || {
                worker_loop(rx, worker_writer, worker_tunables, worker_metrics)
            }))
        } else {
            None
        };

        Self {
            tx,
            worker: Mutex::new(worker),
            writer,
            enabled,
            tunables,
            metrics,
        }
    }

    /// Writes through the coalescing layer
    ///
    /// Small offset-less writes are handed to the worker and the caller
    /// blocks until the combined write (including its fsync) completes.
    /// Everything else goes straight to the sync writer.
    pub fn write(
        &self,
        path: &Path,
        data: &[u8],
        offset: Option<u64>,
        token: &CancelToken,
    ) -> Result<()> {
        let coalesce_limit = self.tunables.buffer_size() / 4;
        if !self.enabled || offset.is_some() || data.len() >= coalesce_limit {
            self.metrics
                .passthrough_writes
                .fetch_add(1, Ordering::Relaxed);
            return self.writer.write_sync(path, data, offset, token);
        }

        let (completion_tx, completion_rx) = bounded(1);
        self.tx
            .send(Command::Submit {
                path: path.to_path_buf(),
                data: data.to_vec(),
                completion: completion_tx,
            })
            .map_err(|_| Error::NotReady)?;

        let ceiling = match token.remaining() {
            Some(remaining) => remaining.min(COALESCE_WAIT_CEILING),
            None => COALESCE_WAIT_CEILING,
        };
        match completion_rx.recv_timeout(ceiling) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(Error::Cancelled(format!(
                "coalesced write wait exceeded {:?}",
                ceiling
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::IoPermanent("coalescing worker is gone".to_string()))
            }
        }
    }

    pub fn metrics(&self) -> Arc<OptimizerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Flushes pending groups and joins the worker; idempotent
    pub fn shutdown(&self) {
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = self.tx.send(Command::Shutdown);
            if worker.join().is_err() {
                warn!("coalescing worker panicked during shutdown");
            }
        }
    }
}

impl Drop for SyncOptimizer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    rx: Receiver<Command>,
    writer: Arc<SyncFileWriter>,
    tunables: Arc<Tunables>,
    metrics: Arc<OptimizerMetrics>,
) {
    let mut groups: HashMap<PathBuf, PendingGroup> = HashMap::new();

    loop {
        let batch_timeout = tunables.batch_timeout();
        let deadline = groups
            .values()
            .map(|group| group.first_at + batch_timeout)
            .min();

        let command = match deadline {
            Some(deadline) => match rx.recv_deadline(deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match command {
            Some(Command::Submit {
                path,
                data,
                completion,
            }) => {
                let group = groups.entry(path.clone()).or_insert_with(|| PendingGroup {
                    chunks: Vec::new(),
                    completions: Vec::new(),
                    first_at: Instant::now(),
                });
                group.chunks.push(data);
                group.completions.push(completion);

                if group.chunks.len() >= tunables.batch_size() {
                    let group = groups.remove(&path).expect("group inserted above");
                    flush_group(&writer, &metrics, &path, group);
                }
            }
            Some(Command::Shutdown) => break,
            None => {
                let now = Instant::now();
                let due: Vec<PathBuf> = groups
                    .iter()
                    .filter(|(_, group)| now.duration_since(group.first_at) >= batch_timeout)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    if let Some(group) = groups.remove(&path) {
                        flush_group(&writer, &metrics, &path, group);
                    }
                }
            }
        }
    }

    // Drain whatever is still pending so no caller is left waiting
    for (path, group) in groups.drain() {
        flush_group(&writer, &metrics, &path, group);
    }
}

/// Concatenates a group's chunks, issues one durable append, and fans
/// the result out to every waiter
fn flush_group(
    writer: &SyncFileWriter,
    metrics: &OptimizerMetrics,
    path: &PathBuf,
    group: PendingGroup,
) {
    let combined: Vec<u8> = group.chunks.concat();
    let result = writer.write_sync(path, &combined, None, &CancelToken::none());

    metrics
        .coalesced_writes
        .fetch_add(group.completions.len() as u64, Ordering::Relaxed);
    metrics.coalesced_batches.fetch_add(1, Ordering::Relaxed);

    for completion in group.completions {
        let _ = completion.send(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DurabilityConfig, Tunables};
    use basalt_core::DurabilityLevel;
    use tempfile::TempDir;

    fn setup(
        batch_size: usize,
        batch_timeout: Duration,
        buffer_size: usize,
    ) -> (SyncOptimizer, Arc<SyncFileWriter>) {
        let mut config = DurabilityConfig::for_level(DurabilityLevel::Sync);
        config.batch_size = batch_size;
        config.batch_timeout = batch_timeout;
        config.buffer_size = buffer_size;
        let tunables = Arc::new(Tunables::from_config(&config));
        let writer = Arc::new(SyncFileWriter::new(
            DurabilityLevel::Sync,
            config.sync_writes,
            config.write_barriers,
            Arc::clone(&tunables),
        ));
        (
            SyncOptimizer::new(Arc::clone(&writer), true, tunables),
            writer,
        )
    }

    #[test]
    fn small_writes_to_one_file_share_a_single_sync() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");
        let (optimizer, writer) = setup(2, Duration::from_secs(10), 1024);
        let token = CancelToken::none();

        let optimizer = Arc::new(optimizer);
        let handles: Vec<_> = [b"aa".to_vec(), b"bb".to_vec()]
            .into_iter()
            .map(|data| {
                let optimizer = Arc::clone(&optimizer);
                let path = path.clone();
                let token = token.clone();
                std::thread::spawn(move || optimizer.write(&path, &data, None, &token))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        let contents = std::fs::read(&path).unwrap();
        assert_eq!(contents.len(), 4);
        assert_eq!(optimizer.metrics().coalesced_writes(), 2);
        assert_eq!(optimizer.metrics().coalesced_batches(), 1);
        // Both callers shared one underlying sync operation
        assert_eq!(writer.metrics().sync_operations(), 1);
    }

    #[test]
    fn batch_timeout_flushes_a_lone_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");
        let (optimizer, _) = setup(100, Duration::from_millis(20), 1024);

        optimizer
            .write(&path, b"lonely", None, &CancelToken::none())
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"lonely");
        assert_eq!(optimizer.metrics().coalesced_batches(), 1);
    }

    #[test]
    fn large_writes_bypass_coalescing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");
        // buffer_size 16 => coalesce limit 4 bytes
        let (optimizer, _) = setup(100, Duration::from_secs(10), 16);

        optimizer
            .write(&path, b"sizeable", None, &CancelToken::none())
            .unwrap();

        assert_eq!(optimizer.metrics().passthrough_writes(), 1);
        assert_eq!(optimizer.metrics().coalesced_writes(), 0);
        assert_eq!(std::fs::read(&path).unwrap(), b"sizeable");
    }

    #[test]
    fn offset_writes_are_never_coalesced() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");
        let (optimizer, _) = setup(100, Duration::from_secs(10), 1024);
        let token = CancelToken::none();

        optimizer.write(&path, b"base", None, &token).unwrap();
        optimizer.write(&path, b"X", Some(0), &token).unwrap();

        assert_eq!(optimizer.metrics().passthrough_writes(), 1);
        assert_eq!(std::fs::read(&path).unwrap(), b"Xase");
    }

    #[test]
    fn disabled_optimizer_forwards_everything() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");

        let config = DurabilityConfig::for_level(DurabilityLevel::Strict);
        let tunables = Arc::new(Tunables::from_config(&config));
        let writer = Arc::new(SyncFileWriter::new(
            DurabilityLevel::Strict,
            config.sync_writes,
            config.write_barriers,
            Arc::clone(&tunables),
        ));
        let optimizer = SyncOptimizer::new(writer, false, tunables);

        optimizer
            .write(&path, b"x", None, &CancelToken::none())
            .unwrap();

        assert_eq!(optimizer.metrics().passthrough_writes(), 1);
        assert_eq!(optimizer.metrics().coalesced_batches(), 0);
    }

    #[test]
    fn shutdown_drains_pending_groups() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");
        let (optimizer, _) = setup(100, Duration::from_secs(60), 1024);
        let optimizer = Arc::new(optimizer);

        let waiter = {
            let optimizer = Arc::clone(&optimizer);
            let path = path.clone();
            std::thread::spawn(move || optimizer.write(&path, b"pending", None, &CancelToken::none()))
        };

        // Give the submission time to reach the worker, then shut down
        std::thread::sleep(Duration::from_millis(50));
        optimizer.shutdown();

        waiter.join().unwrap().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"pending");
    }

    #[test]
    fn write_ordering_within_a_group_matches_submission() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.log");
        let (optimizer, _) = setup(3, Duration::from_secs(10), 1024);
        let optimizer = Arc::new(optimizer);

        // Submit in a single thread so submission order is defined, using
        // a helper thread per write only to collect the blocking results.
        let first = {
            let optimizer = Arc::clone(&optimizer);
            let path = path.clone();
            std::thread::spawn(move || optimizer.write(&path, b"1", None, &CancelToken::none()))
        };
        std::thread::sleep(Duration::from_millis(20));
        let second = {
            let optimizer = Arc::clone(&optimizer);
            let path = path.clone();
            std::thread::spawn(move || optimizer.write(&path, b"2", None, &CancelToken::none()))
        };
        std::thread::sleep(Duration::from_millis(20));
        let third = {
            let optimizer = Arc::clone(&optimizer);
            let path = path.clone();
            std::thread::spawn(move || optimizer.write(&path, b"3", None, &CancelToken::none()))
        };

        first.join().unwrap().unwrap();
        second.join().unwrap().unwrap();
        third.join().unwrap().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"123");
    }
}
