//! Durability policy enforcement and engine lifecycle
//!
//! The [`DurabilityManager`] is the root of the storage object graph. It
//! owns the WAL, the snapshot engine, both file writers, the coalescing
//! optimizer, and the flush manager; the in-memory store is shared with
//! readers. Every mutation enters here, is journaled in the WAL with the
//! level-appropriate fsync discipline, and applied to the store; raw
//! payload writes from higher layers go through [`write_through`], which
//! routes them to the sync or async writer according to the configured
//! level and mode.
//!
//! [`write_through`]: DurabilityManager::write_through
//!
//! ## Write ordering
//!
//! At durability level `sync` and above the WAL append precedes the
//! in-memory update (the write-ahead property): a reader can never
//! observe state that would not survive a crash. Under `async` the store
//! is updated first — acknowledgment only promises in-memory visibility,
//! with durability bounded by the flush cadence.
//!
//! ## Lifecycle
//!
//! `open` recovers state (snapshot, then WAL replay, halting cleanly at a
//! crash tail) before accepting operations. `close` stops the background
//! flusher, drains every buffer, snapshots the store, and truncates the
//! WAL; a manager dropped without `close` does the same best-effort.

use crate::async_writer::AsyncFileWriter;
use crate::config::{DurabilityConfig, Tunables};
use crate::flush::{BufferedWriter, DurableWriter, FlushManager, FlushPriority};
use crate::optimizer::SyncOptimizer;
use crate::retry::RetryPolicy;
use crate::snapshot::SnapshotEngine;
use crate::store::{MemStore, VersionedValue};
use crate::sync_writer::SyncFileWriter;
use crate::wal::{WalReader, WalRecord, WalWriter};
use basalt_core::{CancelToken, DurabilityLevel, Error, Key, Result, Value, WriteMode};

use log::{error, info};
use parking_lot::RwLock;
use serde::Serialize;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// WAL file name inside the data directory
pub const WAL_FILE: &str = "wal.log";

/// Background flush failures tolerated before the manager goes unhealthy
pub const MAX_CONSECUTIVE_FLUSH_FAILURES: u32 = 5;

/// One mutation inside [`DurabilityManager::apply_batch`]
#[derive(Debug, Clone)]
pub enum BatchOp {
    Put { key: Key, value: Value },
    Delete { key: Key },
}

/// Counters for the manager-level write path
#[derive(Debug, Default)]
pub struct DurabilityMetrics {
    puts: AtomicU64,
    deletes: AtomicU64,
    batches: AtomicU64,
    writes_failed: AtomicU64,
    replayed_records: AtomicU64,
    snapshot_records: AtomicU64,
}

impl DurabilityMetrics {
    pub fn puts(&self) -> u64 {
        self.puts.load(Ordering::Relaxed)
    }

    pub fn deletes(&self) -> u64 {
        self.deletes.load(Ordering::Relaxed)
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn writes_failed(&self) -> u64 {
        self.writes_failed.load(Ordering::Relaxed)
    }

    pub fn replayed_records(&self) -> u64 {
        self.replayed_records.load(Ordering::Relaxed)
    }

    /// Records written by the most recent snapshot
    pub fn snapshot_records(&self) -> u64 {
        self.snapshot_records.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of the engine for the admin plane
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub initialized: bool,
    pub healthy: bool,
    pub level: DurabilityLevel,
    pub write_mode: WriteMode,
    pub keys: usize,
    pub wal_bytes: u64,
    pub pending_async_writes: usize,
    pub puts: u64,
    pub deletes: u64,
    pub batches: u64,
    pub writes_failed: u64,
    pub replayed_records: u64,
    pub flushes_completed: u64,
    pub flush_failures: u64,
    pub sync_operations: u64,
    pub average_sync_latency_us: f64,
    pub barrier_operations: u64,
    pub fsync_errors: u64,
    pub buffer_overflows: u64,
}

/// Routes writes per the durability policy and owns recovery/shutdown
pub struct DurabilityManager {
    config: RwLock<DurabilityConfig>,
    tunables: Arc<Tunables>,
    level: DurabilityLevel,
    write_mode: WriteMode,
    write_barriers: bool,
    data_dir: PathBuf,
    store: Arc<MemStore>,
    wal: Arc<WalWriter>,
    snapshots: SnapshotEngine,
    sync_writer: Arc<SyncFileWriter>,
    async_writer: Arc<AsyncFileWriter>,
    optimizer: SyncOptimizer,
    flush: FlushManager,
    initialized: AtomicBool,
    closed: AtomicBool,
    metrics: Arc<DurabilityMetrics>,
}

impl std::fmt::Debug for DurabilityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurabilityManager")
            .field("level", &self.level)
            .field("write_mode", &self.write_mode)
            .field("write_barriers", &self.write_barriers)
            .field("data_dir", &self.data_dir)
            .field("initialized", &self.initialized)
            .field("closed", &self.closed)
            .finish()
    }
}

impl DurabilityManager {
    /// Opens the engine in `data_dir`, recovering any persisted state
    ///
    /// Recovery loads the latest snapshot into the store and replays the
    /// WAL on top of it, last writer wins. A truncated or corrupt WAL
    /// tail is the normal crash signature and never fails the open.
    pub fn open(data_dir: impl Into<PathBuf>, config: DurabilityConfig) -> Result<Self> {
        config.validate()?;

        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let tunables = Arc::new(Tunables::from_config(&config));
        let store = Arc::new(MemStore::new());
        let metrics = Arc::new(DurabilityMetrics::default());
        let snapshots = SnapshotEngine::new(&data_dir);
        snapshots.remove_stale_tmp()?;

        // Recovery: snapshot first, then the WAL on top
        let snapshot_entries = snapshots.load()?;
        let snapshot_count = snapshot_entries.len();
        for (key, value) in snapshot_entries {
            store.put(key, value);
        }

        let wal_path = data_dir.join(WAL_FILE);
        let mut replay_stats = None;
        if wal_path.exists() {
            let mut reader = WalReader::new(&wal_path)?;
            let replay_store = Arc::clone(&store);
            let stats = reader.replay(move |record| {
                apply_record(&replay_store, &record);
            })?;
            metrics
                .replayed_records
                .fetch_add(stats.applied, Ordering::Relaxed);
            info!(
                "recovery complete: {} snapshot records, {} WAL records replayed{}",
                snapshot_count,
                stats.applied,
                if stats.truncated {
                    " (crash tail discarded)"
                } else {
                    ""
                }
            );
            replay_stats = Some(stats);
        } else if snapshot_count > 0 {
            info!("recovery complete: {} snapshot records", snapshot_count);
        }

        let retry = RetryPolicy::new(config.max_retries, config.retry_delay);
        let wal = Arc::new(WalWriter::new(
            &wal_path,
            config.level.requires_fsync(),
            retry,
        )?);
        if let Some(stats) = replay_stats {
            wal.metrics().record_replay(stats.applied, stats.truncated);
        }

        let sync_writer = Arc::new(SyncFileWriter::new(
            config.level,
            config.sync_writes,
            config.write_barriers,
            Arc::clone(&tunables),
        ));
        let async_writer = Arc::new(AsyncFileWriter::new(
            config.level.requires_fsync(),
            Arc::clone(&tunables),
        ));
        let optimizer = SyncOptimizer::new(
            Arc::clone(&sync_writer),
            config.level != DurabilityLevel::Strict,
            Arc::clone(&tunables),
        );

        let flush = FlushManager::new(
            vec![
                Arc::clone(&async_writer) as Arc<dyn BufferedWriter>,
                Arc::clone(&wal) as Arc<dyn BufferedWriter>,
            ],
            vec![
                Arc::clone(&sync_writer) as Arc<dyn DurableWriter>,
                Arc::clone(&wal) as Arc<dyn DurableWriter>,
            ],
            config.level.requires_fsync(),
            Arc::clone(&tunables),
            config.periodic_flush_enabled(),
        );

        info!(
            "durability manager open at {:?} (level {:?}, mode {:?})",
            data_dir, config.level, config.write_mode
        );

        Ok(Self {
            level: config.level,
            write_mode: config.write_mode,
            write_barriers: config.write_barriers,
            config: RwLock::new(config),
            tunables,
            data_dir,
            store,
            wal,
            snapshots,
            sync_writer,
            async_writer,
            optimizer,
            flush,
            initialized: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            metrics,
        })
    }

    /// Inserts or updates a key, returning the version assigned
    pub fn put(&self, key: Key, value: Value) -> Result<u64> {
        self.ensure_ready()?;
        self.ensure_healthy()?;

        let record = WalRecord::put(key, value)?;
        let version = self.journal_and_apply(&record)?;

        self.metrics.puts.fetch_add(1, Ordering::Relaxed);
        Ok(version.unwrap_or(0))
    }

    /// Reads the current value for a key
    pub fn get(&self, key: &[u8]) -> Result<Option<Value>> {
        self.ensure_ready()?;
        Ok(self.store.get(key))
    }

    /// Reads the current value together with its write version
    pub fn get_versioned(&self, key: &[u8]) -> Result<Option<VersionedValue>> {
        self.ensure_ready()?;
        Ok(self.store.get_versioned(key))
    }

    /// Removes a key, returning whether it existed
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.ensure_ready()?;
        self.ensure_healthy()?;

        let existed = self.store.get(key).is_some();
        let record = WalRecord::delete(key.to_vec())?;
        self.journal_and_apply(&record)?;

        self.metrics.deletes.fetch_add(1, Ordering::Relaxed);
        Ok(existed)
    }

    /// Lazily iterates over all pairs whose key starts with `prefix`
    pub fn scan_prefix<'a>(
        &'a self,
        prefix: &[u8],
    ) -> Result<impl Iterator<Item = (Key, Value)> + 'a> {
        self.ensure_ready()?;
        Ok(self.store.scan_prefix(prefix))
    }

    /// Applies a batch of mutations as one serialized pass
    ///
    /// Every mutation is journaled and applied with the same ordering
    /// rules as a single write; validation runs up front so a malformed
    /// operation rejects the whole batch before anything is journaled.
    pub fn apply_batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        self.ensure_ready()?;
        self.ensure_healthy()?;
        if ops.is_empty() {
            return Ok(());
        }

        let mut records = Vec::with_capacity(ops.len());
        for op in ops {
            records.push(match op {
                BatchOp::Put { key, value } => WalRecord::put(key, value)?,
                BatchOp::Delete { key } => WalRecord::delete(key)?,
            });
        }

        for record in &records {
            self.journal_and_apply(record)?;
        }

        self.metrics.batches.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Routes a raw payload write through the durability policy
    ///
    /// Higher layers with their own files (document and columnar stores)
    /// use this to get the same barrier, coalescing, and fsync treatment
    /// the policy prescribes. The key-value path does not come through
    /// here; its durable write is the WAL append itself.
    pub fn write_through(&self, path: &Path, data: &[u8], offset: Option<u64>) -> Result<()> {
        self.ensure_ready()?;
        self.ensure_healthy()?;
        self.route_write(path, data, offset)
    }

    /// Drains the async buffers and waits for completion
    pub fn force_flush(&self) -> Result<()> {
        self.ensure_ready()?;
        self.flush.force_flush(&CancelToken::none())
    }

    /// Forces every cached file and the WAL to stable storage
    pub fn force_sync(&self) -> Result<()> {
        self.ensure_ready()?;
        let token = CancelToken::none();
        self.sync_writer.fsync_all_files(&token)?;
        if self.level.persists() {
            self.wal.sync()?;
        }
        Ok(())
    }

    /// Requests a background flush at the given priority
    pub fn request_flush(
        &self,
        paths: Option<Vec<PathBuf>>,
        priority: FlushPriority,
    ) -> Result<()> {
        self.ensure_ready()?;
        self.flush.request_flush(paths, priority)
    }

    /// Schedules a background flush to run after `delay`
    pub fn schedule_flush(&self, delay: Duration, paths: Option<Vec<PathBuf>>) -> Result<()> {
        self.ensure_ready()?;
        self.flush.schedule_flush(delay, paths)
    }

    /// Replaces the flow-tuning configuration of a live manager
    ///
    /// The write-path topology — `level`, `write_mode`, `sync_writes`,
    /// `write_barriers` — is fixed at open; changing it requires a
    /// close-and-reopen. Everything else takes effect immediately.
    pub fn update_config(&self, new_config: DurabilityConfig) -> Result<()> {
        self.ensure_ready()?;
        new_config.validate()?;

        let mut current = self.config.write();
        if new_config.level != current.level
            || new_config.write_mode != current.write_mode
            || new_config.sync_writes != current.sync_writes
            || new_config.write_barriers != current.write_barriers
        {
            return Err(Error::InvalidConfig(
                "level, write_mode, sync_writes and write_barriers are fixed at open; \
                 reopen the manager to change them"
                    .to_string(),
            ));
        }

        self.tunables.apply(&new_config);
        *current = new_config;
        Ok(())
    }

    /// Snapshot of the active configuration
    pub fn config(&self) -> DurabilityConfig {
        self.config.read().clone()
    }

    /// Current engine status for the admin plane
    pub fn get_status(&self) -> ManagerStatus {
        let sync_metrics = self.sync_writer.metrics();
        let async_metrics = self.async_writer.metrics();
        let flush_metrics = self.flush.metrics();

        ManagerStatus {
            initialized: self.initialized.load(Ordering::SeqCst),
            healthy: self.is_healthy(),
            level: self.level,
            write_mode: self.write_mode,
            keys: self.store.len(),
            wal_bytes: self.wal.size(),
            pending_async_writes: self.async_writer.pending_entries(),
            puts: self.metrics.puts(),
            deletes: self.metrics.deletes(),
            batches: self.metrics.batches(),
            writes_failed: self.metrics.writes_failed(),
            replayed_records: self.metrics.replayed_records(),
            flushes_completed: flush_metrics.flushes_completed(),
            flush_failures: flush_metrics.flush_failures(),
            sync_operations: sync_metrics.sync_operations(),
            average_sync_latency_us: sync_metrics.average_latency_us(),
            barrier_operations: sync_metrics.barrier_operations(),
            fsync_errors: sync_metrics.fsync_errors() + self.wal.metrics().sync_errors(),
            buffer_overflows: async_metrics.buffer_overflows(),
        }
    }

    pub fn metrics(&self) -> Arc<DurabilityMetrics> {
        Arc::clone(&self.metrics)
    }

    /// The in-memory store, shared with read-serving layers
    pub fn store(&self) -> Arc<MemStore> {
        Arc::clone(&self.store)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Fault hooks on the sync write path, for failure tests
    pub fn sync_fault_injector(&self) -> &crate::testing::FaultInjector {
        self.sync_writer.fault_injector()
    }

    /// Fault hooks on the WAL fsync path, for failure tests
    pub fn wal_fault_injector(&self) -> &crate::testing::FaultInjector {
        self.wal.fault_injector()
    }

    /// Flushes everything, snapshots the store, and truncates the WAL
    ///
    /// Errors are accumulated so every shutdown step runs; the last error
    /// is returned. Idempotent: a second close is a no-op.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut last_error = None;

        // 1. Stop the background flusher and the coalescing worker
        self.flush.stop();
        self.optimizer.shutdown();

        // 2. Drain buffers and force everything written so far to disk
        if let Err(err) = self.async_writer.flush_all_buffers() {
            last_error = Some(err);
        }
        if let Err(err) = self.sync_writer.fsync_all_files(&CancelToken::none()) {
            last_error = Some(err);
        }
        if let Err(err) = self.wal.sync() {
            last_error = Some(err);
        }

        // 3. Snapshot the full store; only a successful snapshot may
        //    truncate the WAL
        match self.snapshots.save(self.store.iter()) {
            Ok(count) => {
                self.metrics
                    .snapshot_records
                    .store(count, Ordering::Relaxed);
                if let Err(err) = self.wal.truncate() {
                    last_error = Some(err);
                }
            }
            Err(err) => {
                error!("shutdown snapshot failed, WAL retained: {}", err);
                last_error = Some(err);
            }
        }

        info!("durability manager closed at {:?}", self.data_dir);
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) || self.closed.load(Ordering::SeqCst) {
            return Err(Error::NotReady);
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.flush.consecutive_failures() < MAX_CONSECUTIVE_FLUSH_FAILURES
    }

    fn ensure_healthy(&self) -> Result<()> {
        if !self.is_healthy() {
            return Err(Error::IoPermanent(format!(
                "storage marked unhealthy after {} consecutive background flush failures",
                self.flush.consecutive_failures()
            )));
        }
        Ok(())
    }

    // The sync branches barrier inside `write_sync` (the writer carries
    // the same write_barriers flag); only the buffered branch needs the
    // global barrier imposed here.
    fn route_write(&self, path: &Path, data: &[u8], offset: Option<u64>) -> Result<()> {
        let token = CancelToken::none();

        let result = match self.write_mode {
            WriteMode::Sync if self.level == DurabilityLevel::Strict => {
                self.sync_writer.write_sync(path, data, offset, &token)
            }
            WriteMode::Sync => self.optimizer.write(path, data, offset, &token),
            WriteMode::Async | WriteMode::Batch => {
                if self.write_barriers {
                    self.sync_writer
                        .write_barrier(None, &token)
                        .and_then(|_| self.async_writer.write_async(path, data, offset))
                } else {
                    self.async_writer.write_async(path, data, offset)
                }
            }
        };

        if result.is_err() {
            self.metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn append_journal(&self, record: &WalRecord) -> Result<u64> {
        self.wal.append(record).inspect_err(|_| {
            self.metrics.writes_failed.fetch_add(1, Ordering::Relaxed);
        })
    }

    /// Journals and applies one record with the level-appropriate order
    fn journal_and_apply(&self, record: &WalRecord) -> Result<Option<u64>> {
        if !self.level.persists() {
            return Ok(apply_record(&self.store, record));
        }

        if self.level.requires_fsync() {
            // Write-ahead: the WAL commit precedes visibility
            self.append_journal(record)?;
            Ok(apply_record(&self.store, record))
        } else {
            // Best-effort: visibility first, journal behind it
            let applied = apply_record(&self.store, record);
            self.append_journal(record)?;
            Ok(applied)
        }
    }
}

impl Drop for DurabilityManager {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(err) = self.close() {
                error!("error while closing durability manager on drop: {}", err);
            }
        }
    }
}

/// Applies one mutation to the store, returning the version for a put
fn apply_record(store: &MemStore, record: &WalRecord) -> Option<u64> {
    match record {
        WalRecord::Put { key, value } => Some(store.put(key.clone(), value.clone())),
        WalRecord::Delete { key } => {
            store.delete(key);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_with(dir: &Path, level: DurabilityLevel) -> DurabilityManager {
        DurabilityManager::open(dir, DurabilityConfig::for_level(level)).unwrap()
    }

    #[test]
    fn put_get_delete_round_trip_in_memory() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::Sync);

        let version = manager.put(b"k".to_vec(), b"v".to_vec()).unwrap();
        assert!(version > 0);
        assert_eq!(manager.get(b"k").unwrap(), Some(b"v".to_vec()));

        assert!(manager.delete(b"k").unwrap());
        assert!(!manager.delete(b"k").unwrap());
        assert_eq!(manager.get(b"k").unwrap(), None);

        manager.close().unwrap();
    }

    #[test]
    fn operations_after_close_report_not_ready() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::Async);

        manager.close().unwrap();

        assert!(matches!(
            manager.put(b"k".to_vec(), b"v".to_vec()),
            Err(Error::NotReady)
        ));
        assert!(matches!(manager.get(b"k"), Err(Error::NotReady)));
        // A second close stays a no-op
        manager.close().unwrap();
    }

    #[test]
    fn invalid_config_fails_open() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = DurabilityConfig::for_level(DurabilityLevel::Sync);
        config.sync_writes = false;

        let result = DurabilityManager::open(temp_dir.path(), config);
        assert!(matches!(result.unwrap_err(), Error::InvalidConfig(_)));
    }

    #[test]
    fn update_config_accepts_tunables_and_rejects_topology_changes() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::Sync);

        let mut tuned = manager.config();
        tuned.batch_size = 256;
        manager.update_config(tuned).unwrap();
        assert_eq!(manager.config().batch_size, 256);

        let mut retopo = manager.config();
        retopo.level = DurabilityLevel::Strict;
        retopo.write_barriers = true;
        let err = manager.update_config(retopo).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        manager.close().unwrap();
    }

    #[test]
    fn status_reflects_writes_and_configuration() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::Sync);

        manager.put(b"a".to_vec(), b"1".to_vec()).unwrap();
        manager.put(b"b".to_vec(), b"2".to_vec()).unwrap();
        manager.delete(b"a").unwrap();

        let status = manager.get_status();
        assert!(status.initialized);
        assert!(status.healthy);
        assert_eq!(status.level, DurabilityLevel::Sync);
        assert_eq!(status.keys, 1);
        assert_eq!(status.puts, 2);
        assert_eq!(status.deletes, 1);
        assert!(status.wal_bytes > 0);

        manager.close().unwrap();
    }

    #[test]
    fn scan_prefix_sees_committed_writes_in_order() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::Async);

        manager.put(b"user:2".to_vec(), b"bob".to_vec()).unwrap();
        manager.put(b"user:1".to_vec(), b"alice".to_vec()).unwrap();
        manager.put(b"other".to_vec(), b"x".to_vec()).unwrap();

        let hits: Vec<(Key, Value)> = manager.scan_prefix(b"user:").unwrap().collect();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, b"user:1".to_vec());

        manager.close().unwrap();
    }

    #[test]
    fn batch_applies_all_mutations() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::Sync);

        manager.put(b"stale".to_vec(), b"x".to_vec()).unwrap();
        manager
            .apply_batch(vec![
                BatchOp::Put {
                    key: b"a".to_vec(),
                    value: b"1".to_vec(),
                },
                BatchOp::Put {
                    key: b"b".to_vec(),
                    value: b"2".to_vec(),
                },
                BatchOp::Delete {
                    key: b"stale".to_vec(),
                },
            ])
            .unwrap();

        assert_eq!(manager.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(manager.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(manager.get(b"stale").unwrap(), None);
        assert_eq!(manager.metrics().batches(), 1);

        manager.close().unwrap();
    }

    #[test]
    fn level_none_keeps_mutations_in_memory_only() {
        let temp_dir = TempDir::new().unwrap();
        let manager = open_with(temp_dir.path(), DurabilityLevel::None);

        manager.put(b"k".to_vec(), b"v".to_vec()).unwrap();

        assert_eq!(manager.get(b"k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(manager.wal.size(), 0);

        manager.close().unwrap();
    }
}
