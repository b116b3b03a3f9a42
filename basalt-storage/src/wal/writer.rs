// 1. Local crate imports
use super::{WalMetrics, WalRecord};
use crate::flush::{BufferedWriter, DurableWriter};
use crate::retry::RetryPolicy;
use crate::testing::FaultInjector;
use basalt_core::{CancelToken, Result};

// 2. External crate imports
use parking_lot::Mutex;

// 3. Standard library imports
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Writer for the Write-Ahead Log
///
/// Appends records to the log file and controls when they become durable.
/// When constructed with `sync_on_append`, every append fsyncs before
/// returning — the commit point for durability levels `sync` and above.
/// Without it, appends are flushed to the OS and fsynced by the periodic
/// flush machinery.
///
/// # Thread Safety
///
/// The writer is thread-safe and shared as `Arc<WalWriter>`. Appends are
/// serialized through an internal mutex, so records never interleave and
/// the returned positions are strictly increasing.
pub struct WalWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
    position: AtomicU64,
    sync_on_append: bool,
    retry: RetryPolicy,
    metrics: Arc<WalMetrics>,
    fault: FaultInjector,
}

impl WalWriter {
    /// Creates a new WAL writer, creating the file if needed
    ///
    /// An existing log is opened in append mode and the next position is
    /// its current size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or opened.
    pub fn new(path: impl AsRef<Path>, sync_on_append: bool, retry: RetryPolicy) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if parent != Path::new("") {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
            position: AtomicU64::new(size),
            sync_on_append,
            retry,
            metrics: Arc::new(WalMetrics::new()),
            fault: FaultInjector::new(),
        })
    }

    /// Appends a record and returns the logical position it was written at
    ///
    /// The record is always flushed to the OS before returning; when the
    /// writer was built with `sync_on_append` it is also fsynced, retrying
    /// transient fsync failures per the retry policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails or the retry budget for a
    /// transient fsync failure is exhausted.
    pub fn append(&self, record: &WalRecord) -> Result<u64> {
        let encoded = record.encode();
        let len = encoded.len() as u64;

        let mut file = self.file.lock();
        let position = self.position.load(Ordering::Relaxed);

        let outcome = (|| -> Result<()> {
            file.write_all(&encoded)?;
            file.flush()?;
            if self.sync_on_append {
                self.sync_locked(&mut file)?;
            }
            Ok(())
        })();

        if let Err(err) = outcome {
            self.metrics.record_append(len, false);
            return Err(err);
        }

        self.position.fetch_add(len, Ordering::Relaxed);
        self.metrics.record_append(len, true);
        Ok(position)
    }

    /// Flushes buffered records to the OS without forcing them to disk
    pub fn flush(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        Ok(())
    }

    /// Forces all appended records to stable storage
    pub fn sync(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        self.sync_locked(&mut file)
    }

    /// Empties the log
    ///
    /// Called only after a snapshot covering the logged state has been
    /// fsynced and renamed into place.
    pub fn truncate(&self) -> Result<()> {
        let mut file = self.file.lock();
        file.flush()?;
        file.get_ref().set_len(0)?;
        file.get_ref().sync_all()?;
        self.position.store(0, Ordering::Relaxed);
        self.metrics.record_truncation();
        Ok(())
    }

    fn sync_locked(&self, file: &mut BufWriter<File>) -> Result<()> {
        let metrics = Arc::clone(&self.metrics);
        self.retry.run(&CancelToken::none(), || {
            if let Some(err) = self.fault.next_fsync_error() {
                metrics.record_sync_error();
                return Err(err.into());
            }
            file.get_ref().sync_data().map_err(|err| {
                metrics.record_sync_error();
                err.into()
            })
        })?;
        self.metrics.record_sync();
        Ok(())
    }

    /// Byte offset where the next record will be written
    pub fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Current size of the log in bytes
    pub fn size(&self) -> u64 {
        self.position()
    }

    /// Path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metrics(&self) -> Arc<WalMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fault hooks on the fsync path, for failure tests
    pub fn fault_injector(&self) -> &FaultInjector {
        &self.fault
    }
}

// The flush manager treats the WAL like any other registered writer: a
// periodic flush pushes buffered records to the OS, and at durability
// levels that fsync it also forces them to disk.
impl BufferedWriter for WalWriter {
    fn flush_file(&self, path: &Path) -> Result<()> {
        if path == self.path {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn flush_all(&self) -> Result<()> {
        self.flush()
    }
}

impl DurableWriter for WalWriter {
    fn fsync_file(&self, path: &Path) -> Result<()> {
        if path == self.path {
            self.sync()
        } else {
            Ok(())
        }
    }

    fn fsync_all(&self) -> Result<()> {
        self.sync()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_retry() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[test]
    fn new_creates_wal_file_with_parent_directory() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("nested/dir/wal.log");

        let writer = WalWriter::new(&wal_path, false, test_retry()).unwrap();

        assert!(wal_path.parent().unwrap().exists());
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn append_returns_strictly_increasing_positions() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("wal.log");
        let writer = WalWriter::new(&wal_path, false, test_retry()).unwrap();

        let record = WalRecord::put(b"a".to_vec(), b"1".to_vec()).unwrap();
        let encoded_len = record.encode().len() as u64;

        let first = writer.append(&record).unwrap();
        let second = writer
            .append(&WalRecord::put(b"b".to_vec(), b"2".to_vec()).unwrap())
            .unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, encoded_len);
        assert_eq!(writer.size(), second + encoded_len);
    }

    #[test]
    fn reopening_resumes_at_the_existing_size() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("wal.log");

        let size = {
            let writer = WalWriter::new(&wal_path, true, test_retry()).unwrap();
            writer
                .append(&WalRecord::put(b"k".to_vec(), b"v".to_vec()).unwrap())
                .unwrap();
            writer.size()
        };

        let reopened = WalWriter::new(&wal_path, true, test_retry()).unwrap();
        assert_eq!(reopened.position(), size);
    }

    #[test]
    fn truncate_empties_the_log_and_resets_position() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("wal.log");
        let writer = WalWriter::new(&wal_path, true, test_retry()).unwrap();

        writer
            .append(&WalRecord::put(b"k".to_vec(), b"v".to_vec()).unwrap())
            .unwrap();
        assert!(writer.size() > 0);

        writer.truncate().unwrap();

        assert_eq!(writer.position(), 0);
        assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), 0);
        assert_eq!(writer.metrics().truncations(), 1);
    }

    #[test]
    fn appends_after_truncate_start_from_zero() {
        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("wal.log");
        let writer = WalWriter::new(&wal_path, true, test_retry()).unwrap();

        writer
            .append(&WalRecord::put(b"old".to_vec(), b"x".to_vec()).unwrap())
            .unwrap();
        writer.truncate().unwrap();

        let position = writer
            .append(&WalRecord::put(b"new".to_vec(), b"y".to_vec()).unwrap())
            .unwrap();
        assert_eq!(position, 0);

        let mut reader = super::super::WalReader::new(&wal_path).unwrap();
        let mut keys = Vec::new();
        reader
            .replay(|record| keys.push(record.key().to_vec()))
            .unwrap();
        assert_eq!(keys, vec![b"new".to_vec()]);
    }

    #[test]
    fn concurrent_appends_maintain_record_integrity() {
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let wal_path = temp_dir.path().join("concurrent.log");
        let writer = Arc::new(WalWriter::new(&wal_path, false, test_retry()).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|thread_id| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for i in 0..50 {
                        let record = WalRecord::put(
                            format!("key_{}_{}", thread_id, i).into_bytes(),
                            format!("value_{}_{}", thread_id, i).into_bytes(),
                        )
                        .unwrap();
                        writer.append(&record).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        writer.sync().unwrap();

        let mut reader = super::super::WalReader::new(&wal_path).unwrap();
        let stats = reader.replay(|_| {}).unwrap();
        assert_eq!(stats.applied, 8 * 50);
        assert!(!stats.truncated);
    }

    #[test]
    fn transient_fsync_failure_is_retried_and_counted() {
        let temp_dir = TempDir::new().unwrap();
        let writer =
            WalWriter::new(temp_dir.path().join("wal.log"), true, test_retry()).unwrap();

        writer.fault_injector().inject_transient_fsync_errors(1);
        writer
            .append(&WalRecord::put(b"k".to_vec(), b"v".to_vec()).unwrap())
            .unwrap();

        let metrics = writer.metrics();
        assert_eq!(metrics.sync_errors(), 1);
        assert_eq!(metrics.syncs_total(), 1);
        assert!(!writer.fault_injector().armed());
    }

    #[test]
    fn exhausted_fsync_retry_budget_fails_the_append() {
        let temp_dir = TempDir::new().unwrap();
        let writer = WalWriter::new(
            temp_dir.path().join("wal.log"),
            true,
            RetryPolicy::new(0, Duration::from_millis(1)),
        )
        .unwrap();

        writer.fault_injector().inject_transient_fsync_errors(1);
        let result = writer.append(&WalRecord::put(b"k".to_vec(), b"v".to_vec()).unwrap());

        assert!(result.is_err());
        assert_eq!(writer.metrics().appends_failed(), 1);
        // The position does not advance past a failed append
        assert_eq!(writer.position(), 0);
    }

    #[test]
    fn metrics_track_appended_bytes() {
        let temp_dir = TempDir::new().unwrap();
        let writer =
            WalWriter::new(temp_dir.path().join("wal.log"), true, test_retry()).unwrap();

        let record = WalRecord::put(b"key".to_vec(), b"value".to_vec()).unwrap();
        let encoded_len = record.encode().len() as u64;
        writer.append(&record).unwrap();

        let metrics = writer.metrics();
        assert_eq!(metrics.appends_total(), 1);
        assert_eq!(metrics.bytes_written(), encoded_len);
        assert_eq!(metrics.syncs_total(), 1);
    }
}
