//! Metrics collection for WAL operations
//!
//! All fields use atomic operations for thread-safe access without locks.

use std::sync::atomic::{AtomicU64, Ordering};

/// WAL operation metrics
///
/// Shared between the writer and the durability manager via `Arc`; a
/// metrics consumer polls the accessors.
#[derive(Debug, Default)]
pub struct WalMetrics {
    appends_total: AtomicU64,
    appends_failed: AtomicU64,
    bytes_written: AtomicU64,
    syncs_total: AtomicU64,
    sync_errors: AtomicU64,
    truncations: AtomicU64,
    replayed_records: AtomicU64,
    corrupted_tail_records: AtomicU64,
}

impl WalMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an append attempt
    pub fn record_append(&self, size: u64, success: bool) {
        if success {
            self.appends_total.fetch_add(1, Ordering::Relaxed);
            self.bytes_written.fetch_add(size, Ordering::Relaxed);
        } else {
            self.appends_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a completed fsync
    pub fn record_sync(&self) {
        self.syncs_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed fsync attempt (including retried ones)
    pub fn record_sync_error(&self) {
        self.sync_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a log truncation
    pub fn record_truncation(&self) {
        self.truncations.fetch_add(1, Ordering::Relaxed);
    }

    /// Records the outcome of a replay pass
    pub fn record_replay(&self, applied: u64, truncated_tail: bool) {
        self.replayed_records.fetch_add(applied, Ordering::Relaxed);
        if truncated_tail {
            self.corrupted_tail_records.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn appends_total(&self) -> u64 {
        self.appends_total.load(Ordering::Relaxed)
    }

    pub fn appends_failed(&self) -> u64 {
        self.appends_failed.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn syncs_total(&self) -> u64 {
        self.syncs_total.load(Ordering::Relaxed)
    }

    pub fn sync_errors(&self) -> u64 {
        self.sync_errors.load(Ordering::Relaxed)
    }

    pub fn truncations(&self) -> u64 {
        self.truncations.load(Ordering::Relaxed)
    }

    pub fn replayed_records(&self) -> u64 {
        self.replayed_records.load(Ordering::Relaxed)
    }

    pub fn corrupted_tail_records(&self) -> u64 {
        self.corrupted_tail_records.load(Ordering::Relaxed)
    }
}
