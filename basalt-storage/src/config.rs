//! Durability policy configuration
//!
//! [`DurabilityConfig`] is the single knob surface for the whole write
//! path. Construction-time validation enforces the cross-field rules; the
//! flow-tuning subset of the fields can be changed on a live manager
//! through [`Tunables`], which the writer components read atomically.

use basalt_core::{DurabilityLevel, Error, Result, WriteMode};

use serde::{Deserialize, Serialize};

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Configuration for the durability manager and its writers
///
/// | Field | Effect |
/// |-------|--------|
/// | `level` | how strongly writes are persisted before acknowledgment |
/// | `write_mode` | sync, async-buffered, or batched submission |
/// | `sync_writes` | forces fsync regardless of mode |
/// | `flush_interval` | background flush cadence; `0` disables the ticker |
/// | `batch_size` / `batch_timeout` | buffering and coalescing triggers |
/// | `write_barriers` | global fsync barrier around every write |
/// | `verify_writes` | re-checksum flushed spans against buffered entries |
/// | `buffer_size` | per-file async buffer capacity in bytes |
/// | `max_retries` / `retry_delay` | transient-error retry budget and backoff base |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurabilityConfig {
    pub level: DurabilityLevel,
    pub write_mode: WriteMode,
    pub sync_writes: bool,
    pub flush_interval: Duration,
    pub batch_size: usize,
    pub batch_timeout: Duration,
    pub write_barriers: bool,
    pub verify_writes: bool,
    pub buffer_size: usize,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self::for_level(DurabilityLevel::Async)
    }
}

impl DurabilityConfig {
    /// Builds a consistent preset for the given durability level
    pub fn for_level(level: DurabilityLevel) -> Self {
        let (write_mode, sync_writes, write_barriers, verify_writes) = match level {
            DurabilityLevel::None => (WriteMode::Async, false, false, false),
            DurabilityLevel::Async => (WriteMode::Async, false, false, false),
            DurabilityLevel::Sync => (WriteMode::Sync, true, false, false),
            DurabilityLevel::Strict => (WriteMode::Sync, true, true, true),
        };

        Self {
            level,
            write_mode,
            sync_writes,
            flush_interval: Duration::from_millis(200),
            batch_size: 64,
            batch_timeout: Duration::from_millis(10),
            write_barriers,
            verify_writes,
            buffer_size: 1024 * 1024,
            max_retries: 3,
            retry_delay: Duration::from_millis(10),
        }
    }

    /// Checks the cross-field consistency rules
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] when:
    /// - `level = async` but `sync_writes` is set
    /// - `level = sync` without `sync_writes`
    /// - `level = strict` without `sync_writes` and `write_barriers`
    /// - `batch_size` is zero
    pub fn validate(&self) -> Result<()> {
        match self.level {
            DurabilityLevel::Async if self.sync_writes => {
                return Err(Error::InvalidConfig(
                    "level `async` requires sync_writes = false".to_string(),
                ));
            }
            DurabilityLevel::Sync if !self.sync_writes => {
                return Err(Error::InvalidConfig(
                    "level `sync` requires sync_writes = true".to_string(),
                ));
            }
            DurabilityLevel::Strict if !self.sync_writes || !self.write_barriers => {
                return Err(Error::InvalidConfig(
                    "level `strict` requires sync_writes = true and write_barriers = true"
                        .to_string(),
                ));
            }
            _ => {}
        }

        if self.batch_size == 0 {
            return Err(Error::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether the periodic background flush ticker should run
    ///
    /// The ticker is absent when `flush_interval` is zero or when every
    /// write already reaches disk synchronously (pure-sync policy).
    pub fn periodic_flush_enabled(&self) -> bool {
        !self.flush_interval.is_zero()
            && !(self.write_mode == WriteMode::Sync && self.sync_writes)
    }
}

/// Flow-tuning fields shared with the writer components
///
/// The fields a live manager may retune are mirrored here as atomics so
/// `update_config` takes effect without rebuilding the writers.
#[derive(Debug)]
pub struct Tunables {
    batch_size: AtomicUsize,
    batch_timeout_us: AtomicU64,
    buffer_size: AtomicUsize,
    verify_writes: AtomicBool,
    max_retries: AtomicU32,
    retry_delay_us: AtomicU64,
    flush_interval_us: AtomicU64,
}

impl Tunables {
    pub fn from_config(config: &DurabilityConfig) -> Self {
        Self {
            batch_size: AtomicUsize::new(config.batch_size),
            batch_timeout_us: AtomicU64::new(config.batch_timeout.as_micros() as u64),
            buffer_size: AtomicUsize::new(config.buffer_size),
            verify_writes: AtomicBool::new(config.verify_writes),
            max_retries: AtomicU32::new(config.max_retries),
            retry_delay_us: AtomicU64::new(config.retry_delay.as_micros() as u64),
            flush_interval_us: AtomicU64::new(config.flush_interval.as_micros() as u64),
        }
    }

    /// Applies the tunable subset of a validated config
    pub fn apply(&self, config: &DurabilityConfig) {
        self.batch_size.store(config.batch_size, Ordering::Relaxed);
        self.batch_timeout_us
            .store(config.batch_timeout.as_micros() as u64, Ordering::Relaxed);
        self.buffer_size.store(config.buffer_size, Ordering::Relaxed);
        self.verify_writes
            .store(config.verify_writes, Ordering::Relaxed);
        self.max_retries.store(config.max_retries, Ordering::Relaxed);
        self.retry_delay_us
            .store(config.retry_delay.as_micros() as u64, Ordering::Relaxed);
        self.flush_interval_us
            .store(config.flush_interval.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size.load(Ordering::Relaxed).max(1)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_micros(self.batch_timeout_us.load(Ordering::Relaxed))
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size.load(Ordering::Relaxed)
    }

    pub fn verify_writes(&self) -> bool {
        self.verify_writes.load(Ordering::Relaxed)
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.load(Ordering::Relaxed)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_micros(self.retry_delay_us.load(Ordering::Relaxed))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_micros(self.flush_interval_us.load(Ordering::Relaxed))
    }
}
