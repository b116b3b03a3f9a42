//! Fundamental types used throughout Basalt

use serde::{Deserialize, Serialize};

/// Keys are arbitrary byte strings, ordered lexicographically
pub type Key = Vec<u8>;

/// Values are arbitrary byte strings
pub type Value = Vec<u8>;

/// Timestamps are microseconds since the Unix epoch
pub type Timestamp = u64;

/// Type of mutation recorded in the write-ahead log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    /// Insert or update a key-value pair
    Put,
    /// Remove a key
    Delete,
}

/// How strongly a write is persisted before it is acknowledged
///
/// The variants are ordered: a level compares greater than another when it
/// makes strictly stronger durability promises, so policy checks read as
/// `level >= DurabilityLevel::Sync`.
///
/// | Level | fsync | Data loss window |
/// |-------|-------|------------------|
/// | None | never | everything |
/// | Async | periodic | up to `flush_interval + batch_timeout` |
/// | Sync | every write | zero |
/// | Strict | every write + barriers | zero, totally ordered |
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurabilityLevel {
    /// No durability; data lives only in memory until a clean shutdown
    None,
    /// Buffered writes with periodic background flush
    Async,
    /// fsync before every acknowledgment
    Sync,
    /// fsync plus write barriers and post-write verification
    Strict,
}

impl DurabilityLevel {
    /// Whether writes at this level must be fsynced before returning
    pub fn requires_fsync(self) -> bool {
        self >= DurabilityLevel::Sync
    }

    /// Whether persistence (WAL + snapshot) is enabled at all
    pub fn persists(self) -> bool {
        self != DurabilityLevel::None
    }
}

/// How a write travels to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Synchronous write (+ fsync per the durability level)
    Sync,
    /// Buffered in a per-file write buffer, flushed in the background
    Async,
    /// Buffered and submitted in bounded-size batches
    Batch,
}
