//! Write-Ahead Log (WAL) implementation
//!
//! The WAL provides durability by journaling every mutation to disk
//! before (at durability level `sync` and above) the in-memory store
//! acknowledges the write. On startup the log is replayed on top of the
//! latest snapshot to rebuild state; after a successful snapshot it is
//! truncated.
//!
//! ## File Format Overview
//!
//! A WAL file is a plain sequence of self-contained records appended at
//! `<data_dir>/wal.log`:
//!
//! ```text
//! +----------------+
//! |   WAL Record   |  Variable size - first mutation
//! +----------------+
//! |   WAL Record   |  Variable size - second mutation
//! +----------------+
//! |      ...       |
//! +----------------+
//! ```
//!
//! ## Record Format (variable size)
//!
//! ```text
//! Offset  Size  Field       Description
//! ------  ----  -----       -----------
//! 0       4     length      Payload size in bytes (little-endian)
//! 4       4     checksum    CRC32 of the payload (little-endian)
//! 8       var   payload     Self-describing mutation (below)
//! ```
//!
//! ## Payload Format
//!
//! ```text
//! Offset  Size  Field       Description
//! ------  ----  -----       -----------
//! 0       1     tag         0x01 = Put, 0x02 = Delete
//! 1       4     key_len     Key length in bytes (little-endian)
//! 5       var   key         Key data
//! 5+key   4     value_len   Value length (Put only, little-endian)
//! 9+key   var   value       Value data (Put only)
//! ```
//!
//! ## Durability and Recovery
//!
//! - **Append-only**: records are never rewritten in place.
//! - **Checksums**: the CRC32 covers exactly the payload; a record is
//!   applied during replay only if its checksum validates.
//! - **Crash tail**: the first record with a truncated length or a
//!   checksum mismatch terminates replay; the remaining bytes are the
//!   normal signature of a crash mid-append and are discarded.
//! - **Commit point**: at durability level `sync` and above, `append`
//!   fsyncs before returning; a record is only considered committed once
//!   that fsync completes.
//!
//! # Examples
//!
//! ```no_run
//! use basalt_storage::retry::RetryPolicy;
//! use basalt_storage::wal::{WalReader, WalRecord, WalWriter};
//! use std::time::Duration;
//!
//! let retry = RetryPolicy::new(3, Duration::from_millis(10));
//! let writer = WalWriter::new("data/wal.log", true, retry)?;
//!
//! let position = writer.append(&WalRecord::put(b"user:1".to_vec(), b"alice".to_vec())?)?;
//! writer.append(&WalRecord::delete(b"user:2".to_vec())?)?;
//! assert!(position < writer.position());
//!
//! // Recovery: replay every committed record.
//! let mut reader = WalReader::new("data/wal.log")?;
//! let stats = reader.replay(|record| {
//!     println!("replaying {:?}", record.operation());
//! })?;
//! println!("applied {} records", stats.applied);
//! # Ok::<(), basalt_core::Error>(())
//! ```

mod metrics;
mod reader;
mod record;
mod writer;

pub use metrics::WalMetrics;
pub use reader::{ReplayStats, WalReader};
pub use record::{WalRecord, MAX_KEY_SIZE, MAX_PAYLOAD_SIZE, MAX_VALUE_SIZE};
pub use writer::WalWriter;
