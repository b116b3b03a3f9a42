//! Durable write path and persistent key-value core for Basalt
//!
//! This crate implements the storage engine that sits beneath the Basalt
//! server layers: an ordered in-memory store served lock-free, a
//! checksummed write-ahead log that is the durable commit point for
//! every mutation, an atomic snapshot engine, and the sync/async file
//! writers the [`DurabilityManager`] routes raw payload writes through
//! for higher layers' own files.
//!
//! # Architecture
//!
//! ```text
//!                 +--------------------+
//!     put/delete  | DurabilityManager  |  get/range
//!  -------------> |  (policy, order)   | ------------> MemStore
//!                 +---------+----------+
//!                           |  journal (fsync per level)
//!                 +---------v----------+
//!                 |  WalWriter / WAL   |  replayed on open
//!                 +--------------------+
//!                 |   SnapshotEngine   |  written on close
//!                 +--------------------+
//!
//!   write_through +--------------------+
//!  -------------> |   policy routing   |
//!                 +---+------+------+--+
//!                     v      v      v
//!          SyncFileWriter  SyncOptimizer  AsyncFileWriter
//!             (fsync)      (coalescing)    (buffering)
//! ```
//!
//! The [`FlushManager`](flush::FlushManager) runs in the background and
//! periodically drains the async buffers and the WAL's OS-level buffer,
//! fsyncing when the durability level requires it.

pub mod async_writer;
pub mod config;
pub mod durability;
pub mod flush;
pub mod optimizer;
pub mod retry;
pub mod snapshot;
pub mod store;
pub mod sync_writer;
pub mod testing;
pub mod wal;

pub use config::DurabilityConfig;
pub use durability::{BatchOp, DurabilityManager, ManagerStatus};
pub use store::MemStore;
