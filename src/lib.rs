//! Basalt — an embedded multi-model database
//!
//! This facade crate re-exports the public surface of the Basalt core:
//! the durable write path and the persistent key-value engine. Server
//! layers (REST, admin plane) build on [`DurabilityManager`].
//!
//! # Quick start
//!
//! ```no_run
//! use basalt::{DurabilityConfig, DurabilityLevel, DurabilityManager};
//!
//! let config = DurabilityConfig::for_level(DurabilityLevel::Sync);
//! let db = DurabilityManager::open("./data", config)?;
//!
//! db.put(b"user:1".to_vec(), b"alice".to_vec())?;
//! assert_eq!(db.get(b"user:1")?, Some(b"alice".to_vec()));
//!
//! db.close()?;
//! # Ok::<(), basalt::Error>(())
//! ```

pub use basalt_core::{
    CancelToken, DurabilityLevel, Error, Key, Operation, Result, Timestamp, Value, WriteMode,
};
pub use basalt_storage::{BatchOp, DurabilityConfig, DurabilityManager, ManagerStatus, MemStore};
