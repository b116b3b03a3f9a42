//! Core types shared across the Basalt database crates
//!
//! This crate defines the error taxonomy, the key/value type aliases, the
//! durability policy enums, and the cooperative cancellation token. It has
//! no I/O of its own; everything here is consumed by `basalt-storage` and
//! by the server layers above it.

mod cancel;
mod error;
mod types;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use types::{DurabilityLevel, Key, Operation, Timestamp, Value, WriteMode};
