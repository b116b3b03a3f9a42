//! Error taxonomy for the durable write path
//!
//! Every fallible operation in Basalt returns [`Result`]. The variants are
//! deliberately coarse: they describe what the *caller* can do about a
//! failure (retry, reconfigure, give up), not which syscall produced it.
//! The low-level cause is carried in the message.
//!
//! Errors are `Clone` so a single flush failure can be fanned out to every
//! waiter that was coalesced into the same underlying write.

use thiserror::Error;

/// A specialized `Result` type for Basalt operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the storage engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A cross-field configuration rule was violated; fails construction
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation attempted before recovery completed or after close
    #[error("storage is not ready")]
    NotReady,

    /// A retryable OS error (EINTR, EAGAIN, EBUSY); surfaced only when the
    /// retry budget is exhausted
    #[error("transient I/O error: {0}")]
    IoTransient(String),

    /// A non-retryable write, open, or fsync failure
    #[error("I/O error: {0}")]
    IoPermanent(String),

    /// Checksum or length mismatch in persisted data
    #[error("corruption detected: {0}")]
    Corruption(String),

    /// Deadline exceeded or external cancellation
    #[error("operation cancelled: {0}")]
    Cancelled(String),

    /// Disk full; never retried
    #[error("out of disk space: {0}")]
    OutOfSpace(String),
}

impl Error {
    /// Whether this error may succeed if the operation is retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::IoTransient(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;

        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::ResourceBusy => {
                Error::IoTransient(err.to_string())
            }
            ErrorKind::StorageFull => Error::OutOfSpace(err.to_string()),
            _ => Error::IoPermanent(err.to_string()),
        }
    }
}
