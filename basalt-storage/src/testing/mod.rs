//! Test-support utilities for exercising failure paths
//!
//! Compiled unconditionally so integration tests (and crash harnesses in
//! higher layers) can inject faults into a normally-constructed engine.
//! With no faults armed every hook is a single relaxed atomic load.

use std::io;
use std::sync::atomic::{AtomicU32, Ordering};

/// Injects transient I/O errors into the writer fsync paths
///
/// Arm it with a countdown; each armed fsync attempt consumes one unit and
/// fails with `EINTR` until the countdown reaches zero.
#[derive(Debug, Default)]
pub struct FaultInjector {
    transient_fsync_errors: AtomicU32,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the injector to fail the next `count` fsync attempts
    pub fn inject_transient_fsync_errors(&self, count: u32) {
        self.transient_fsync_errors.store(count, Ordering::SeqCst);
    }

    /// Whether any faults are still armed
    pub fn armed(&self) -> bool {
        self.transient_fsync_errors.load(Ordering::SeqCst) > 0
    }

    /// Consumes one armed fault, if any
    pub(crate) fn next_fsync_error(&self) -> Option<io::Error> {
        let consumed = self
            .transient_fsync_errors
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();

        consumed.then(|| io::Error::new(io::ErrorKind::Interrupted, "injected EINTR"))
    }
}
