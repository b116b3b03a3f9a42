//! Retry with exponential backoff over transient I/O errors
//!
//! Only errors classified [`Error::is_transient`] (EINTR, EAGAIN, EBUSY)
//! are retried; everything else fails fast. Between attempts the caller
//! sleeps `retry_delay * 2^attempt` and observes its cancellation token.

use basalt_core::{CancelToken, Error, Result};

use log::warn;

use std::thread;
use std::time::Duration;

/// Exponent cap so the backoff multiplication cannot overflow
const MAX_BACKOFF_SHIFT: u32 = 16;

/// A retry budget with exponential backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, retry_delay: Duration) -> Self {
        Self {
            max_retries,
            retry_delay,
        }
    }

    /// Backoff before retry number `attempt` (zero-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.pow(attempt.min(MAX_BACKOFF_SHIFT))
    }

    /// Runs `op`, retrying transient failures up to the budget
    ///
    /// Exhausting the budget converts the final transient error into
    /// [`Error::IoPermanent`]; with `max_retries = 0` a transient failure
    /// surfaces immediately. Cancellation is checked before every attempt
    /// and never interrupts an attempt already in flight.
    pub fn run<T, F>(&self, token: &CancelToken, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            token.checkpoint()?;

            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        "transient I/O error (attempt {}/{}), retrying in {:?}: {}",
                        attempt + 1,
                        self.max_retries,
                        delay,
                        err
                    );
                    attempt += 1;
                    thread::sleep(delay);
                }
                Err(err) if err.is_transient() => {
                    return Err(Error::IoPermanent(format!(
                        "transient error persisted after {} attempts: {}",
                        attempt + 1,
                        err
                    )));
                }
                Err(err) => return Err(err),
            }
        }
    }
}
