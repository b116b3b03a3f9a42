//! Cooperative cancellation for long-running storage operations
//!
//! Every I/O-bearing operation in the write path accepts a [`CancelToken`].
//! Cancellation is cooperative: an in-flight syscall is never interrupted,
//! but retry loops and completion waits observe the token between steps and
//! return [`Error::Cancelled`](crate::Error::Cancelled) at the next
//! checkpoint.

use crate::{Error, Result};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A cheaply cloneable cancellation token with an optional deadline
#[derive(Debug, Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never cancels
    pub fn none() -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A token that cancels automatically once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Requests cancellation; observed at the next checkpoint
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    /// Whether cancellation has been requested or the deadline has passed
    pub fn is_cancelled(&self) -> bool {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.inner.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    /// Returns an error if the token has been cancelled
    ///
    /// Called between retry attempts and before each blocking wait.
    pub fn checkpoint(&self) -> Result<()> {
        if self.inner.cancelled.load(Ordering::Acquire) {
            return Err(Error::Cancelled("cancellation requested".to_string()));
        }
        if let Some(deadline) = self.inner.deadline {
            if Instant::now() >= deadline {
                return Err(Error::Cancelled("deadline exceeded".to_string()));
            }
        }
        Ok(())
    }

    /// Time left before the deadline, if one was set
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::none();
        assert!(!token.is_cancelled());
        assert!(token.checkpoint().is_ok());
        assert!(token.remaining().is_none());
    }

    #[test]
    fn cancel_is_visible_through_clones() {
        let token = CancelToken::none();
        let observer = token.clone();

        token.cancel();

        assert!(observer.is_cancelled());
        assert!(matches!(
            observer.checkpoint().unwrap_err(),
            Error::Cancelled(_)
        ));
    }

    #[test]
    fn expired_deadline_cancels_the_token() {
        let token = CancelToken::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));

        assert!(token.is_cancelled());
        assert!(matches!(
            token.checkpoint().unwrap_err(),
            Error::Cancelled(msg) if msg.contains("deadline")
        ));
    }

    #[test]
    fn remaining_counts_down_toward_zero() {
        let token = CancelToken::with_timeout(Duration::from_secs(60));
        let remaining = token.remaining().unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));
    }
}
