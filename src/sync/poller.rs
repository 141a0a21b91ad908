//! Bounded-interval polling with deadline and cancellation
//!
//! Two processes sharing only files have no wake-up primitive in common, so
//! every blocking operation in this crate is a check that is retried after a
//! fixed sleep. The poller checks cancellation and the deadline before each
//! sleep and never sleeps past the deadline.

use std::{
    thread,
    time::{Duration, Instant},
};

use crate::error::{PipeError, Result};

use super::CancelToken;

/// Retry loop configuration for a single blocking operation
#[derive(Debug, Clone)]
pub struct Poller {
    /// Sleep between checks
    interval: Duration,
    /// Total budget; `None` waits indefinitely
    timeout: Option<Duration>,
    /// Optional external cancellation
    cancel: Option<CancelToken>,
}

impl Poller {
    /// Create an unbounded poller with the given interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
            cancel: None,
        }
    }

    /// Bound the wait; a zero duration means unbounded
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = if timeout.is_zero() { None } else { Some(timeout) };
        self
    }

    /// Observe the given cancellation token
    pub fn with_cancel(mut self, cancel: Option<CancelToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Poll interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Configured timeout, `None` when unbounded
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `check` until it yields a value
    ///
    /// `check` returning `Ok(None)` means "not yet"; errors abort the loop.
    /// Fails with [`PipeError::Interrupted`] on cancellation and
    /// [`PipeError::Timeout`] once the deadline has passed.
    pub fn wait_for<T, F>(&self, operation: &str, mut check: F) -> Result<T>
    where
        F: FnMut() -> Result<Option<T>>,
    {
        let deadline = self.timeout.map(|t| Instant::now() + t);

        loop {
            if let Some(value) = check()? {
                return Ok(value);
            }

            if self.is_cancelled() {
                return Err(PipeError::interrupted(operation));
            }

            let sleep = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(PipeError::timeout(
                            operation,
                            self.timeout.unwrap_or_default(),
                        ));
                    }
                    self.interval.min(deadline - now)
                }
                None => self.interval,
            };

            thread::sleep(sleep);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map_or(false, CancelToken::is_cancelled)
    }
}
