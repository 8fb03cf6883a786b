//! Reconnect policy for [`crate::CloudLink`].
//!
//! A blocking, synchronous retry decision: no `Duration` is computed from a
//! server-reported wait (there's no flood-wait concept here), just a bound
//! on consecutive attempts.

use std::ops::ControlFlow;
use std::time::Duration;

use crate::errors::LinkError;

/// Decides whether the reader should attempt another reconnect after a
/// transport failure.
pub trait RetryPolicy: Send + Sync + 'static {
    fn should_retry(&self, attempt: u32, error: &LinkError) -> ControlFlow<(), Duration>;
}

/// Retries up to `max_attempts` times with a fixed backoff.
pub struct BoundedRetries {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for BoundedRetries {
    fn default() -> Self {
        Self { max_attempts: 3, backoff: Duration::from_secs(1) }
    }
}

impl RetryPolicy for BoundedRetries {
    fn should_retry(&self, attempt: u32, _error: &LinkError) -> ControlFlow<(), Duration> {
        if attempt >= self.max_attempts {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(self.backoff)
        }
    }
}

/// Never reconnect; the first transport failure is fatal.
pub struct NoRetries;

impl RetryPolicy for NoRetries {
    fn should_retry(&self, _attempt: u32, _error: &LinkError) -> ControlFlow<(), Duration> {
        ControlFlow::Break(())
    }
}
