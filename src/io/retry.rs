//! Retrying single-attempt record reads that fail with transient I/O errors
use std::io;
use std::thread;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SpectrumCacheError;
use crate::io::traits::RecordError;

/// The outcome of a read that did not succeed under a [`RetryPolicy`]
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every attempt failed with an I/O error and the wait grew past the timeout
    #[error("Gave up after {attempts} attempts: {last_error}")]
    Exhausted {
        attempts: usize,
        #[source]
        last_error: io::Error,
    },
    /// The read failed for a reason retrying cannot fix
    #[error(transparent)]
    Fatal(RecordError),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct RetrySettings {
    initial_wait_ms: u64,
    timeout_ms: u64,
}

/**
Exponential backoff for reads that fail with transient I/O errors.

After a failed attempt the policy waits, doubles the wait, and tries again. It
gives up once the next wait would be longer than `timeout`. With an initial wait
of 1ms and a timeout of 10ms, the waits are 1, 2, 4 and 8ms and the fifth failure
is returned. Errors that are not transient are returned at once.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RetrySettings", into = "RetrySettings")]
pub struct RetryPolicy {
    initial_wait: Duration,
    timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_wait: Duration::from_millis(1),
            timeout: Duration::from_millis(10_000),
        }
    }
}

impl TryFrom<RetrySettings> for RetryPolicy {
    type Error = SpectrumCacheError;

    fn try_from(value: RetrySettings) -> Result<Self, Self::Error> {
        Self::new(
            Duration::from_millis(value.initial_wait_ms),
            Duration::from_millis(value.timeout_ms),
        )
    }
}

/// Whole milliseconds in `duration`, rounding any fraction up so a non-zero
/// duration never becomes zero
fn ceil_millis(duration: Duration) -> u64 {
    let millis = duration.as_millis();
    let millis = if duration.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    };
    u64::try_from(millis).unwrap_or(u64::MAX)
}

impl From<RetryPolicy> for RetrySettings {
    fn from(value: RetryPolicy) -> Self {
        Self {
            initial_wait_ms: ceil_millis(value.initial_wait),
            timeout_ms: ceil_millis(value.timeout),
        }
    }
}

impl RetryPolicy {
    pub fn new(initial_wait: Duration, timeout: Duration) -> Result<Self, SpectrumCacheError> {
        if initial_wait.is_zero() {
            return Err(SpectrumCacheError::PreconditionViolation(
                "The initial retry wait must be greater than zero".into(),
            ));
        }
        if timeout.is_zero() {
            return Err(SpectrumCacheError::PreconditionViolation(
                "The retry timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            initial_wait,
            timeout,
        })
    }

    pub fn initial_wait(&self) -> Duration {
        self.initial_wait
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `operation` until it succeeds, fails permanently, or the wait exceeds
    /// the timeout, blocking the current thread between attempts
    pub fn run<T, F>(&self, operation: F) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, RecordError>,
    {
        self.run_with_sleeper(operation, thread::sleep)
    }

    /// As [`RetryPolicy::run`], calling `sleep` to wait between attempts
    pub fn run_with_sleeper<T, F, S>(&self, mut operation: F, mut sleep: S) -> Result<T, RetryError>
    where
        F: FnMut() -> Result<T, RecordError>,
        S: FnMut(Duration),
    {
        let mut wait = self.initial_wait;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation() {
                Ok(value) => return Ok(value),
                Err(RecordError::IOError(e)) => {
                    if wait > self.timeout {
                        return Err(RetryError::Exhausted {
                            attempts,
                            last_error: e,
                        });
                    }
                    debug!("Attempt {attempts} failed ({e}), retrying in {wait:?}");
                    sleep(wait);
                    wait = wait.saturating_mul(2);
                }
                Err(e) => return Err(RetryError::Fatal(e)),
            }
        }
    }
}
