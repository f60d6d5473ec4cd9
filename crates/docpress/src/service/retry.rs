use std::time::Duration;

use log::{debug, warn};

use crate::error::TransportError;

/// Bounded retry with linearly growing backoff. One policy per remote-call
/// category; the executor itself is shared by every remote call in the
/// system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_increment: Duration,
}

impl RetryPolicy {
    pub const UPLOAD: Self = Self {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1000),
        backoff_increment: Duration::from_millis(2000),
    };

    pub const OPERATION: Self = Self {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(500),
        backoff_increment: Duration::from_millis(500),
    };

    pub const DOWNLOAD: Self = Self {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1000),
        backoff_increment: Duration::from_millis(2000),
    };

    pub const METADATA: Self = Self {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(250),
        backoff_increment: Duration::from_millis(250),
    };
}

/// Per-category policies for one batch run.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub upload: RetryPolicy,
    pub operation: RetryPolicy,
    pub download: RetryPolicy,
    pub metadata: RetryPolicy,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            upload: RetryPolicy::UPLOAD,
            operation: RetryPolicy::OPERATION,
            download: RetryPolicy::DOWNLOAD,
            metadata: RetryPolicy::METADATA,
        }
    }
}

/// Runs `call` up to `policy.max_attempts` times. `on_attempt` fires before
/// every attempt (including the first) with the 1-based attempt index, so
/// observers can show "retry N". Only transport failures are retried; the
/// sleep between attempt `i` and `i + 1` is
/// `initial_backoff + (i - 1) * backoff_increment`.
pub fn execute<R, C, A>(
    op: &str,
    policy: RetryPolicy,
    mut on_attempt: A,
    mut call: C,
) -> Result<R, TransportError>
where
    C: FnMut() -> Result<R, TransportError>,
    A: FnMut(u32),
{
    assert!(policy.max_attempts > 0, "max_attempts must be > 0");

    let mut backoff = policy.initial_backoff;

    for attempt in 1..=policy.max_attempts {
        on_attempt(attempt);

        match call() {
            Ok(response) => {
                debug!("{} succeeded on attempt {}", op, attempt);
                return Ok(response);
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    "{} attempt {}/{} failed ({}), retrying in {:?}",
                    op, attempt, policy.max_attempts, e, backoff
                );
                std::thread::sleep(backoff);
                backoff += policy.backoff_increment;
            }
            Err(e) => {
                warn!(
                    "{} failed after {} attempts: {}",
                    op, policy.max_attempts, e
                );
                return Err(e);
            }
        }
    }

    unreachable!("retry loop always returns within max_attempts");
}
