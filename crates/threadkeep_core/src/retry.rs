//! Bounded exponential backoff around writer-lock contention.
//!
//! # Responsibility
//! - Re-run an operation closure while it fails with a transient fault.
//! - Enforce the scope deadline before every attempt and every sleep.
//!
//! # Invariants
//! - An operation runs at most `max_attempts` times.
//! - Non-transient errors are returned after the first attempt, unchanged.
//! - Exhaustion surfaces `StoreError::Contention`, never `StorageFault`.

use crate::error::{StoreError, StoreResult};
use log::{debug, error, warn};
use std::time::{Duration, Instant};

/// Retry schedule for contended storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no backoff.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1_u32 << shift)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Runs `op` under `policy`, sleeping between transient failures.
///
/// `deadline` is the enclosing scope deadline, if any. Reaching it before an
/// attempt, or during a pending backoff, yields `StoreError::Timeout`.
pub fn with_retry<T, F>(
    policy: &RetryPolicy,
    deadline: Option<Instant>,
    operation: &'static str,
    mut op: F,
) -> StoreResult<T>
where
    F: FnMut() -> StoreResult<T>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        ensure_before_deadline(deadline, operation)?;

        let err = match op() {
            Ok(value) => return Ok(value),
            Err(err) => err.in_operation(operation),
        };

        if !err.is_transient() {
            if let StoreError::StorageFault(fault) = &err {
                error!(
                    "event=storage_fault module=retry status=error {}",
                    fault.diagnostic()
                );
            }
            return Err(err);
        }

        if attempt >= max_attempts {
            warn!(
                "event=retry_exhausted module=retry status=error op={} attempts={}",
                operation, attempt
            );
            return Err(StoreError::Contention {
                operation,
                attempts: attempt,
            });
        }

        let delay = policy.delay_after(attempt);
        if let Some(deadline) = deadline {
            if Instant::now() + delay >= deadline {
                warn!(
                    "event=retry_backoff module=retry status=timeout op={} attempt={}",
                    operation, attempt
                );
                return Err(StoreError::Timeout { operation });
            }
        }

        debug!(
            "event=retry_backoff module=retry status=wait op={} attempt={} delay_ms={}",
            operation,
            attempt,
            delay.as_millis()
        );
        std::thread::sleep(delay);
        attempt += 1;
    }
}

/// Fails with `Timeout` once `deadline` has passed.
pub fn ensure_before_deadline(
    deadline: Option<Instant>,
    operation: &'static str,
) -> StoreResult<()> {
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Err(StoreError::Timeout { operation }),
        _ => Ok(()),
    }
}
