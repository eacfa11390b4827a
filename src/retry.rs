use log::{debug, info, warn};
use std::thread;
use std::time::{Duration, Instant};

use crate::model::{DeployError, RegistryError, Result};

/// Bounded retry for transient registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Attempt count, never less than two so there is always one retry.
    pub fn effective_attempts(&self) -> u32 {
        self.attempts.max(2)
    }
}

/// Fixed-interval polling bounded by a maximum duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Runs `operation`, retrying while it fails with a transient registry error.
/// Any other error is returned immediately. Running out of attempts yields
/// [`DeployError::RetriesExhausted`].
pub fn retry_transient<T, F>(operation: &str, policy: RetryPolicy, mut attempt_fn: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let max_attempts = policy.effective_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match attempt_fn() {
            Ok(value) => return Ok(value),
            Err(DeployError::Registry(RegistryError::Transient(reason))) => {
                if attempt >= max_attempts {
                    warn!(
                        "[retry] {} gave up after {} attempt(s): {}",
                        operation, attempt, reason
                    );
                    return Err(DeployError::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts: attempt,
                        source: RegistryError::Transient(reason),
                    });
                }
                debug!(
                    "[retry] {} failed (attempt {}), retrying in {}ms: {}",
                    operation,
                    attempt,
                    policy.delay.as_millis(),
                    reason
                );
                thread::sleep(policy.delay);
            }
            Err(err) => return Err(err),
        }
    }
}

/// Polls `check` until it yields `Some`, fails, or the policy timeout elapses.
///
/// `check` returns:
/// - `Ok(Some(value))` when the awaited state is reached
/// - `Ok(None)` when polling should continue
/// - `Err(_)` to stop immediately, except transient registry errors which are
///   logged and polled through
pub fn wait_until<T, F>(operation: &str, subject: &str, policy: PollPolicy, mut check: F) -> Result<T>
where
    F: FnMut() -> Result<Option<T>>,
{
    let started = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!("[poll] {} check {} for {}", operation, attempt, subject);

        match check() {
            Ok(Some(value)) => {
                info!(
                    "[poll] {} for {} finished after {}s (check {})",
                    operation,
                    subject,
                    started.elapsed().as_secs(),
                    attempt
                );
                return Ok(value);
            }
            Ok(None) => {}
            Err(err) if err.is_transient() => {
                warn!("[poll] {} check {} for {} failed: {}", operation, attempt, subject, err);
            }
            Err(err) => return Err(err),
        }

        let elapsed = started.elapsed();
        if elapsed >= policy.timeout {
            warn!(
                "[poll] {} for {} timed out after {}ms (check {})",
                operation,
                subject,
                elapsed.as_millis(),
                attempt
            );
            return Err(DeployError::Timeout {
                operation: operation.to_string(),
                subject: subject.to_string(),
                elapsed,
            });
        }

        let remaining = policy.timeout.saturating_sub(elapsed);
        let pause = policy.interval.min(remaining);
        debug!(
            "[poll] {} not done yet, waiting {}ms before next check ({}ms remaining)",
            operation,
            pause.as_millis(),
            remaining.as_millis()
        );
        thread::sleep(pause);
    }
}
