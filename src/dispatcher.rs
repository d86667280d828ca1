//! Operation dispatcher: exponential-backoff retry for idempotent
//! sub-operations. See spec §4.5.
//!
//! `run` is a blocking call — it sleeps the calling thread between retries.
//! Callers on an async path (the HTTP handlers) should drive it through
//! `tokio::task::spawn_blocking` rather than awaiting it directly.

use std::thread;
use std::time::Duration;

use thiserror::Error;

/// The outcome of one attempt at a unit of work. `Retry` triggers another
/// attempt (subject to the retry budget); `Success` and `Failure` both
/// return immediately.
pub enum ExecutionResult<T, E> {
    Success(T),
    Retry(E),
    Failure(E),
}

#[derive(Debug, Error)]
pub enum DispatcherError<E> {
    #[error("operation failed")]
    Failure(E),
    #[error("operation dispatcher exhausted its retry budget")]
    ExhaustedRetries(E),
}

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for DispatcherConfig {
    /// 12 attempts, 31 ms base delay, exponential backoff capped at 2s
    /// (spec §6 "Timeouts").
    fn default() -> Self {
        Self {
            max_attempts: 12,
            base_delay: Duration::from_millis(31),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Shared backoff math, also used by the async retry loop in
/// [`crate::transactions::framework`] so both the sync and async dispatch
/// paths apply the same `delay × 2^attempt` (capped) policy.
pub fn backoff_duration(config: &DispatcherConfig, attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt.min(63)).unwrap_or(u64::MAX);
    config
        .base_delay
        .saturating_mul(factor as u32)
        .min(config.max_delay)
}

pub struct OperationDispatcher {
    config: DispatcherConfig,
}

impl OperationDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> DispatcherConfig {
        self.config
    }

    fn backoff_for(&self, attempt: u32) -> Duration {
        backoff_duration(&self.config, attempt)
    }

    /// Runs `op` until it returns `Success`/`Failure`, or the retry budget
    /// is exhausted, in which case the final `Retry` becomes
    /// `DispatcherError::ExhaustedRetries`.
    pub fn run<T, E>(
        &self,
        mut op: impl FnMut(u32) -> ExecutionResult<T, E>,
    ) -> Result<T, DispatcherError<E>> {
        let mut attempt = 0u32;
        loop {
            match op(attempt) {
                ExecutionResult::Success(value) => return Ok(value),
                ExecutionResult::Failure(err) => return Err(DispatcherError::Failure(err)),
                ExecutionResult::Retry(err) => {
                    attempt += 1;
                    if attempt >= self.config.max_attempts {
                        return Err(DispatcherError::ExhaustedRetries(err));
                    }
                    thread::sleep(self.backoff_for(attempt));
                }
            }
        }
    }
}

impl Default for OperationDispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_dispatcher() -> OperationDispatcher {
        OperationDispatcher::new(DispatcherConfig {
            max_attempts: 4,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
        })
    }

    #[test]
    fn success_on_first_attempt_returns_immediately() {
        let d = fast_dispatcher();
        let result: Result<u32, DispatcherError<&str>> =
            d.run(|_attempt| ExecutionResult::Success(42));
        assert!(matches!(result, Ok(42)));
    }

    #[test]
    fn retry_then_success_returns_the_success_value() {
        let d = fast_dispatcher();
        let calls = AtomicU32::new(0);
        let result = d.run(|_attempt| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                ExecutionResult::Retry("not yet")
            } else {
                ExecutionResult::Success("done")
            }
        });
        assert!(matches!(result, Ok("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn failure_is_not_retried() {
        let d = fast_dispatcher();
        let calls = AtomicU32::new(0);
        let result: Result<u32, DispatcherError<&str>> = d.run(|_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            ExecutionResult::Failure("fatal")
        });
        assert!(matches!(result, Err(DispatcherError::Failure("fatal"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausting_retry_budget_converts_retry_to_exhausted_retries() {
        let d = fast_dispatcher();
        let calls = AtomicU32::new(0);
        let result: Result<u32, DispatcherError<&str>> = d.run(|_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            ExecutionResult::Retry("still failing")
        });
        assert!(matches!(
            result,
            Err(DispatcherError::ExhaustedRetries("still failing"))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
