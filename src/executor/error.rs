use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("executor is not running")]
    NotRunning,
    /// Kept for parity with spec §4.4's `Schedule` contract. Unreachable in
    /// this port: [`crate::executor::task::Priority`] is a closed two-variant
    /// enum, so there is no runtime value that fails validation.
    #[error("invalid priority")]
    InvalidPriority,
    #[error("queue is at capacity")]
    QueueFull,
}
