//! Errors surfaced by the transaction command framework. See spec §4.6, §7.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// `prepare` or `commit` found insufficient budget; carries the failing
    /// sub-indices, captured on the command (spec §4.6 failure policy).
    #[error("insufficient budget at indices {failing_indices:?}")]
    InsufficientBudget { failing_indices: Vec<usize> },

    #[error("unknown transaction command type")]
    InvalidCommandType,

    #[error("unsupported transaction command version")]
    InvalidCommandVersion,

    #[error("operation dispatcher exhausted its retry budget")]
    DispatcherExhaustedRetries,

    #[error("transaction phase failed: {0}")]
    Other(String),
}
